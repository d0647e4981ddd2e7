use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use supplydesk_core::{CatalogService, ExtractionService, PipelinePolicy, SupplierDirectory};

/// External services the pipeline calls out to.
#[derive(Clone)]
pub struct Services {
    pub extraction: Arc<dyn ExtractionService>,
    pub catalog: Arc<dyn CatalogService>,
    pub directory: Arc<dyn SupplierDirectory>,
}

/// Everything a pipeline operation needs. Cheap to clone.
#[derive(Clone)]
pub struct PipelineContext {
    pub pool: PgPool,
    pub policy: Arc<PipelinePolicy>,
    pub services: Services,
    /// Upper bound on a single extraction call, on top of the client's own timeout.
    pub extraction_timeout: Duration,
    pub started_at: DateTime<Utc>,
}

impl PipelineContext {
    #[must_use]
    pub fn new(
        pool: PgPool,
        policy: PipelinePolicy,
        services: Services,
        extraction_timeout: Duration,
    ) -> Self {
        Self {
            pool,
            policy: Arc::new(policy),
            services,
            extraction_timeout,
            started_at: Utc::now(),
        }
    }
}
