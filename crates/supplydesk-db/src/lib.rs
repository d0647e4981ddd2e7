//! Postgres persistence for submissions, extracted products, review items
//! and failed operations.

pub mod extracted_products;
pub mod extraction_runs;
pub mod failed_operations;
pub mod reporting;
pub mod submissions;
pub mod suppliers;
pub mod validation_items;

pub use extracted_products::{
    get_extracted_product, list_products_for_submission, mark_inventory_synced,
    persist_extraction, ExtractedProductRow, NewExtractedProduct,
};
pub use extraction_runs::{record_extraction_run, ExtractionOutcome};
pub use failed_operations::{
    claim_due_operations, claim_operations_for_submission, list_live_operations,
    list_operations_for_submission, operation_counts_by_type, operation_stats,
    record_failed_operation, release_stale_retrying, reschedule_operation, resolve_operation,
    resolve_operations_for_submission, FailedOperationRow, NewFailedOperation, OperationCountRow,
    OperationStatsRow, QueuedOperationRow,
};
pub use reporting::{
    ai_metrics, alert_counts, confidence_distribution, health_counts, model_usage,
    pipeline_counts, recent_activity, validation_trends, ActivityRow, AiMetricsRow,
    AlertCountsRow, ConfidenceDistributionRow, HealthCountsRow, ModelUsageRow, PipelineCountsRow,
    TrendRow,
};
pub use submissions::{
    claim_submission, claim_undispatched_pending, fail_stale_processing, fail_submission,
    get_submission, get_submission_by_public_id, insert_submission, list_submissions,
    mark_dispatched, reset_failed_submission, NewSubmission, SubmissionInsert, SubmissionListFilter,
    SubmissionRow,
};
pub use suppliers::{supplier_tallies, SupplierTallyRow};
pub use validation_items::{
    decide_validation_item, get_validation_item, list_items_for_submission, list_pending_items,
    route_products, Decision, DecisionOutcome, NewValidationItem, PendingItemsQuery, RoutedItems,
    ValidationItemRow,
};

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

/// Connection pool sizing, normally taken from [`supplydesk_core::AppConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn from_app_config(config: &supplydesk_core::AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections.min(config.db_max_connections),
            acquire_timeout: Duration::from_secs(config.db_acquire_timeout_secs),
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("record not found")]
    NotFound,
    #[error("submission {id} is not in '{expected_status}' status")]
    InvalidSubmissionTransition {
        id: i64,
        expected_status: &'static str,
    },
    #[error("validation item {id} was already {status}")]
    AlreadyDecided { id: i64, status: String },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// # Errors
///
/// Returns [`sqlx::Error`] if no connection can be opened within the
/// acquire timeout.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect(database_url)
        .await
}

/// Applies the embedded migrations and returns how many were newly applied.
///
/// # Errors
///
/// Returns [`sqlx::migrate::MigrateError`] if a migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<usize, sqlx::migrate::MigrateError> {
    let before = applied_migrations(pool).await;
    MIGRATOR.run(pool).await?;
    let after = applied_migrations(pool).await;
    Ok(usize::try_from(after.saturating_sub(before)).unwrap_or(0))
}

// Zero on a fresh database, where the bookkeeping table is missing.
async fn applied_migrations(pool: &PgPool) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success")
        .fetch_one(pool)
        .await
        .unwrap_or(0)
}

/// Round-trips a trivial query to prove the pool can serve requests.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the database is unreachable.
pub async fn health_check(pool: &PgPool) -> Result<(), DbError> {
    sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(pool).await?;
    Ok(())
}
