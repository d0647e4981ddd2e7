//! Interfaces of the external services the pipeline depends on.
//!
//! HTTP implementations live in `supplydesk-clients`; tests substitute
//! in-memory fakes.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::extraction::ProductCandidate;
use crate::status::{ContentType, ProductCondition};

/// Input handed to the AI extraction service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRequest {
    pub submission_id: Uuid,
    pub content_type: ContentType,
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub supplier_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResponse {
    pub model: String,
    #[serde(default)]
    pub processing_time_ms: i64,
    /// Transcription of voice notes, when the service produced one.
    #[serde(default)]
    pub transcription: Option<String>,
    #[serde(default)]
    pub products: Vec<ProductCandidate>,
}

/// Approved product pushed to the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogProduct {
    /// Stable reference so repeated pushes update rather than duplicate.
    pub external_ref: String,
    pub supplier_id: Option<String>,
    pub supplier_phone: String,
    pub name: String,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub condition: Option<ProductCondition>,
    pub grade: Option<String>,
    pub price: Option<Decimal>,
    pub currency: Option<String>,
    pub quantity: Option<i32>,
    #[serde(default)]
    pub specifications: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatalogProductId(pub String);

impl std::fmt::Display for CatalogProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierRecord {
    pub id: String,
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub country: Option<String>,
}

/// Failure reported by an external service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("upstream returned HTTP {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("request rejected: {0}")]
    Rejected(String),
}

impl ServiceError {
    /// Timeouts, transport failures, 429 and 5xx are worth retrying.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Timeout(_) | ServiceError::Transport(_) => true,
            ServiceError::Upstream { status, .. } => *status == 429 || *status >= 500,
            ServiceError::Malformed(_) | ServiceError::Rejected(_) => false,
        }
    }
}

#[async_trait]
pub trait ExtractionService: Send + Sync {
    async fn extract(&self, request: &ExtractionRequest)
        -> Result<ExtractionResponse, ServiceError>;
}

#[async_trait]
pub trait CatalogService: Send + Sync {
    async fn create_or_update_product(
        &self,
        product: &CatalogProduct,
    ) -> Result<CatalogProductId, ServiceError>;
}

#[async_trait]
pub trait SupplierDirectory: Send + Sync {
    /// Looks a supplier up by phone number or directory id.
    async fn get_supplier(&self, phone_or_id: &str) -> Result<Option<SupplierRecord>, ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(ServiceError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(ServiceError::Transport("reset".into()).is_transient());
        assert!(ServiceError::Upstream {
            status: 503,
            body: String::new()
        }
        .is_transient());
        assert!(ServiceError::Upstream {
            status: 429,
            body: String::new()
        }
        .is_transient());
        assert!(!ServiceError::Upstream {
            status: 422,
            body: String::new()
        }
        .is_transient());
        assert!(!ServiceError::Malformed("bad json".into()).is_transient());
    }

    #[test]
    fn extraction_response_tolerates_missing_optional_fields() {
        let response: ExtractionResponse =
            serde_json::from_str(r#"{"model":"vision-2"}"#).unwrap();
        assert_eq!(response.model, "vision-2");
        assert!(response.products.is_empty());
        assert_eq!(response.processing_time_ms, 0);
    }

    #[test]
    fn catalog_product_id_is_transparent() {
        let id: CatalogProductId = serde_json::from_str(r#""SKU-991""#).unwrap();
        assert_eq!(id.to_string(), "SKU-991");
    }
}
