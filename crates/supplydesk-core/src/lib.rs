pub mod app_config;
pub mod config;
pub mod extraction;
pub mod monitoring;
pub mod performance;
pub mod policy;
pub mod ports;
pub mod review;
pub mod status;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use extraction::{overall_confidence, ConfidenceBucket, ProductCandidate, Route, RoutingPlan};
pub use monitoring::{
    evaluate_alerts, subsystem_health, Alert, AlertInputs, HealthStatus, Severity,
    SubsystemActivity,
};
pub use performance::{rank_suppliers, SupplierPerformance, SupplierTally};
pub use policy::{
    load_policy, load_policy_or_default, parse_policy, AlertPolicy, PerformancePolicy,
    PipelinePolicy, RecoveryPolicy, ValidationPolicy,
};
pub use ports::{
    CatalogProduct, CatalogProductId, CatalogService, ExtractionRequest, ExtractionResponse,
    ExtractionService, ServiceError, SupplierDirectory, SupplierRecord,
};
pub use review::{PageWindow, QueueFilters, ReasonCategory, RejectionFeedback};
pub use status::{
    ContentType, DecidedBy, OperationState, OperationType, Priority, ProcessingEvent,
    ProcessingStatus, ProductCondition, SupplierTier, ValidationStatus,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },

    #[error("invalid transition from {from} on {event}")]
    InvalidTransition { from: &'static str, event: String },

    #[error("invalid product candidate: {0}")]
    InvalidCandidate(String),

    #[error("empty feedback: {0}")]
    EmptyFeedback(String),

    #[error("invalid feedback: {0}")]
    InvalidFeedback(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read policy file {path}: {source}")]
    PolicyFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse policy file: {0}")]
    PolicyFileParse(#[from] serde_yaml::Error),

    #[error("invalid policy: {0}")]
    Validation(String),
}
