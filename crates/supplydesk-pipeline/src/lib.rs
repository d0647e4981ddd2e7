//! Orchestration of the supplier-submission pipeline: ingestion, extraction,
//! review routing, recovery and reporting.

pub mod context;
pub mod error;
pub mod gateway;
pub mod performance;
pub mod queue;
pub mod recovery;
pub mod reporting;
pub mod submissions;
pub mod validation;
pub mod worker;

pub use context::{PipelineContext, Services};
pub use error::PipelineError;
pub use gateway::{receive, InboundMessage};
pub use performance::{supplier_performance, top_suppliers};
pub use queue::{extraction_queue, spawn_extraction_consumer, ExtractionQueue, QueueError};
pub use recovery::{
    dispatch_pending, recovery_queue, recovery_stats, retry_now, run_recovery_sweep,
    schedule_failure, sweep_stale_processing, AttemptOutcome, OperationResult, QueuedOperation,
    RecoveryStats, RetryReport, StaleSweepReport, SweepReport,
};
pub use reporting::{
    ai_metrics, confidence_distribution, dashboard_stats, recent_activity, system_alerts,
    system_health, validation_trends, ActivityEvent, AiMetrics, ConfidenceDistribution,
    DashboardStats, SystemHealth, TrendPoint,
};
pub use submissions::{
    find_submission, list_submissions, process_submission, reprocess_submission,
    submission_detail, SubmissionDetail, SubmissionQuery,
};
pub use validation::{
    approve, bulk_approve, bulk_reject, list_pending, reject, BulkItemResult, BulkReport,
    DecisionResult, PendingPage,
};
pub use worker::{
    process, reprocess, route_submission, try_sync_inventory, ProcessOutcome, ProcessSummary,
    RoutingSummary,
};
