use supplydesk_core::{CoreError, ServiceError};
use supplydesk_db::DbError;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced synchronously by pipeline operations.
///
/// Extraction failures are not errors here: they are recorded as failed
/// operations and reported in the [`ProcessOutcome`](crate::ProcessOutcome).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("message {message_id} was already received as submission {existing}")]
    DuplicateSubmission { message_id: String, existing: Uuid },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("submission {submission} is {actual}, expected {expected}")]
    InvalidTransition {
        submission: Uuid,
        expected: &'static str,
        actual: String,
    },

    #[error("validation item {id} was already {status}")]
    AlreadyDecided { id: i64, status: String },

    #[error("submission {0} has no failed operation to retry")]
    NothingToRetry(Uuid),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("{service} service call failed: {source}")]
    Service {
        service: &'static str,
        #[source]
        source: ServiceError,
    },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Db(DbError),
}

impl From<DbError> for PipelineError {
    fn from(error: DbError) -> Self {
        match error {
            DbError::NotFound => PipelineError::NotFound("record"),
            DbError::AlreadyDecided { id, status } => PipelineError::AlreadyDecided { id, status },
            other => PipelineError::Db(other),
        }
    }
}

impl PipelineError {
    /// Short machine-readable code, used in bulk reports and API errors.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::UnsupportedContentType(_) => "unsupported_content_type",
            PipelineError::MalformedMessage(_) => "malformed_message",
            PipelineError::DuplicateSubmission { .. } => "duplicate_submission",
            PipelineError::NotFound(_) => "not_found",
            PipelineError::InvalidTransition { .. } => "invalid_transition",
            PipelineError::AlreadyDecided { .. } => "already_decided",
            PipelineError::NothingToRetry(_) => "nothing_to_retry",
            PipelineError::InvalidRequest(_) => "invalid_request",
            PipelineError::Service { .. } => "upstream_error",
            PipelineError::Core(CoreError::EmptyFeedback(_)) => "empty_feedback",
            PipelineError::Core(_) => "validation_error",
            PipelineError::Db(_) => "internal_error",
        }
    }
}
