use std::time::Duration;

use supplydesk_core::ServiceError;
use thiserror::Error;

/// Errors returned by the HTTP service clients.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-2xx status.
    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// The response body could not be deserialized into the expected type.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

impl ClientError {
    /// Converts into the port-level error, reporting timeouts with the
    /// configured request budget.
    #[must_use]
    pub fn into_service_error(self, timeout: Duration) -> ServiceError {
        match self {
            ClientError::Http(e) if e.is_timeout() => ServiceError::Timeout(timeout),
            ClientError::Http(e) => ServiceError::Transport(e.to_string()),
            ClientError::Status { status, body, .. } => ServiceError::Upstream { status, body },
            ClientError::Deserialize { context, source } => {
                ServiceError::Malformed(format!("{context}: {source}"))
            }
            ClientError::InvalidBaseUrl { url, reason } => {
                ServiceError::Rejected(format!("invalid base URL '{url}': {reason}"))
            }
        }
    }
}
