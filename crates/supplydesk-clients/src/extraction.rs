//! Client for the AI extraction service.

use async_trait::async_trait;
use reqwest::Method;
use supplydesk_core::{ExtractionRequest, ExtractionResponse, ExtractionService, ServiceError};

use crate::error::ClientError;
use crate::http::{ClientSettings, HttpTransport};

/// Posts submission content to `POST {base}/v1/extractions` and returns the
/// candidate products the model found.
pub struct HttpExtractionService {
    transport: HttpTransport,
}

impl HttpExtractionService {
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the `reqwest::Client` cannot be built,
    /// or [`ClientError::InvalidBaseUrl`] for a bad base URL.
    pub fn new(settings: &ClientSettings) -> Result<Self, ClientError> {
        Ok(Self {
            transport: HttpTransport::new("extraction", settings)?,
        })
    }
}

#[async_trait]
impl ExtractionService for HttpExtractionService {
    async fn extract(
        &self,
        request: &ExtractionRequest,
    ) -> Result<ExtractionResponse, ServiceError> {
        let url = self.transport.endpoint(&["v1", "extractions"]);
        self.transport
            .send_json(Method::POST, &url, request)
            .await
            .map_err(|e| e.into_service_error(self.transport.timeout()))
    }
}
