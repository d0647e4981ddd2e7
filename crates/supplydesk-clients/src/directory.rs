//! Client for the supplier directory.

use async_trait::async_trait;
use supplydesk_core::{ServiceError, SupplierDirectory, SupplierRecord};

use crate::error::ClientError;
use crate::http::{ClientSettings, HttpTransport};

/// Looks suppliers up with `GET {base}/v1/suppliers/{phone_or_id}`.
/// An unknown supplier is a `404`, reported as `Ok(None)`.
pub struct HttpSupplierDirectory {
    transport: HttpTransport,
}

impl HttpSupplierDirectory {
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the `reqwest::Client` cannot be built,
    /// or [`ClientError::InvalidBaseUrl`] for a bad base URL.
    pub fn new(settings: &ClientSettings) -> Result<Self, ClientError> {
        Ok(Self {
            transport: HttpTransport::new("directory", settings)?,
        })
    }
}

#[async_trait]
impl SupplierDirectory for HttpSupplierDirectory {
    async fn get_supplier(&self, phone_or_id: &str) -> Result<Option<SupplierRecord>, ServiceError> {
        let url = self.transport.endpoint(&["v1", "suppliers", phone_or_id]);
        self.transport
            .get_optional(&url)
            .await
            .map_err(|e| e.into_service_error(self.transport.timeout()))
    }
}
