//! Client for the inventory catalog.

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use supplydesk_core::{CatalogProduct, CatalogProductId, CatalogService, ServiceError};

use crate::error::ClientError;
use crate::http::{ClientSettings, HttpTransport};

#[derive(Debug, Deserialize)]
struct UpsertResponse {
    id: CatalogProductId,
}

/// Upserts approved products with `PUT {base}/v1/products/{external_ref}`,
/// so pushing the same product twice updates the existing catalog entry.
pub struct HttpCatalogService {
    transport: HttpTransport,
}

impl HttpCatalogService {
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the `reqwest::Client` cannot be built,
    /// or [`ClientError::InvalidBaseUrl`] for a bad base URL.
    pub fn new(settings: &ClientSettings) -> Result<Self, ClientError> {
        Ok(Self {
            transport: HttpTransport::new("catalog", settings)?,
        })
    }
}

#[async_trait]
impl CatalogService for HttpCatalogService {
    async fn create_or_update_product(
        &self,
        product: &CatalogProduct,
    ) -> Result<CatalogProductId, ServiceError> {
        let url = self
            .transport
            .endpoint(&["v1", "products", &product.external_ref]);
        let response: UpsertResponse = self
            .transport
            .send_json(Method::PUT, &url, product)
            .await
            .map_err(|e| e.into_service_error(self.transport.timeout()))?;
        Ok(response.id)
    }
}
