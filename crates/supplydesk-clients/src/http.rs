//! Shared JSON-over-HTTP transport for the service clients.

use std::time::Duration;

use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use supplydesk_core::AppConfig;

use crate::error::ClientError;
use crate::retry::retry_with_backoff;

/// Error bodies longer than this are truncated before being stored.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Connection and retry settings for one downstream service.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl ClientSettings {
    fn from_app_config(config: &AppConfig, base_url: &str, timeout_secs: u64) -> Self {
        Self {
            base_url: base_url.to_owned(),
            api_key: config.service_api_key.clone(),
            timeout: Duration::from_secs(timeout_secs),
            max_retries: config.client_max_retries,
            backoff_base_ms: config.client_backoff_base_ms,
        }
    }

    /// Extraction calls get their own, longer, timeout.
    #[must_use]
    pub fn extraction(config: &AppConfig) -> Self {
        Self::from_app_config(config, &config.extraction_url, config.extraction_timeout_secs)
    }

    #[must_use]
    pub fn catalog(config: &AppConfig) -> Self {
        Self::from_app_config(config, &config.catalog_url, config.service_timeout_secs)
    }

    #[must_use]
    pub fn directory(config: &AppConfig) -> Self {
        Self::from_app_config(config, &config.directory_url, config.service_timeout_secs)
    }
}

pub(crate) struct HttpTransport {
    service: &'static str,
    client: Client,
    base_url: Url,
    api_key: Option<String>,
    timeout: Duration,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl HttpTransport {
    pub(crate) fn new(service: &'static str, settings: &ClientSettings) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent("supplydesk/0.1 (supplier-ingestion)")
            .build()?;

        // Exactly one trailing slash so joined paths extend the base path.
        let normalised = format!("{}/", settings.base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| ClientError::InvalidBaseUrl {
            url: settings.base_url.clone(),
            reason: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidBaseUrl {
                url: settings.base_url.clone(),
                reason: "URL cannot carry a path".to_owned(),
            });
        }

        Ok(Self {
            service,
            client,
            base_url,
            api_key: settings.api_key.clone(),
            timeout: settings.timeout,
            max_retries: settings.max_retries,
            backoff_base_ms: settings.backoff_base_ms,
        })
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Appends percent-encoded path segments to the base URL.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Sends `body` as JSON and decodes a JSON reply.
    pub(crate) async fn send_json<B, T>(
        &self,
        method: Method,
        url: &Url,
        body: &B,
    ) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let this = self;
        retry_with_backoff(self.service, self.max_retries, self.backoff_base_ms, move || {
            let method = method.clone();
            async move {
                let request = this.authorized(this.client.request(method, url.clone())).json(body);
                let response = request.send().await?;
                let text = this.check_status(response).await?;
                decode(url, &text)
            }
        })
        .await
    }

    /// GETs a JSON resource; `404 Not Found` is `Ok(None)`.
    pub(crate) async fn get_optional<T>(&self, url: &Url) -> Result<Option<T>, ClientError>
    where
        T: DeserializeOwned,
    {
        let this = self;
        retry_with_backoff(self.service, self.max_retries, self.backoff_base_ms, move || async move {
            let response = this.authorized(this.client.get(url.clone())).send().await?;
            if response.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            let text = this.check_status(response).await?;
            decode(url, &text).map(Some)
        })
        .await
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn check_status(&self, response: reqwest::Response) -> Result<String, ClientError> {
        let status = response.status();
        let text = response.text().await?;
        if status.is_success() {
            return Ok(text);
        }
        Err(ClientError::Status {
            service: self.service,
            status: status.as_u16(),
            body: text.chars().take(MAX_ERROR_BODY_CHARS).collect(),
        })
    }
}

fn decode<T: DeserializeOwned>(url: &Url, text: &str) -> Result<T, ClientError> {
    serde_json::from_str(text).map_err(|source| ClientError::Deserialize {
        context: url.path().to_owned(),
        source,
    })
}
