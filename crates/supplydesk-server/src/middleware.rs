use std::{
    collections::HashSet,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Header carrying the shared secret on webhook deliveries.
pub const WEBHOOK_TOKEN_HEADER: &str = "x-webhook-token";

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Correlation id of the current request, available as an extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Bearer API keys accepted on the operator API.
#[derive(Debug, Clone)]
pub struct AuthState {
    api_keys: Arc<HashSet<String>>,
    pub enabled: bool,
}

impl AuthState {
    /// Builds auth config from the configured bearer tokens.
    ///
    /// In development, an empty key list disables auth for local iteration.
    /// Elsewhere an empty list fails startup.
    ///
    /// # Errors
    ///
    /// Returns an error when no keys are configured outside development.
    pub fn from_keys(keys: &[String], is_development: bool) -> anyhow::Result<Self> {
        let keys: HashSet<String> = keys
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned)
            .collect();

        if keys.is_empty() {
            if is_development {
                tracing::warn!(
                    "SUPPLYDESK_API_KEYS not set; bearer auth disabled in development environment"
                );
                return Ok(Self::disabled());
            }

            anyhow::bail!(
                "SUPPLYDESK_API_KEYS is required outside development; provide comma-separated bearer tokens"
            );
        }

        Ok(Self {
            api_keys: Arc::new(keys),
            enabled: true,
        })
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self {
            api_keys: Arc::new(HashSet::new()),
            enabled: false,
        }
    }

    fn allows(&self, token: &str) -> bool {
        self.api_keys
            .iter()
            .any(|key| bool::from(key.as_bytes().ct_eq(token.as_bytes())))
    }
}

/// Shared secret expected on inbound webhook deliveries.
#[derive(Debug, Clone)]
pub struct WebhookAuth {
    token: Option<Arc<str>>,
}

impl WebhookAuth {
    /// # Errors
    ///
    /// Returns an error when no token is configured outside development.
    pub fn from_token(token: Option<&str>, is_development: bool) -> anyhow::Result<Self> {
        match token.map(str::trim).filter(|t| !t.is_empty()) {
            Some(token) => Ok(Self {
                token: Some(Arc::from(token)),
            }),
            None if is_development => {
                tracing::warn!(
                    "SUPPLYDESK_WEBHOOK_VERIFY_TOKEN not set; webhook verification disabled in development environment"
                );
                Ok(Self { token: None })
            }
            None => anyhow::bail!(
                "SUPPLYDESK_WEBHOOK_VERIFY_TOKEN is required outside development"
            ),
        }
    }

    fn verifies(&self, presented: Option<&HeaderValue>) -> bool {
        let Some(expected) = &self.token else {
            return true;
        };
        presented.is_some_and(|value| bool::from(value.as_bytes().ct_eq(expected.as_bytes())))
    }
}

#[derive(Debug)]
struct Window {
    opened: Instant,
    admitted: usize,
}

/// Fixed-window request budget shared by every protected route.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    budget: usize,
    length: Duration,
    window: Arc<Mutex<Window>>,
}

impl RateLimitState {
    #[must_use]
    pub fn new(budget: usize, length: Duration) -> Self {
        Self {
            budget,
            length,
            window: Arc::new(Mutex::new(Window {
                opened: Instant::now(),
                admitted: 0,
            })),
        }
    }

    #[must_use]
    pub fn per_minute(budget: usize) -> Self {
        Self::new(budget, Duration::from_secs(60))
    }

    /// Counts one request against the current window; `false` once the
    /// budget is spent.
    async fn admit(&self) -> bool {
        let mut window = self.window.lock().await;
        if window.opened.elapsed() >= self.length {
            *window = Window {
                opened: Instant::now(),
                admitted: 0,
            };
        }
        if window.admitted >= self.budget {
            return false;
        }
        window.admitted += 1;
        true
    }
}

#[derive(Debug, Serialize)]
struct MiddlewareErrorBody {
    error: MiddlewareError,
}

#[derive(Debug, Serialize)]
struct MiddlewareError {
    code: &'static str,
    message: &'static str,
}

fn reject(status: StatusCode, code: &'static str, message: &'static str) -> Response {
    (
        status,
        Json(MiddlewareErrorBody {
            error: MiddlewareError { code, message },
        }),
    )
        .into_response()
}

/// Propagates the caller's `x-request-id`, or mints one, onto the request
/// extensions and the response.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map_or_else(|| Uuid::new_v4().to_string(), ToOwned::to_owned);
    req.extensions_mut().insert(RequestId(id.clone()));

    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

pub async fn require_bearer_auth(
    State(auth): State<AuthState>,
    req: Request,
    next: Next,
) -> Response {
    if !auth.enabled {
        return next.run(req).await;
    }

    match extract_bearer_token(req.headers().get(AUTHORIZATION)) {
        Some(token) if auth.allows(token) => next.run(req).await,
        _ => reject(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "missing or invalid bearer token",
        ),
    }
}

/// Middleware checking the webhook verify token in constant time.
pub async fn require_webhook_token(
    State(webhook): State<WebhookAuth>,
    req: Request,
    next: Next,
) -> Response {
    if webhook.verifies(req.headers().get(WEBHOOK_TOKEN_HEADER)) {
        next.run(req).await
    } else {
        tracing::warn!("webhook delivery rejected: bad verify token");
        reject(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "missing or invalid webhook token",
        )
    }
}

pub async fn enforce_rate_limit(
    State(rate_limit): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    if rate_limit.admit().await {
        next.run(req).await
    } else {
        reject(
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limited",
            "request budget for this window is spent",
        )
    }
}

fn extract_bearer_token(value: Option<&HeaderValue>) -> Option<&str> {
    let token = value?.to_str().ok()?.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}
