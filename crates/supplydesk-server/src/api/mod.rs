mod dashboard;
mod recovery;
mod submissions;
mod suppliers;
mod validations;
mod webhook;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use supplydesk_pipeline::{ExtractionQueue, PipelineContext, PipelineError};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::{
    enforce_rate_limit, request_id, require_bearer_auth, require_webhook_token, AuthState,
    RateLimitState, RequestId, WebhookAuth, REQUEST_ID_HEADER, WEBHOOK_TOKEN_HEADER,
};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: PipelineContext,
    pub queue: ExtractionQueue,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub(super) fn new(data: T, request_id: RequestId) -> Json<Self> {
        Json(Self {
            data,
            meta: ResponseMeta::new(request_id.0),
        })
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

fn status_for_code(code: &str) -> StatusCode {
    match code {
        "not_found" => StatusCode::NOT_FOUND,
        "unauthorized" => StatusCode::UNAUTHORIZED,
        "bad_request" | "validation_error" | "invalid_request" | "empty_feedback"
        | "malformed_message" | "unsupported_content_type" => StatusCode::BAD_REQUEST,
        "conflict" | "invalid_transition" | "already_decided" | "nothing_to_retry"
        | "duplicate_submission" => StatusCode::CONFLICT,
        "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
        "upstream_error" => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = status_for_code(&self.error.code);
        (status, Json(self)).into_response()
    }
}

pub(super) fn map_pipeline_error(request_id: String, error: &PipelineError) -> ApiError {
    match error {
        PipelineError::Db(e) => {
            tracing::error!(error = %e, "database query failed");
            ApiError::new(request_id, error.code(), "database query failed")
        }
        PipelineError::Service { service, source } => {
            tracing::warn!(service, error = %source, "downstream service call failed");
            ApiError::new(request_id, error.code(), error.to_string())
        }
        _ => ApiError::new(request_id, error.code(), error.to_string()),
    }
}

/// Bad query or path input that never reached the pipeline.
pub(super) fn validation_error(request_id: &str, message: impl Into<String>) -> ApiError {
    ApiError::new(request_id, "validation_error", message)
}

pub(super) fn normalize_limit(limit: Option<i64>, default: i64) -> i64 {
    limit.unwrap_or(default).clamp(1, 100)
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(REQUEST_ID_HEADER),
            HeaderName::from_static(WEBHOOK_TOKEN_HEADER),
        ])
}

fn webhook_router(webhook: WebhookAuth) -> Router<AppState> {
    Router::new()
        .route("/api/v1/webhook/messages", post(webhook::receive_message))
        .layer(axum::middleware::from_fn_with_state(
            webhook,
            require_webhook_token,
        ))
}

fn protected_router(auth: AuthState, rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/dashboard/stats", get(dashboard::stats))
        .route("/api/v1/dashboard/health", get(dashboard::system_health))
        .route(
            "/api/v1/dashboard/recent-activity",
            get(dashboard::recent_activity),
        )
        .route(
            "/api/v1/dashboard/top-suppliers",
            get(dashboard::top_suppliers),
        )
        .route("/api/v1/dashboard/ai-metrics", get(dashboard::ai_metrics))
        .route(
            "/api/v1/dashboard/validation-trends",
            get(dashboard::validation_trends),
        )
        .route(
            "/api/v1/dashboard/system-alerts",
            get(dashboard::system_alerts),
        )
        .route(
            "/api/v1/dashboard/confidence-distribution",
            get(dashboard::confidence_distribution),
        )
        .route(
            "/api/v1/suppliers/{supplier_id}/performance",
            get(suppliers::supplier_performance),
        )
        .route("/api/v1/recovery/queue", get(recovery::queue))
        .route("/api/v1/recovery/stats", get(recovery::stats))
        .route(
            "/api/v1/recovery/retry/{submission_id}",
            post(recovery::retry),
        )
        .route("/api/v1/submissions", get(submissions::list_submissions))
        .route(
            "/api/v1/submissions/{submission_id}",
            get(submissions::get_submission),
        )
        .route(
            "/api/v1/submissions/{submission_id}/process",
            post(submissions::process_submission),
        )
        .route(
            "/api/v1/submissions/{submission_id}/reprocess",
            post(submissions::reprocess_submission),
        )
        .route("/api/v1/validations", get(validations::list_pending))
        .route(
            "/api/v1/validations/{item_id}/approve",
            post(validations::approve),
        )
        .route(
            "/api/v1/validations/{item_id}/reject",
            post(validations::reject),
        )
        .route(
            "/api/v1/validations/bulk-approve",
            post(validations::bulk_approve),
        )
        .route(
            "/api/v1/validations/bulk-reject",
            post(validations::bulk_reject),
        )
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    enforce_rate_limit,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    auth,
                    require_bearer_auth,
                )),
        )
}

pub fn build_app(
    state: AppState,
    auth: AuthState,
    webhook: WebhookAuth,
    rate_limit: RateLimitState,
) -> Router {
    let public_routes = Router::new().route("/api/v1/health", get(health));

    Router::new()
        .merge(public_routes)
        .merge(webhook_router(webhook))
        .merge(protected_router(auth, rate_limit))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    match supplydesk_db::health_check(&state.pipeline.pool).await {
        Ok(()) => (
            StatusCode::OK,
            ApiResponse::new(
                HealthData {
                    status: "ok",
                    database: "ok",
                },
                req_id,
            ),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                ApiResponse::new(
                    HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    req_id,
                ),
            )
        }
    }
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
