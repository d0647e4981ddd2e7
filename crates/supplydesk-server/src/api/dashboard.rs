//! Read-only dashboard aggregates. Every handler here degrades to empty
//! values when a query fails, except `validation-trends` which rejects bad
//! input.

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use supplydesk_core::{Alert, SupplierPerformance};
use supplydesk_pipeline::{
    ActivityEvent, AiMetrics, ConfidenceDistribution, DashboardStats, SystemHealth, TrendPoint,
};

use crate::middleware::RequestId;

use super::{map_pipeline_error, normalize_limit, ApiError, ApiResponse, AppState};

const DEFAULT_TREND_DAYS: i32 = 30;

#[derive(Debug, Deserialize)]
pub(super) struct LimitQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(super) struct AiMetricsQuery {
    /// RFC 3339 lower bound; all history when absent.
    pub since: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub(super) struct TrendQuery {
    pub days: Option<i32>,
}

pub(super) async fn stats(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Json<ApiResponse<DashboardStats>> {
    ApiResponse::new(
        supplydesk_pipeline::dashboard_stats(&state.pipeline).await,
        req_id,
    )
}

pub(super) async fn system_health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Json<ApiResponse<SystemHealth>> {
    ApiResponse::new(
        supplydesk_pipeline::system_health(&state.pipeline).await,
        req_id,
    )
}

pub(super) async fn recent_activity(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<LimitQuery>,
) -> Json<ApiResponse<Vec<ActivityEvent>>> {
    let limit = normalize_limit(query.limit, 20);
    ApiResponse::new(
        supplydesk_pipeline::recent_activity(&state.pipeline, limit).await,
        req_id,
    )
}

pub(super) async fn top_suppliers(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<ApiResponse<Vec<SupplierPerformance>>>, ApiError> {
    let limit = usize::try_from(normalize_limit(query.limit, 10)).unwrap_or(10);
    let data = supplydesk_pipeline::top_suppliers(&state.pipeline, limit)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::new(data, req_id))
}

pub(super) async fn ai_metrics(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<AiMetricsQuery>,
) -> Json<ApiResponse<AiMetrics>> {
    ApiResponse::new(
        supplydesk_pipeline::ai_metrics(&state.pipeline, query.since).await,
        req_id,
    )
}

pub(super) async fn validation_trends(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<TrendQuery>,
) -> Result<Json<ApiResponse<Vec<TrendPoint>>>, ApiError> {
    let days = query.days.unwrap_or(DEFAULT_TREND_DAYS);
    let data = supplydesk_pipeline::validation_trends(&state.pipeline, days)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::new(data, req_id))
}

pub(super) async fn system_alerts(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Json<ApiResponse<Vec<Alert>>> {
    ApiResponse::new(
        supplydesk_pipeline::system_alerts(&state.pipeline).await,
        req_id,
    )
}

pub(super) async fn confidence_distribution(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Json<ApiResponse<ConfidenceDistribution>> {
    ApiResponse::new(
        supplydesk_pipeline::confidence_distribution(&state.pipeline).await,
        req_id,
    )
}
