use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use supplydesk_core::PageWindow;
use supplydesk_pipeline::{QueuedOperation, RecoveryStats, RetryReport};
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{map_pipeline_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct QueueQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// GET /api/v1/recovery/queue — live operations, soonest retry first.
pub(super) async fn queue(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<QueueQuery>,
) -> Result<Json<ApiResponse<Vec<QueuedOperation>>>, ApiError> {
    let window = PageWindow::from_params(query.page, query.limit);
    let data = supplydesk_pipeline::recovery_queue(&state.pipeline, window)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::new(data, req_id))
}

pub(super) async fn stats(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<RecoveryStats>>, ApiError> {
    let data = supplydesk_pipeline::recovery_stats(&state.pipeline)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::new(data, req_id))
}

/// POST /api/v1/recovery/retry/{submission_id} — retries every live
/// operation of the submission now, permanently failed ones included.
pub(super) async fn retry(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(submission_id): Path<Uuid>,
) -> Result<Json<ApiResponse<RetryReport>>, ApiError> {
    let data = supplydesk_pipeline::retry_now(&state.pipeline, submission_id)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::new(data, req_id))
}
