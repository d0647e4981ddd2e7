use axum::{extract::State, http::StatusCode, Extension, Json};
use serde::Serialize;
use supplydesk_pipeline::{InboundMessage, PipelineError};
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{map_pipeline_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Serialize)]
pub(super) struct ReceiptItem {
    submission_id: Uuid,
    duplicate: bool,
}

/// POST /api/v1/webhook/messages
///
/// A redelivered message answers 200 with the original submission id so
/// the sender stops retrying; a new one answers 202.
pub(super) async fn receive_message(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(message): Json<InboundMessage>,
) -> Result<(StatusCode, Json<ApiResponse<ReceiptItem>>), ApiError> {
    match supplydesk_pipeline::receive(&state.pipeline, &state.queue, &message).await {
        Ok(submission_id) => Ok((
            StatusCode::ACCEPTED,
            ApiResponse::new(
                ReceiptItem {
                    submission_id,
                    duplicate: false,
                },
                req_id,
            ),
        )),
        Err(PipelineError::DuplicateSubmission { existing, .. }) => Ok((
            StatusCode::OK,
            ApiResponse::new(
                ReceiptItem {
                    submission_id: existing,
                    duplicate: true,
                },
                req_id,
            ),
        )),
        Err(e) => Err(map_pipeline_error(req_id.0, &e)),
    }
}
