//! Operator review queue: list, approve, reject, and the bulk variants.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use supplydesk_core::{QueueFilters, ReasonCategory, RejectionFeedback, ValidationStatus};
use supplydesk_db::ValidationItemRow;
use supplydesk_pipeline::{BulkReport, DecisionResult};

use crate::middleware::RequestId;

use super::{map_pipeline_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Serialize)]
pub(super) struct ValidationItem {
    id: i64,
    extracted_product_id: i64,
    supplier_id: Option<String>,
    supplier_name: Option<String>,
    supplier_phone: String,
    content_type: String,
    product: serde_json::Value,
    confidence: f64,
    priority: String,
    status: String,
    decided_by: Option<String>,
    notes: Option<String>,
    feedback_reasons: Vec<String>,
    feedback_comment: Option<String>,
    submitted_at: DateTime<Utc>,
    decided_at: Option<DateTime<Utc>>,
}

impl From<ValidationItemRow> for ValidationItem {
    fn from(row: ValidationItemRow) -> Self {
        Self {
            id: row.id,
            extracted_product_id: row.extracted_product_id,
            supplier_id: row.supplier_id,
            supplier_name: row.supplier_name,
            supplier_phone: row.supplier_phone,
            content_type: row.content_type,
            product: row.product_snapshot,
            confidence: row.confidence,
            priority: row.priority,
            status: row.status,
            decided_by: row.decided_by,
            notes: row.notes,
            feedback_reasons: row.feedback_reasons,
            feedback_comment: row.feedback_comment,
            submitted_at: row.submitted_at,
            decided_at: row.decided_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct PendingPageItem {
    items: Vec<ValidationItem>,
    total: i64,
    page: i64,
    limit: i64,
}

#[derive(Debug, Serialize)]
pub(super) struct DecisionItem {
    item: ValidationItem,
    submission_validation_status: ValidationStatus,
}

impl From<DecisionResult> for DecisionItem {
    fn from(result: DecisionResult) -> Self {
        Self {
            item: result.item.into(),
            submission_validation_status: result.submission_validation_status,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct ApproveRequest {
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct RejectRequest {
    #[serde(default)]
    pub reasons: Vec<ReasonCategory>,
    pub comment: Option<String>,
    pub notes: Option<String>,
}

impl RejectRequest {
    fn feedback(&self) -> RejectionFeedback {
        RejectionFeedback {
            reasons: self.reasons.clone(),
            comment: self.comment.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct BulkApproveRequest {
    pub ids: Vec<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct BulkRejectRequest {
    pub ids: Vec<i64>,
    #[serde(flatten)]
    pub rejection: RejectRequest,
}

/// GET /api/v1/validations — pending items, most urgent first.
pub(super) async fn list_pending(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(filters): Query<QueueFilters>,
) -> Result<Json<ApiResponse<PendingPageItem>>, ApiError> {
    let page = supplydesk_pipeline::list_pending(&state.pipeline, &filters)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    let data = PendingPageItem {
        items: page.items.into_iter().map(ValidationItem::from).collect(),
        total: page.total,
        page: page.page,
        limit: page.limit,
    };
    Ok(ApiResponse::new(data, req_id))
}

pub(super) async fn approve(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(item_id): Path<i64>,
    Json(body): Json<ApproveRequest>,
) -> Result<Json<ApiResponse<DecisionItem>>, ApiError> {
    let result = supplydesk_pipeline::approve(&state.pipeline, item_id, body.notes.as_deref())
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::new(result.into(), req_id))
}

pub(super) async fn reject(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(item_id): Path<i64>,
    Json(body): Json<RejectRequest>,
) -> Result<Json<ApiResponse<DecisionItem>>, ApiError> {
    let result = supplydesk_pipeline::reject(
        &state.pipeline,
        item_id,
        &body.feedback(),
        body.notes.as_deref(),
    )
    .await
    .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::new(result.into(), req_id))
}

pub(super) async fn bulk_approve(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<BulkApproveRequest>,
) -> Result<Json<ApiResponse<BulkReport>>, ApiError> {
    let report = supplydesk_pipeline::bulk_approve(&state.pipeline, &body.ids, body.notes.as_deref())
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::new(report, req_id))
}

pub(super) async fn bulk_reject(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<BulkRejectRequest>,
) -> Result<Json<ApiResponse<BulkReport>>, ApiError> {
    let report = supplydesk_pipeline::bulk_reject(
        &state.pipeline,
        &body.ids,
        &body.rejection.feedback(),
        body.rejection.notes.as_deref(),
    )
    .await
    .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::new(report, req_id))
}
