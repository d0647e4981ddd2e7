use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use supplydesk_core::{ProcessingStatus, ValidationStatus};
use supplydesk_db::{ExtractedProductRow, FailedOperationRow, SubmissionRow};
use supplydesk_pipeline::{ProcessOutcome, SubmissionQuery};
use uuid::Uuid;

use crate::middleware::RequestId;

use super::validations::ValidationItem;
use super::{map_pipeline_error, validation_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Serialize)]
pub(super) struct SubmissionItem {
    id: Uuid,
    source_message_id: String,
    supplier_phone: String,
    supplier_id: Option<String>,
    supplier_name: Option<String>,
    content_type: String,
    processing_status: String,
    validation_status: String,
    overall_confidence: Option<f64>,
    extraction_attempt: i32,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl From<SubmissionRow> for SubmissionItem {
    fn from(row: SubmissionRow) -> Self {
        Self {
            id: row.public_id,
            source_message_id: row.source_message_id,
            supplier_phone: row.supplier_phone,
            supplier_id: row.supplier_id,
            supplier_name: row.supplier_name,
            content_type: row.content_type,
            processing_status: row.processing_status,
            validation_status: row.validation_status,
            overall_confidence: row.overall_confidence,
            extraction_attempt: row.extraction_attempt,
            last_error: row.last_error,
            created_at: row.created_at,
            processed_at: row.processed_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct ProductItem {
    id: i64,
    extraction_attempt: i32,
    name: String,
    brand: Option<String>,
    category: Option<String>,
    condition: Option<String>,
    grade: Option<String>,
    price: Option<Decimal>,
    currency: Option<String>,
    quantity: Option<i32>,
    specifications: serde_json::Value,
    field_confidence: serde_json::Value,
    confidence: f64,
    model: String,
    catalog_product_id: Option<String>,
    inventory_synced_at: Option<DateTime<Utc>>,
}

impl From<ExtractedProductRow> for ProductItem {
    fn from(row: ExtractedProductRow) -> Self {
        Self {
            id: row.id,
            extraction_attempt: row.extraction_attempt,
            name: row.name,
            brand: row.brand,
            category: row.category,
            condition: row.condition,
            grade: row.grade,
            price: row.price,
            currency: row.currency,
            quantity: row.quantity,
            specifications: row.specifications,
            field_confidence: row.field_confidence,
            confidence: row.confidence,
            model: row.model,
            catalog_product_id: row.catalog_product_id,
            inventory_synced_at: row.inventory_synced_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct OperationItem {
    id: i64,
    extracted_product_id: Option<i64>,
    operation_type: String,
    state: String,
    last_error: String,
    retry_count: i32,
    max_retries: i32,
    manual_attempts: i32,
    next_retry_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<FailedOperationRow> for OperationItem {
    fn from(row: FailedOperationRow) -> Self {
        Self {
            id: row.id,
            extracted_product_id: row.extracted_product_id,
            operation_type: row.operation_type,
            state: row.state,
            last_error: row.last_error,
            retry_count: row.retry_count,
            max_retries: row.max_retries,
            manual_attempts: row.manual_attempts,
            next_retry_at: row.next_retry_at,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct SubmissionDetailItem {
    #[serde(flatten)]
    submission: SubmissionItem,
    products: Vec<ProductItem>,
    validation_items: Vec<ValidationItem>,
    operations: Vec<OperationItem>,
}

#[derive(Debug, Serialize)]
pub(super) struct SubmissionPage {
    items: Vec<SubmissionItem>,
    page: i64,
    limit: i64,
}

#[derive(Debug, Deserialize)]
pub(super) struct ListQuery {
    pub processing_status: Option<String>,
    pub validation_status: Option<String>,
    pub supplier_id: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

fn parse_status<T>(req_id: &str, field: &str, value: Option<&str>) -> Result<Option<T>, ApiError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .map(|v| {
            v.parse::<T>()
                .map_err(|e| validation_error(req_id, format!("{field}: {e}")))
        })
        .transpose()
}

pub(super) async fn list_submissions(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<SubmissionPage>>, ApiError> {
    let rid = &req_id.0;
    let processing_status: Option<ProcessingStatus> =
        parse_status(rid, "processing_status", query.processing_status.as_deref())?;
    let validation_status: Option<ValidationStatus> =
        parse_status(rid, "validation_status", query.validation_status.as_deref())?;

    let (rows, window) = supplydesk_pipeline::list_submissions(
        &state.pipeline,
        &SubmissionQuery {
            processing_status,
            validation_status,
            supplier_id: query.supplier_id,
            page: query.page,
            limit: query.limit,
        },
    )
    .await
    .map_err(|e| map_pipeline_error(rid.clone(), &e))?;

    let data = SubmissionPage {
        items: rows.into_iter().map(SubmissionItem::from).collect(),
        page: window.page,
        limit: window.limit,
    };
    Ok(ApiResponse::new(data, req_id))
}

pub(super) async fn get_submission(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(submission_id): Path<Uuid>,
) -> Result<Json<ApiResponse<SubmissionDetailItem>>, ApiError> {
    let detail = supplydesk_pipeline::submission_detail(&state.pipeline, submission_id)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    let data = SubmissionDetailItem {
        submission: detail.submission.into(),
        products: detail.products.into_iter().map(ProductItem::from).collect(),
        validation_items: detail
            .validation_items
            .into_iter()
            .map(ValidationItem::from)
            .collect(),
        operations: detail.operations.into_iter().map(OperationItem::from).collect(),
    };
    Ok(ApiResponse::new(data, req_id))
}

/// POST /api/v1/submissions/{id}/process — runs extraction inline for a
/// `pending` submission.
pub(super) async fn process_submission(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(submission_id): Path<Uuid>,
) -> Result<Json<ApiResponse<ProcessOutcome>>, ApiError> {
    let data = supplydesk_pipeline::process_submission(&state.pipeline, submission_id)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::new(data, req_id))
}

/// POST /api/v1/submissions/{id}/reprocess — only from `failed`.
pub(super) async fn reprocess_submission(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(submission_id): Path<Uuid>,
) -> Result<Json<ApiResponse<ProcessOutcome>>, ApiError> {
    let data = supplydesk_pipeline::reprocess_submission(&state.pipeline, submission_id)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::new(data, req_id))
}
