//! Operator review of extracted products.

use std::collections::HashSet;

use serde::Serialize;
use supplydesk_core::{OperationType, QueueFilters, RejectionFeedback, ValidationStatus};
use supplydesk_db::{Decision, DecisionOutcome, PendingItemsQuery, ValidationItemRow};

use crate::context::PipelineContext;
use crate::error::PipelineError;
use crate::recovery::{self, not_found_as};
use crate::worker;

/// Most items accepted by one bulk request.
pub const MAX_BULK_ITEMS: usize = 100;

#[derive(Debug, Clone)]
pub struct PendingPage {
    pub items: Vec<ValidationItemRow>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

#[derive(Debug, Clone)]
pub struct DecisionResult {
    pub item: ValidationItemRow,
    pub submission_validation_status: ValidationStatus,
}

impl From<DecisionOutcome> for DecisionResult {
    fn from(outcome: DecisionOutcome) -> Self {
        Self {
            item: outcome.item,
            submission_validation_status: outcome.submission_status,
        }
    }
}

/// Per-item result of a bulk decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkItemResult {
    pub id: i64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkReport {
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<BulkItemResult>,
}

impl BulkReport {
    fn from_results(results: Vec<BulkItemResult>) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        Self {
            succeeded,
            failed: results.len() - succeeded,
            results,
        }
    }
}

/// One page of items waiting for an operator.
///
/// # Errors
///
/// Returns [`PipelineError::Core`] for invalid filters, or
/// [`PipelineError::Db`] if the query fails.
pub async fn list_pending(ctx: &PipelineContext, filters: &QueueFilters) -> Result<PendingPage, PipelineError> {
    filters.validate()?;
    let window = filters.window();

    let (items, total) = supplydesk_db::list_pending_items(
        &ctx.pool,
        &PendingItemsQuery {
            supplier_id: filters.supplier_id.as_deref(),
            content_type: filters.content_type,
            priority: filters.priority,
            min_confidence: filters.min_confidence,
            max_confidence: filters.max_confidence,
            below_confidence: ctx.policy.validation.auto_approve_threshold,
            limit: window.limit,
            offset: window.offset,
        },
    )
    .await?;

    Ok(PendingPage {
        items,
        total,
        page: window.page,
        limit: window.limit,
    })
}

/// Approves a pending item and pushes the product to the catalog.
///
/// When this approval settles the submission, the products held back while
/// the review was open are released to the catalog as well. A failed catalog
/// sync or release does not undo the approval; it is retried by recovery.
///
/// # Errors
///
/// Returns [`PipelineError::NotFound`], [`PipelineError::AlreadyDecided`],
/// or [`PipelineError::Db`].
pub async fn approve(
    ctx: &PipelineContext,
    item_id: i64,
    notes: Option<&str>,
) -> Result<DecisionResult, PipelineError> {
    let outcome = supplydesk_db::decide_validation_item(&ctx.pool, item_id, Decision::Approve { notes })
        .await
        .map_err(|e| not_found_as(e, "validation item"))?;

    tracing::info!(
        item_id,
        submission_status = %outcome.submission_status,
        "validation item approved"
    );
    let submission_id = outcome.item.submission_id;
    worker::fire_inventory_hook(ctx, submission_id, outcome.item.extracted_product_id).await;
    if outcome.submission_status == ValidationStatus::Approved {
        release_held(ctx, submission_id).await;
    }
    Ok(outcome.into())
}

async fn release_held(ctx: &PipelineContext, submission_id: i64) {
    if let Err(e) = worker::route_submission(ctx, submission_id).await {
        tracing::warn!(submission_id, error = %e, "releasing held products failed");
        if let Err(record_err) = recovery::schedule_failure(
            ctx,
            submission_id,
            None,
            OperationType::Validation,
            &format!("releasing held products failed: {e}"),
        )
        .await
        {
            tracing::error!(submission_id, error = %record_err, "could not record validation failure");
        }
    }
}

/// Rejects a pending item with structured feedback.
///
/// The submission becomes `rejected`, and products held back on the review
/// are never sent to the catalog.
///
/// # Errors
///
/// Returns [`PipelineError::Core`] for empty or invalid feedback (nothing is
/// changed), [`PipelineError::NotFound`], [`PipelineError::AlreadyDecided`],
/// or [`PipelineError::Db`].
pub async fn reject(
    ctx: &PipelineContext,
    item_id: i64,
    feedback: &RejectionFeedback,
    notes: Option<&str>,
) -> Result<DecisionResult, PipelineError> {
    let feedback = feedback.validated()?;
    let outcome = supplydesk_db::decide_validation_item(
        &ctx.pool,
        item_id,
        Decision::Reject {
            feedback: &feedback,
            notes,
        },
    )
    .await
    .map_err(|e| not_found_as(e, "validation item"))?;

    tracing::info!(
        item_id,
        reasons = feedback.reasons.len(),
        submission_status = %outcome.submission_status,
        "validation item rejected"
    );
    Ok(outcome.into())
}

/// Approves each item independently.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidRequest`] when `ids` is empty or too long.
pub async fn bulk_approve(
    ctx: &PipelineContext,
    ids: &[i64],
    notes: Option<&str>,
) -> Result<BulkReport, PipelineError> {
    let ids = bulk_ids(ids)?;
    let mut results = Vec::with_capacity(ids.len());
    for id in ids {
        results.push(item_result(id, approve(ctx, id, notes).await));
    }
    Ok(BulkReport::from_results(results))
}

/// Rejects each item independently with the same feedback.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidRequest`] when `ids` is empty or too long,
/// or [`PipelineError::Core`] when the feedback is invalid.
pub async fn bulk_reject(
    ctx: &PipelineContext,
    ids: &[i64],
    feedback: &RejectionFeedback,
    notes: Option<&str>,
) -> Result<BulkReport, PipelineError> {
    let ids = bulk_ids(ids)?;
    let feedback = feedback.validated()?;
    let mut results = Vec::with_capacity(ids.len());
    for id in ids {
        results.push(item_result(id, reject(ctx, id, &feedback, notes).await));
    }
    Ok(BulkReport::from_results(results))
}

/// Distinct ids in request order.
fn bulk_ids(ids: &[i64]) -> Result<Vec<i64>, PipelineError> {
    if ids.is_empty() {
        return Err(PipelineError::InvalidRequest("ids must not be empty".to_string()));
    }
    let mut seen = HashSet::new();
    let unique: Vec<i64> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();
    if unique.len() > MAX_BULK_ITEMS {
        return Err(PipelineError::InvalidRequest(format!(
            "at most {MAX_BULK_ITEMS} ids per request, got {}",
            unique.len()
        )));
    }
    Ok(unique)
}

fn item_result(id: i64, result: Result<DecisionResult, PipelineError>) -> BulkItemResult {
    match result {
        Ok(_) => BulkItemResult {
            id,
            success: true,
            error_code: None,
            error: None,
        },
        Err(e) => BulkItemResult {
            id,
            success: false,
            error_code: Some(e.code()),
            error: Some(e.to_string()),
        },
    }
}
