//! Submission lookups and operator-triggered processing, addressed by
//! public id.

use supplydesk_core::{PageWindow, ProcessingEvent, ProcessingStatus, ValidationStatus};
use supplydesk_db::{
    ExtractedProductRow, FailedOperationRow, SubmissionListFilter, SubmissionRow,
    ValidationItemRow,
};
use uuid::Uuid;

use crate::context::PipelineContext;
use crate::error::PipelineError;
use crate::recovery::not_found_as;
use crate::worker::{self, ProcessOutcome};

#[derive(Debug, Clone)]
pub struct SubmissionDetail {
    pub submission: SubmissionRow,
    pub products: Vec<ExtractedProductRow>,
    pub validation_items: Vec<ValidationItemRow>,
    pub operations: Vec<FailedOperationRow>,
}

#[derive(Debug, Clone, Default)]
pub struct SubmissionQuery {
    pub processing_status: Option<ProcessingStatus>,
    pub validation_status: Option<ValidationStatus>,
    pub supplier_id: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// # Errors
///
/// Returns [`PipelineError::NotFound`] for an unknown id.
pub async fn find_submission(ctx: &PipelineContext, public_id: Uuid) -> Result<SubmissionRow, PipelineError> {
    supplydesk_db::get_submission_by_public_id(&ctx.pool, public_id)
        .await
        .map_err(|e| not_found_as(e, "submission"))
}

/// A submission with its products, review items and outstanding operations.
///
/// # Errors
///
/// Returns [`PipelineError::NotFound`] for an unknown id, or
/// [`PipelineError::Db`] if a query fails.
pub async fn submission_detail(ctx: &PipelineContext, public_id: Uuid) -> Result<SubmissionDetail, PipelineError> {
    let submission = find_submission(ctx, public_id).await?;
    let products = supplydesk_db::list_products_for_submission(&ctx.pool, submission.id).await?;
    let validation_items = supplydesk_db::list_items_for_submission(&ctx.pool, submission.id).await?;
    let operations = supplydesk_db::list_operations_for_submission(&ctx.pool, submission.id).await?;

    Ok(SubmissionDetail {
        submission,
        products,
        validation_items,
        operations,
    })
}

/// # Errors
///
/// Returns [`PipelineError::Db`] if the query fails.
pub async fn list_submissions(
    ctx: &PipelineContext,
    query: &SubmissionQuery,
) -> Result<(Vec<SubmissionRow>, PageWindow), PipelineError> {
    let window = PageWindow::from_params(query.page, query.limit);
    let rows = supplydesk_db::list_submissions(
        &ctx.pool,
        &SubmissionListFilter {
            processing_status: query.processing_status,
            validation_status: query.validation_status,
            supplier_id: query.supplier_id.as_deref(),
            limit: window.limit,
            offset: window.offset,
        },
    )
    .await?;
    Ok((rows, window))
}

/// Runs extraction now for a `pending` submission.
///
/// # Errors
///
/// See [`worker::process`].
pub async fn process_submission(ctx: &PipelineContext, public_id: Uuid) -> Result<ProcessOutcome, PipelineError> {
    let submission = find_submission(ctx, public_id).await?;
    ensure_transition(&submission, ProcessingEvent::Claim, "pending")?;
    worker::process(ctx, submission.id).await
}

/// Re-runs extraction for a `failed` submission.
///
/// # Errors
///
/// See [`worker::reprocess`].
pub async fn reprocess_submission(
    ctx: &PipelineContext,
    public_id: Uuid,
) -> Result<ProcessOutcome, PipelineError> {
    let submission = find_submission(ctx, public_id).await?;
    ensure_transition(&submission, ProcessingEvent::Reset, "failed")?;
    worker::reprocess(ctx, submission.id).await
}

/// Rejects a request whose stored status cannot take `event`. Concurrent
/// changes are caught later by the guarded update.
fn ensure_transition(
    submission: &SubmissionRow,
    event: ProcessingEvent,
    expected: &'static str,
) -> Result<(), PipelineError> {
    let current: ProcessingStatus = submission.processing_status.parse()?;
    current
        .apply(event)
        .map(|_| ())
        .map_err(|_| PipelineError::InvalidTransition {
            submission: submission.public_id,
            expected,
            actual: submission.processing_status.clone(),
        })
}
