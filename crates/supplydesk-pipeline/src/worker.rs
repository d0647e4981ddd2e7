//! Extraction of a single submission and routing of its products.

use std::time::Instant;

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Map, Value};
use supplydesk_core::{
    overall_confidence, CatalogProduct, CatalogProductId, ContentType, ExtractionRequest,
    ExtractionResponse, OperationType, Priority, ProductCandidate, ProductCondition, Route, RoutingPlan,
    ServiceError, ValidationStatus,
};
use supplydesk_db::{
    DbError, ExtractedProductRow, ExtractionOutcome, NewExtractedProduct, NewValidationItem,
    SubmissionRow,
};
use uuid::Uuid;

use crate::context::PipelineContext;
use crate::error::PipelineError;
use crate::recovery;

/// Prefix of the external reference under which products are upserted into
/// the catalog. Stable per product, so repeated syncs update in place.
const CATALOG_REF_PREFIX: &str = "sd-";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessSummary {
    pub submission_id: Uuid,
    pub products: usize,
    pub overall_confidence: f64,
    pub auto_approved: usize,
    pub pending_review: usize,
    /// Products that cleared the threshold but wait on the review outcome.
    pub held: usize,
    /// `None` when routing failed and was handed to recovery.
    pub validation_status: Option<ValidationStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProcessOutcome {
    Completed(ProcessSummary),
    /// The attempt failed; a recovery operation was scheduled.
    Failed { error: String },
    /// A newer attempt owns the submission; this result was discarded.
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoutingSummary {
    pub auto_approved: usize,
    pub pending_review: usize,
    pub held: usize,
    pub validation_status: ValidationStatus,
}

/// Runs one extraction attempt for a `pending` submission.
///
/// Service failures, timeouts and empty results fail the submission and
/// schedule an `ai_extraction` recovery operation; they are reported as
/// [`ProcessOutcome::Failed`], not as errors.
///
/// # Errors
///
/// Returns [`PipelineError::NotFound`] for an unknown submission,
/// [`PipelineError::InvalidTransition`] when it is not `pending`, or
/// [`PipelineError::Db`] if bookkeeping fails.
pub async fn process(ctx: &PipelineContext, submission_id: i64) -> Result<ProcessOutcome, PipelineError> {
    let submission = match supplydesk_db::claim_submission(&ctx.pool, submission_id).await {
        Ok(row) => row,
        Err(e) => return Err(transition_error(ctx, submission_id, e).await),
    };
    let attempt = submission.extraction_attempt;
    tracing::info!(submission_id = %submission.public_id, attempt, "extraction started");

    let started = Instant::now();
    let extracted = extract(ctx, &submission).await;
    let elapsed_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);

    let response = match extracted {
        Ok(response) => response,
        Err(error) => return fail_attempt(ctx, &submission, elapsed_ms, error).await,
    };

    let processing_time_ms = if response.processing_time_ms > 0 {
        response.processing_time_ms
    } else {
        elapsed_ms
    };
    let new_products: Vec<NewExtractedProduct> = response
        .products
        .iter()
        .map(|candidate| new_product(candidate, &response.model, processing_time_ms))
        .collect();
    let confidences: Vec<f64> = new_products.iter().map(|p| p.confidence).collect();
    let overall = overall_confidence(&confidences).unwrap_or(0.0);

    let Some(rows) = supplydesk_db::persist_extraction(
        &ctx.pool,
        submission.id,
        attempt,
        &new_products,
        overall,
        response.transcription.as_deref(),
    )
    .await?
    else {
        tracing::info!(submission_id = %submission.public_id, attempt, "late extraction result discarded");
        return Ok(ProcessOutcome::Superseded);
    };

    supplydesk_db::record_extraction_run(
        &ctx.pool,
        submission.id,
        attempt,
        ExtractionOutcome::Succeeded,
        Some(&response.model),
        processing_time_ms,
        i32::try_from(rows.len()).unwrap_or(i32::MAX),
        None,
    )
    .await?;
    supplydesk_db::resolve_operations_for_submission(
        &ctx.pool,
        submission.id,
        &[OperationType::AiExtraction, OperationType::Webhook],
    )
    .await?;

    let mut summary = ProcessSummary {
        submission_id: submission.public_id,
        products: rows.len(),
        overall_confidence: overall,
        auto_approved: 0,
        pending_review: 0,
        held: 0,
        validation_status: None,
    };

    match route_submission(ctx, submission.id).await {
        Ok(routing) => {
            summary.auto_approved = routing.auto_approved;
            summary.pending_review = routing.pending_review;
            summary.held = routing.held;
            summary.validation_status = Some(routing.validation_status);
        }
        Err(e) => {
            tracing::error!(submission_id = %submission.public_id, error = %e, "routing failed; scheduling retry");
            recovery::schedule_failure(
                ctx,
                submission.id,
                None,
                OperationType::Validation,
                &format!("routing failed: {e}"),
            )
            .await?;
        }
    }

    Ok(ProcessOutcome::Completed(summary))
}

/// Moves a `failed` submission back to `pending` and runs a fresh attempt.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidTransition`] unless the submission is
/// `failed`, plus the errors of [`process`].
pub async fn reprocess(ctx: &PipelineContext, submission_id: i64) -> Result<ProcessOutcome, PipelineError> {
    if let Err(e) = supplydesk_db::reset_failed_submission(&ctx.pool, submission_id).await {
        return Err(transition_error(ctx, submission_id, e).await);
    }
    tracing::info!(submission_id, "submission reset for reprocessing");
    process(ctx, submission_id).await
}

/// Creates validation items for the current attempt's products.
///
/// Sub-threshold products go to review. Products that cleared the threshold
/// are auto-approved, and pushed to the catalog, only once nothing of the
/// submission is pending or rejected; until then they are held. Calling this
/// again after the review releases them.
///
/// Idempotent: products that already have an item are skipped, and only
/// newly auto-approved items trigger the inventory hook.
///
/// # Errors
///
/// Returns [`PipelineError::NotFound`] for an unknown submission or
/// [`PipelineError::Db`] if a statement fails; nothing is written then.
pub async fn route_submission(
    ctx: &PipelineContext,
    submission_id: i64,
) -> Result<RoutingSummary, PipelineError> {
    let submission = supplydesk_db::get_submission(&ctx.pool, submission_id).await?;
    let products: Vec<ExtractedProductRow> =
        supplydesk_db::list_products_for_submission(&ctx.pool, submission_id)
            .await?
            .into_iter()
            .filter(|p| p.extraction_attempt == submission.extraction_attempt)
            .collect();

    let scored: Vec<(f64, Option<Decimal>)> = products
        .iter()
        .map(|p| (p.confidence, offer_value(p)))
        .collect();
    let plan = RoutingPlan::build(&scored, &ctx.policy.validation);

    let items: Vec<NewValidationItem> = products
        .iter()
        .zip(&plan.routes)
        .map(|(product, route)| NewValidationItem {
            extracted_product_id: product.id,
            product_snapshot: snapshot(product),
            confidence: product.confidence,
            priority: match route {
                Route::AutoApprove => Priority::Low,
                Route::Review(priority) => *priority,
            },
            auto_approved: *route == Route::AutoApprove,
        })
        .collect();

    let routed = supplydesk_db::route_products(&ctx.pool, submission_id, &items).await?;

    for item in routed.inserted.iter().filter(|i| i.status == "approved") {
        fire_inventory_hook(ctx, submission_id, item.extracted_product_id).await;
    }

    let pending_review = plan.review_count();
    let summary = RoutingSummary {
        auto_approved: plan.routes.len() - pending_review - routed.held,
        pending_review,
        held: routed.held,
        validation_status: routed.submission_status,
    };
    tracing::info!(
        submission_id = %submission.public_id,
        auto_approved = summary.auto_approved,
        pending_review = summary.pending_review,
        held = summary.held,
        validation_status = %summary.validation_status,
        "products routed"
    );
    Ok(summary)
}

/// Pushes an approved product to the catalog and records the catalog id.
///
/// A product that was already synced is not sent again.
///
/// # Errors
///
/// Returns [`PipelineError::Service`] when the catalog call fails, or
/// [`PipelineError::NotFound`]/[`PipelineError::Db`] for lookup failures.
pub async fn try_sync_inventory(
    ctx: &PipelineContext,
    product_id: i64,
) -> Result<CatalogProductId, PipelineError> {
    let product = supplydesk_db::get_extracted_product(&ctx.pool, product_id).await?;
    if let Some(existing) = &product.catalog_product_id {
        return Ok(CatalogProductId(existing.clone()));
    }
    let submission = supplydesk_db::get_submission(&ctx.pool, product.submission_id).await?;

    let catalog_product = catalog_product(&submission, &product)?;
    let catalog_id = ctx
        .services
        .catalog
        .create_or_update_product(&catalog_product)
        .await
        .map_err(|source| PipelineError::Service {
            service: "catalog",
            source,
        })?;

    supplydesk_db::mark_inventory_synced(&ctx.pool, product_id, &catalog_id.0).await?;
    tracing::info!(product_id, catalog_id = %catalog_id, "inventory synced");
    Ok(catalog_id)
}

/// Syncs an approved product, scheduling an `inventory_update` recovery
/// operation when the sync fails. Never fails the caller.
pub(crate) async fn fire_inventory_hook(ctx: &PipelineContext, submission_id: i64, product_id: i64) {
    let Err(e) = try_sync_inventory(ctx, product_id).await else {
        return;
    };
    tracing::warn!(product_id, error = %e, "inventory sync failed; scheduling retry");
    if let Err(record_err) = recovery::schedule_failure(
        ctx,
        submission_id,
        Some(product_id),
        OperationType::InventoryUpdate,
        &e.to_string(),
    )
    .await
    {
        tracing::error!(product_id, error = %record_err, "could not record inventory failure");
    }
}

async fn extract(ctx: &PipelineContext, submission: &SubmissionRow) -> Result<ExtractionResponse, String> {
    let content_type: ContentType = submission
        .content_type
        .parse()
        .map_err(|e: supplydesk_core::CoreError| e.to_string())?;
    let request = ExtractionRequest {
        submission_id: submission.public_id,
        content_type,
        content: submission.content.clone(),
        media_url: submission.media_url.clone(),
        supplier_name: submission.supplier_name.clone(),
    };

    let response = match tokio::time::timeout(
        ctx.extraction_timeout,
        ctx.services.extraction.extract(&request),
    )
    .await
    {
        Ok(result) => result.map_err(|e| e.to_string())?,
        Err(_) => return Err(ServiceError::Timeout(ctx.extraction_timeout).to_string()),
    };

    usable_products(response, submission.public_id)
}

/// Drops candidates that fail validation; an extraction with nothing left
/// counts as a failure.
fn usable_products(mut response: ExtractionResponse, submission_id: Uuid) -> Result<ExtractionResponse, String> {
    let returned = response.products.len();
    response.products.retain(|candidate| match candidate.validate() {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(%submission_id, error = %e, "dropping invalid product");
            false
        }
    });
    if response.products.is_empty() {
        return Err(format!(
            "extraction returned no usable products ({returned} returned)"
        ));
    }
    Ok(response)
}

async fn fail_attempt(
    ctx: &PipelineContext,
    submission: &SubmissionRow,
    elapsed_ms: i64,
    error: String,
) -> Result<ProcessOutcome, PipelineError> {
    let attempt = submission.extraction_attempt;
    let failed = supplydesk_db::fail_submission(&ctx.pool, submission.id, attempt, &error).await?;
    if !failed {
        tracing::info!(submission_id = %submission.public_id, attempt, "failure of superseded attempt ignored");
        return Ok(ProcessOutcome::Superseded);
    }

    supplydesk_db::record_extraction_run(
        &ctx.pool,
        submission.id,
        attempt,
        ExtractionOutcome::Failed,
        None,
        elapsed_ms,
        0,
        Some(&error),
    )
    .await?;
    recovery::schedule_failure(ctx, submission.id, None, OperationType::AiExtraction, &error).await?;

    tracing::warn!(submission_id = %submission.public_id, attempt, error = %error, "extraction failed");
    Ok(ProcessOutcome::Failed { error })
}

/// Lifts a failed claim or reset into a descriptive error.
async fn transition_error(ctx: &PipelineContext, submission_id: i64, error: DbError) -> PipelineError {
    match error {
        DbError::InvalidSubmissionTransition {
            expected_status, ..
        } => match supplydesk_db::get_submission(&ctx.pool, submission_id).await {
            Ok(row) => PipelineError::InvalidTransition {
                submission: row.public_id,
                expected: expected_status,
                actual: row.processing_status,
            },
            Err(e) => e.into(),
        },
        DbError::NotFound => PipelineError::NotFound("submission"),
        other => other.into(),
    }
}

fn new_product(candidate: &ProductCandidate, model: &str, processing_time_ms: i64) -> NewExtractedProduct {
    let specifications: Map<String, Value> = candidate
        .specifications
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    let field_confidence: Map<String, Value> = candidate
        .normalized_confidence()
        .into_iter()
        .map(|(k, v)| (k, Value::from(v)))
        .collect();

    NewExtractedProduct {
        name: candidate.name.trim().to_string(),
        brand: candidate.brand.clone(),
        category: candidate.category.clone(),
        condition: candidate.condition.map(|c| c.as_str().to_string()),
        grade: candidate.grade.clone(),
        price: candidate.price,
        currency: candidate.currency.clone(),
        quantity: candidate.quantity,
        specifications: Value::Object(specifications),
        field_confidence: Value::Object(field_confidence),
        confidence: candidate.confidence(),
        model: model.to_string(),
        processing_time_ms,
        fields_extracted: candidate
            .populated_fields()
            .into_iter()
            .map(str::to_string)
            .collect(),
    }
}

fn offer_value(product: &ExtractedProductRow) -> Option<Decimal> {
    product
        .price
        .map(|p| p * Decimal::from(product.quantity.unwrap_or(1).max(0)))
}

fn snapshot(product: &ExtractedProductRow) -> Value {
    json!({
        "name": product.name,
        "brand": product.brand,
        "category": product.category,
        "condition": product.condition,
        "grade": product.grade,
        "price": product.price,
        "currency": product.currency,
        "quantity": product.quantity,
        "specifications": product.specifications,
        "field_confidence": product.field_confidence,
        "model": product.model,
    })
}

fn catalog_product(
    submission: &SubmissionRow,
    product: &ExtractedProductRow,
) -> Result<CatalogProduct, PipelineError> {
    let condition: Option<ProductCondition> = product
        .condition
        .as_deref()
        .map(str::parse)
        .transpose()?;
    let specifications = serde_json::from_value(product.specifications.clone()).unwrap_or_default();

    Ok(CatalogProduct {
        external_ref: format!("{CATALOG_REF_PREFIX}{}", product.id),
        supplier_id: submission.supplier_id.clone(),
        supplier_phone: submission.supplier_phone.clone(),
        name: product.name.clone(),
        brand: product.brand.clone(),
        category: product.category.clone(),
        condition,
        grade: product.grade.clone(),
        price: product.price,
        currency: product.currency.clone(),
        quantity: product.quantity,
        specifications,
    })
}
