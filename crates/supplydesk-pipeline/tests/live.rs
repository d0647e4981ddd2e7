//! End-to-end pipeline tests against a fresh Postgres database per test,
//! with in-process fakes standing in for the external services.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use supplydesk_core::{
    CatalogProduct, CatalogProductId, CatalogService, CoreError, ExtractionRequest,
    ExtractionResponse, ExtractionService, PipelinePolicy, ProductCandidate, QueueFilters,
    ReasonCategory, RejectionFeedback, ServiceError, Severity, SupplierDirectory, SupplierRecord,
    ValidationStatus,
};
use supplydesk_pipeline::{
    AttemptOutcome, InboundMessage, PipelineContext, PipelineError,
    ProcessOutcome, Services,
};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ScriptedExtraction {
    responses: Mutex<VecDeque<Result<ExtractionResponse, ServiceError>>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedExtraction {
    fn push(&self, response: Result<ExtractionResponse, ServiceError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExtractionService for ScriptedExtraction {
    async fn extract(&self, _request: &ExtractionRequest) -> Result<ExtractionResponse, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ServiceError::Transport("no scripted response".to_string())))
    }
}

#[derive(Default)]
struct FakeCatalog {
    failing: AtomicBool,
    upserts: Mutex<Vec<CatalogProduct>>,
}

impl FakeCatalog {
    fn upserts(&self) -> Vec<CatalogProduct> {
        self.upserts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CatalogService for FakeCatalog {
    async fn create_or_update_product(
        &self,
        product: &CatalogProduct,
    ) -> Result<CatalogProductId, ServiceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ServiceError::Upstream {
                status: 503,
                body: "catalog unavailable".to_string(),
            });
        }
        let mut upserts = self.upserts.lock().unwrap();
        upserts.push(product.clone());
        Ok(CatalogProductId(format!("SKU-{}", upserts.len())))
    }
}

struct FakeDirectory;

#[async_trait]
impl SupplierDirectory for FakeDirectory {
    async fn get_supplier(&self, phone_or_id: &str) -> Result<Option<SupplierRecord>, ServiceError> {
        match phone_or_id {
            "+34600000001" => Ok(Some(SupplierRecord {
                id: "SUP-7".to_string(),
                name: "Madrid Mobiles".to_string(),
                phone: phone_or_id.to_string(),
                country: Some("ES".to_string()),
            })),
            "+34699999999" => Err(ServiceError::Transport("directory down".to_string())),
            _ => Ok(None),
        }
    }
}

struct Harness {
    ctx: PipelineContext,
    extraction: Arc<ScriptedExtraction>,
    catalog: Arc<FakeCatalog>,
}

fn test_policy() -> PipelinePolicy {
    let mut policy = PipelinePolicy::default();
    // Retries become due immediately.
    policy.recovery.backoff_base_secs = 0;
    policy.recovery.pending_dispatch_after_secs = 0;
    policy
}

fn harness_with(pool: PgPool, extraction: ScriptedExtraction) -> Harness {
    let extraction = Arc::new(extraction);
    let catalog = Arc::new(FakeCatalog::default());
    let ctx = PipelineContext::new(
        pool,
        test_policy(),
        Services {
            extraction: extraction.clone(),
            catalog: catalog.clone(),
            directory: Arc::new(FakeDirectory),
        },
        Duration::from_secs(5),
    );
    Harness {
        ctx,
        extraction,
        catalog,
    }
}

fn harness(pool: PgPool) -> Harness {
    harness_with(pool, ScriptedExtraction::default())
}

fn candidate(name: &str, confidence: f64) -> ProductCandidate {
    ProductCandidate {
        name: name.to_string(),
        brand: None,
        category: None,
        condition: None,
        grade: None,
        price: None,
        currency: None,
        quantity: None,
        specifications: BTreeMap::new(),
        field_confidence: BTreeMap::from([("name".to_string(), confidence)]),
    }
}

fn extracted(confidences: &[f64]) -> Result<ExtractionResponse, ServiceError> {
    Ok(ExtractionResponse {
        model: "vision-2".to_string(),
        processing_time_ms: 900,
        transcription: None,
        products: confidences
            .iter()
            .enumerate()
            .map(|(i, c)| candidate(&format!("Product {i}"), *c))
            .collect(),
    })
}

fn text_message(message_id: &str, from: &str) -> InboundMessage {
    InboundMessage {
        message_id: message_id.to_string(),
        from: from.to_string(),
        content_type: "text".to_string(),
        text: Some("10x iPhone 13 128GB 420 EUR".to_string()),
        media_url: None,
    }
}

/// Receives a text message and returns the internal submission id.
async fn received(h: &Harness, message_id: &str) -> i64 {
    let (queue, _receiver) = supplydesk_pipeline::extraction_queue(16);
    let public_id = supplydesk_pipeline::receive(&h.ctx, &queue, &text_message(message_id, "+34600000001"))
        .await
        .expect("receive failed");
    supplydesk_pipeline::find_submission(&h.ctx, public_id)
        .await
        .expect("submission should exist")
        .id
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn receive_stores_pending_submission_with_directory_name(pool: PgPool) {
    let h = harness(pool);
    let (queue, mut receiver) = supplydesk_pipeline::extraction_queue(4);

    let public_id = supplydesk_pipeline::receive(&h.ctx, &queue, &text_message("wamid.1", "+34600000001"))
        .await
        .unwrap();

    let submission = supplydesk_pipeline::find_submission(&h.ctx, public_id).await.unwrap();
    assert_eq!(submission.processing_status, "pending");
    assert_eq!(submission.validation_status, "pending");
    assert_eq!(submission.supplier_id.as_deref(), Some("SUP-7"));
    assert_eq!(submission.supplier_name.as_deref(), Some("Madrid Mobiles"));
    assert!(submission.dispatched_at.is_some());
    assert_eq!(receiver.try_recv().unwrap(), submission.id);
}

#[sqlx::test(migrations = "../../migrations")]
async fn duplicate_message_reports_existing_submission(pool: PgPool) {
    let h = harness(pool);
    let (queue, _receiver) = supplydesk_pipeline::extraction_queue(4);
    let message = text_message("wamid.dup", "+34600000001");

    let first = supplydesk_pipeline::receive(&h.ctx, &queue, &message).await.unwrap();
    let err = supplydesk_pipeline::receive(&h.ctx, &queue, &message).await.unwrap_err();

    assert!(matches!(err, PipelineError::DuplicateSubmission { existing, .. } if existing == first));
    let stats = supplydesk_pipeline::dashboard_stats(&h.ctx).await;
    assert_eq!(stats.submissions.total, 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn unsupported_content_type_is_not_stored(pool: PgPool) {
    let h = harness(pool);
    let mut message = text_message("wamid.sticker", "+34600000001");
    message.content_type = "sticker".to_string();
    let (queue, _receiver) = supplydesk_pipeline::extraction_queue(4);

    let err = supplydesk_pipeline::receive(&h.ctx, &queue, &message).await.unwrap_err();

    assert!(matches!(err, PipelineError::UnsupportedContentType(_)));
    assert_eq!(supplydesk_pipeline::dashboard_stats(&h.ctx).await.submissions.total, 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn directory_failure_does_not_block_ingestion(pool: PgPool) {
    let h = harness(pool);
    let (queue, _receiver) = supplydesk_pipeline::extraction_queue(4);
    let public_id = supplydesk_pipeline::receive(&h.ctx, &queue, &text_message("wamid.2", "+34699999999"))
        .await
        .unwrap();

    let submission = supplydesk_pipeline::find_submission(&h.ctx, public_id).await.unwrap();
    assert!(submission.supplier_name.is_none());
    assert_eq!(submission.supplier_key(), "+34699999999");
}

#[sqlx::test(migrations = "../../migrations")]
async fn full_queue_schedules_dispatch_recovery(pool: PgPool) {
    let h = harness(pool);
    h.extraction.push(extracted(&[92.0]));
    let (queue, _receiver) = supplydesk_pipeline::extraction_queue(1);
    queue.enqueue(-1).unwrap();

    let public_id = supplydesk_pipeline::receive(&h.ctx, &queue, &text_message("wamid.full", "+34600000001"))
        .await
        .unwrap();

    let detail = supplydesk_pipeline::submission_detail(&h.ctx, public_id).await.unwrap();
    assert_eq!(detail.operations.len(), 1);
    assert_eq!(detail.operations[0].operation_type, "webhook");
    assert!(detail.submission.dispatched_at.is_none());

    let report = supplydesk_pipeline::run_recovery_sweep(&h.ctx).await.unwrap();
    assert_eq!(report.claimed, 1);
    assert_eq!(report.resolved, 1);

    let detail = supplydesk_pipeline::submission_detail(&h.ctx, public_id).await.unwrap();
    assert_eq!(detail.submission.processing_status, "completed");
    assert!(detail.operations.is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn dispatch_pending_requeues_undispatched_submissions(pool: PgPool) {
    let h = harness(pool);
    let (full, _full_receiver) = supplydesk_pipeline::extraction_queue(1);
    full.enqueue(-1).unwrap();
    supplydesk_pipeline::receive(&h.ctx, &full, &text_message("wamid.late", "+34600000001"))
        .await
        .unwrap();

    let (queue, mut receiver) = supplydesk_pipeline::extraction_queue(8);
    let queued = supplydesk_pipeline::dispatch_pending(&h.ctx, &queue).await.unwrap();

    assert_eq!(queued, 1);
    assert!(receiver.try_recv().is_ok());
}

// ---------------------------------------------------------------------------
// Extraction and routing
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn mixed_confidence_submission_waits_for_review(pool: PgPool) {
    let h = harness(pool);
    h.extraction.push(extracted(&[95.0, 40.0]));
    let id = received(&h, "wamid.mixed").await;

    let outcome = supplydesk_pipeline::process(&h.ctx, id).await.unwrap();

    let ProcessOutcome::Completed(summary) = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(summary.products, 2);
    assert_eq!(summary.auto_approved, 0);
    assert_eq!(summary.pending_review, 1);
    assert_eq!(summary.held, 1);
    assert_eq!(summary.validation_status, Some(ValidationStatus::Pending));
    assert!((summary.overall_confidence - 67.5).abs() < 1e-9);
    assert!(h.catalog.upserts().is_empty(), "nothing is synced while review is open");

    let page = supplydesk_pipeline::list_pending(&h.ctx, &QueueFilters::default()).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].priority, "high");
}

#[sqlx::test(migrations = "../../migrations")]
async fn high_confidence_submission_is_auto_approved(pool: PgPool) {
    let h = harness(pool);
    h.extraction.push(extracted(&[95.0, 81.0]));
    let id = received(&h, "wamid.auto").await;

    supplydesk_pipeline::process(&h.ctx, id).await.unwrap();

    let submission = supplydesk_db::get_submission(&h.ctx.pool, id).await.unwrap();
    assert_eq!(submission.validation_status, "approved");
    assert_eq!(h.catalog.upserts().len(), 2);
    let products = supplydesk_db::list_products_for_submission(&h.ctx.pool, id).await.unwrap();
    assert!(products.iter().all(|p| p.catalog_product_id.is_some()));
}

#[sqlx::test(migrations = "../../migrations")]
async fn processing_twice_is_an_invalid_transition(pool: PgPool) {
    let h = harness(pool);
    h.extraction.push(extracted(&[95.0]));
    let id = received(&h, "wamid.twice").await;
    supplydesk_pipeline::process(&h.ctx, id).await.unwrap();

    let err = supplydesk_pipeline::process(&h.ctx, id).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::InvalidTransition { expected: "pending", ref actual, .. } if actual == "completed"
    ));
    assert_eq!(h.extraction.calls(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn extraction_failure_schedules_recovery(pool: PgPool) {
    let h = harness(pool);
    h.extraction.push(Err(ServiceError::Upstream {
        status: 503,
        body: "overloaded".to_string(),
    }));
    let id = received(&h, "wamid.fail").await;

    let outcome = supplydesk_pipeline::process(&h.ctx, id).await.unwrap();

    assert!(matches!(outcome, ProcessOutcome::Failed { ref error } if error.contains("503")));
    let submission = supplydesk_db::get_submission(&h.ctx.pool, id).await.unwrap();
    assert_eq!(submission.processing_status, "failed");
    let ops = supplydesk_db::list_operations_for_submission(&h.ctx.pool, id).await.unwrap();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].operation_type, "ai_extraction");
    assert_eq!(ops[0].state, "scheduled");
    assert_eq!(ops[0].retry_count, 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn empty_extraction_counts_as_failure(pool: PgPool) {
    let h = harness(pool);
    h.extraction.push(extracted(&[]));
    let id = received(&h, "wamid.empty").await;

    let outcome = supplydesk_pipeline::process(&h.ctx, id).await.unwrap();

    assert!(matches!(outcome, ProcessOutcome::Failed { .. }));
    let metrics = supplydesk_pipeline::ai_metrics(&h.ctx, None).await;
    assert_eq!(metrics.failed_extractions, 1);
    assert_eq!(metrics.successful_extractions, 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn slow_extraction_times_out(pool: PgPool) {
    let slow = ScriptedExtraction {
        delay: Some(Duration::from_secs(5)),
        ..ScriptedExtraction::default()
    };
    let mut h = harness_with(pool, slow);
    h.ctx.extraction_timeout = Duration::from_millis(100);
    h.extraction.push(extracted(&[95.0]));
    let id = received(&h, "wamid.slow").await;

    let outcome = supplydesk_pipeline::process(&h.ctx, id).await.unwrap();

    assert!(matches!(outcome, ProcessOutcome::Failed { ref error } if error.contains("timed out")));
}

#[sqlx::test(migrations = "../../migrations")]
async fn reprocess_requires_failed_submission(pool: PgPool) {
    let h = harness(pool);
    let id = received(&h, "wamid.reprocess").await;

    let err = supplydesk_pipeline::reprocess(&h.ctx, id).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::InvalidTransition { expected: "failed", ref actual, .. } if actual == "pending"
    ));

    h.extraction.push(extracted(&[]));
    supplydesk_pipeline::process(&h.ctx, id).await.unwrap();
    h.extraction.push(extracted(&[88.0]));
    let outcome = supplydesk_pipeline::reprocess(&h.ctx, id).await.unwrap();

    assert!(matches!(outcome, ProcessOutcome::Completed(_)));
    let submission = supplydesk_db::get_submission(&h.ctx.pool, id).await.unwrap();
    assert_eq!(submission.extraction_attempt, 2);
    let ops = supplydesk_db::list_operations_for_submission(&h.ctx.pool, id).await.unwrap();
    assert!(ops.is_empty(), "successful extraction resolves the pending retry");
}

// ---------------------------------------------------------------------------
// Recovery
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn automatic_retries_exhaust_into_permanent_failure(pool: PgPool) {
    let h = harness(pool);
    let id = received(&h, "wamid.exhaust").await;
    // No scripted responses: every call fails with a transport error.
    supplydesk_pipeline::process(&h.ctx, id).await.unwrap();

    for _ in 0..2 {
        let report = supplydesk_pipeline::run_recovery_sweep(&h.ctx).await.unwrap();
        assert_eq!(report.claimed, 1);
        assert_eq!(report.resolved, 0);
    }

    let before = supplydesk_pipeline::recovery_stats(&h.ctx).await.unwrap();
    assert_eq!(before.scheduled + before.retrying, 1);
    assert_eq!(before.permanently_failed, 0);

    let report = supplydesk_pipeline::run_recovery_sweep(&h.ctx).await.unwrap();
    assert_eq!(report.claimed, 1);
    assert_eq!(report.resolved, 0);

    let after = supplydesk_pipeline::recovery_stats(&h.ctx).await.unwrap();
    assert_eq!(after.permanently_failed, before.permanently_failed + 1);
    assert_eq!(after.scheduled + after.retrying, before.scheduled + before.retrying - 1);
    assert_eq!(after.retrying, 0);
    assert_eq!(after.total_failed, before.total_failed);
    assert_eq!(after.by_operation_type.get("ai_extraction"), Some(&1));

    let ops = supplydesk_db::list_operations_for_submission(&h.ctx.pool, id).await.unwrap();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].state, "permanently_failed");
    assert_eq!(ops[0].retry_count, 3);
    assert_eq!(h.extraction.calls(), 4);

    let idle = supplydesk_pipeline::run_recovery_sweep(&h.ctx).await.unwrap();
    assert_eq!(idle.claimed, 0);

    let alerts = supplydesk_pipeline::system_alerts(&h.ctx).await;
    assert_eq!(alerts[0].severity, Severity::Critical);
    assert_eq!(alerts[0].code, "permanently_failed_operations");
}

#[sqlx::test(migrations = "../../migrations")]
async fn manual_retry_recovers_permanently_failed_operation(pool: PgPool) {
    let h = harness(pool);
    let id = received(&h, "wamid.manual").await;
    supplydesk_pipeline::process(&h.ctx, id).await.unwrap();
    for _ in 0..3 {
        supplydesk_pipeline::run_recovery_sweep(&h.ctx).await.unwrap();
    }
    let public_id = supplydesk_db::get_submission(&h.ctx.pool, id).await.unwrap().public_id;

    h.extraction.push(extracted(&[91.0]));
    let report = supplydesk_pipeline::retry_now(&h.ctx, public_id).await.unwrap();

    assert_eq!(report.attempts, 1);
    assert_eq!(report.results[0].outcome, AttemptOutcome::Resolved);
    let submission = supplydesk_db::get_submission(&h.ctx.pool, id).await.unwrap();
    assert_eq!(submission.processing_status, "completed");
    assert_eq!(submission.validation_status, "approved");

    let stats = supplydesk_pipeline::recovery_stats(&h.ctx).await.unwrap();
    assert_eq!(stats.total_failed, 0);
    assert_eq!(stats.resolved, 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn manual_retry_failure_keeps_operation_permanently_failed(pool: PgPool) {
    let h = harness(pool);
    let id = received(&h, "wamid.still-broken").await;
    supplydesk_pipeline::process(&h.ctx, id).await.unwrap();
    for _ in 0..3 {
        supplydesk_pipeline::run_recovery_sweep(&h.ctx).await.unwrap();
    }
    let public_id = supplydesk_db::get_submission(&h.ctx.pool, id).await.unwrap().public_id;

    let report = supplydesk_pipeline::retry_now(&h.ctx, public_id).await.unwrap();

    assert_eq!(report.results[0].outcome, AttemptOutcome::PermanentlyFailed);
    assert_eq!(report.results[0].retry_count, 3);
    let ops = supplydesk_db::list_operations_for_submission(&h.ctx.pool, id).await.unwrap();
    assert_eq!(ops[0].manual_attempts, 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn manual_retry_without_operations_is_rejected(pool: PgPool) {
    let h = harness(pool);
    let id = received(&h, "wamid.clean").await;
    let public_id = supplydesk_db::get_submission(&h.ctx.pool, id).await.unwrap().public_id;

    let err = supplydesk_pipeline::retry_now(&h.ctx, public_id).await.unwrap_err();
    assert!(matches!(err, PipelineError::NothingToRetry(p) if p == public_id));

    let err = supplydesk_pipeline::retry_now(&h.ctx, Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, PipelineError::NotFound("submission")));
}

#[sqlx::test(migrations = "../../migrations")]
async fn recovery_queue_reports_time_until_retry(pool: PgPool) {
    let h = harness(pool);
    let id = received(&h, "wamid.queue").await;
    supplydesk_pipeline::process(&h.ctx, id).await.unwrap();

    let queue = supplydesk_pipeline::recovery_queue(
        &h.ctx,
        supplydesk_core::PageWindow::from_params(None, None),
    )
    .await
    .unwrap();

    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].operation_type, "ai_extraction");
    assert_eq!(queue[0].seconds_until_retry, Some(0));
}

// ---------------------------------------------------------------------------
// Validation queue
// ---------------------------------------------------------------------------

/// Processes a submission; returns the ids of the items awaiting review.
async fn review_items(h: &Harness, message_id: &str, confidences: &[f64]) -> Vec<i64> {
    h.extraction.push(extracted(confidences));
    let id = received(h, message_id).await;
    supplydesk_pipeline::process(&h.ctx, id).await.unwrap();
    supplydesk_db::list_items_for_submission(&h.ctx.pool, id)
        .await
        .unwrap()
        .into_iter()
        .filter(|i| i.status == "pending")
        .map(|i| i.id)
        .collect()
}

#[sqlx::test(migrations = "../../migrations")]
async fn approve_syncs_inventory_exactly_once(pool: PgPool) {
    let h = harness(pool);
    let items = review_items(&h, "wamid.approve", &[60.0]).await;

    let result = supplydesk_pipeline::approve(&h.ctx, items[0], Some("checked")).await.unwrap();
    assert_eq!(result.item.status, "approved");
    assert_eq!(result.submission_validation_status, ValidationStatus::Approved);

    let err = supplydesk_pipeline::approve(&h.ctx, items[0], None).await.unwrap_err();
    assert!(matches!(err, PipelineError::AlreadyDecided { .. }));
    assert_eq!(h.catalog.upserts().len(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn catalog_outage_keeps_approval_and_schedules_inventory_retry(pool: PgPool) {
    let h = harness(pool);
    let items = review_items(&h, "wamid.outage", &[60.0]).await;
    h.catalog.failing.store(true, Ordering::SeqCst);

    let result = supplydesk_pipeline::approve(&h.ctx, items[0], None).await.unwrap();

    assert_eq!(result.item.status, "approved");
    let ops = supplydesk_db::list_operations_for_submission(&h.ctx.pool, result.item.submission_id)
        .await
        .unwrap();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].operation_type, "inventory_update");
    assert_eq!(ops[0].extracted_product_id, Some(result.item.extracted_product_id));

    h.catalog.failing.store(false, Ordering::SeqCst);
    let report = supplydesk_pipeline::run_recovery_sweep(&h.ctx).await.unwrap();
    assert_eq!(report.resolved, 1);
    let product = supplydesk_db::get_extracted_product(&h.ctx.pool, result.item.extracted_product_id)
        .await
        .unwrap();
    assert_eq!(product.catalog_product_id.as_deref(), Some("SKU-1"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn reject_requires_feedback(pool: PgPool) {
    let h = harness(pool);
    let items = review_items(&h, "wamid.reject", &[55.0]).await;
    let empty = RejectionFeedback {
        reasons: vec![],
        comment: Some("   ".to_string()),
    };

    let err = supplydesk_pipeline::reject(&h.ctx, items[0], &empty, None).await.unwrap_err();
    assert!(matches!(err, PipelineError::Core(CoreError::EmptyFeedback(_))));
    let item = supplydesk_db::get_validation_item(&h.ctx.pool, items[0]).await.unwrap();
    assert_eq!(item.status, "pending");

    let feedback = RejectionFeedback {
        reasons: vec![ReasonCategory::IncorrectPrice],
        comment: None,
    };
    let result = supplydesk_pipeline::reject(&h.ctx, items[0], &feedback, None).await.unwrap();
    assert_eq!(result.item.status, "rejected");
    assert_eq!(result.item.feedback_reasons, vec!["incorrect_price".to_string()]);
    assert_eq!(result.submission_validation_status, ValidationStatus::Rejected);
    assert!(h.catalog.upserts().is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn rejecting_reviewed_product_rejects_submission_with_confident_sibling(pool: PgPool) {
    let h = harness(pool);
    let items = review_items(&h, "wamid.mixed-reject", &[95.0, 40.0]).await;
    assert_eq!(items.len(), 1);
    let feedback = RejectionFeedback {
        reasons: vec![ReasonCategory::IncorrectProduct],
        comment: None,
    };

    let result = supplydesk_pipeline::reject(&h.ctx, items[0], &feedback, None).await.unwrap();

    assert_eq!(result.submission_validation_status, ValidationStatus::Rejected);
    let submission = supplydesk_db::get_submission(&h.ctx.pool, result.item.submission_id)
        .await
        .unwrap();
    assert_eq!(submission.validation_status, "rejected");
    assert!(h.catalog.upserts().is_empty());
    let products = supplydesk_db::list_products_for_submission(&h.ctx.pool, submission.id)
        .await
        .unwrap();
    assert!(products.iter().all(|p| p.catalog_product_id.is_none()));
}

#[sqlx::test(migrations = "../../migrations")]
async fn approving_reviewed_product_releases_confident_sibling(pool: PgPool) {
    let h = harness(pool);
    let items = review_items(&h, "wamid.mixed-approve", &[95.0, 40.0]).await;

    let result = supplydesk_pipeline::approve(&h.ctx, items[0], None).await.unwrap();

    assert_eq!(result.submission_validation_status, ValidationStatus::Approved);
    let upserts = h.catalog.upserts();
    assert_eq!(upserts.len(), 2);
    assert!(upserts.iter().any(|p| p.name == "Product 0"));
    assert!(upserts[0].external_ref.starts_with("sd-"));

    let all = supplydesk_db::list_items_for_submission(&h.ctx.pool, result.item.submission_id)
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
    assert!(all.iter().all(|i| i.status == "approved"));
    assert_eq!(all.iter().filter(|i| i.decided_by.as_deref() == Some("auto")).count(), 1);
    let submission = supplydesk_db::get_submission(&h.ctx.pool, result.item.submission_id)
        .await
        .unwrap();
    assert_eq!(submission.validation_status, "approved");
}

#[sqlx::test(migrations = "../../migrations")]
async fn bulk_reject_reports_each_item(pool: PgPool) {
    let h = harness(pool);
    let items = review_items(&h, "wamid.bulk", &[30.0, 45.0]).await;
    let feedback = RejectionFeedback {
        reasons: vec![ReasonCategory::Duplicate],
        comment: None,
    };

    let report = supplydesk_pipeline::bulk_reject(&h.ctx, &[items[0], 999_999, items[1]], &feedback, None)
        .await
        .unwrap();

    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 1);
    let missing = report.results.iter().find(|r| r.id == 999_999).unwrap();
    assert!(!missing.success);
    assert_eq!(missing.error_code, Some("not_found"));
}

// ---------------------------------------------------------------------------
// Performance and reporting
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn supplier_performance_reflects_decisions(pool: PgPool) {
    let h = harness(pool);
    let items = review_items(&h, "wamid.perf", &[60.0, 65.0]).await;
    supplydesk_pipeline::approve(&h.ctx, items[0], None).await.unwrap();
    let feedback = RejectionFeedback {
        reasons: vec![ReasonCategory::MissingInformation],
        comment: None,
    };
    supplydesk_pipeline::reject(&h.ctx, items[1], &feedback, None).await.unwrap();

    let performance = supplydesk_pipeline::supplier_performance(&h.ctx, "SUP-7").await.unwrap();
    assert_eq!(performance.approved, 1);
    assert_eq!(performance.rejected, 1);
    assert!((performance.approval_rate - 0.5).abs() < f64::EPSILON);

    let top = supplydesk_pipeline::top_suppliers(&h.ctx, 5).await.unwrap();
    assert_eq!(top.len(), 1);

    let err = supplydesk_pipeline::supplier_performance(&h.ctx, "SUP-404").await.unwrap_err();
    assert!(matches!(err, PipelineError::NotFound("supplier")));
}

#[sqlx::test(migrations = "../../migrations")]
async fn reports_summarise_pipeline_state(pool: PgPool) {
    let h = harness(pool);
    review_items(&h, "wamid.report", &[95.0, 40.0]).await;

    let stats = supplydesk_pipeline::dashboard_stats(&h.ctx).await;
    assert_eq!(stats.submissions.completed, 1);
    assert_eq!(stats.review_items.auto_approved, 0);
    assert_eq!(stats.review_items.pending, 1);

    let distribution = supplydesk_pipeline::confidence_distribution(&h.ctx).await;
    assert_eq!(distribution.high, 1);
    assert_eq!(distribution.low, 1);

    let trends = supplydesk_pipeline::validation_trends(&h.ctx, 7).await.unwrap();
    assert_eq!(trends.len(), 7);
    assert_eq!(trends.last().unwrap().submissions, 1);
    assert!(matches!(
        supplydesk_pipeline::validation_trends(&h.ctx, 91).await,
        Err(PipelineError::InvalidRequest(_))
    ));

    let health = supplydesk_pipeline::system_health(&h.ctx).await;
    assert_eq!(health.submissions_last_24h, 1);
    assert!(health.subsystems.contains_key("extraction"));

    let activity = supplydesk_pipeline::recent_activity(&h.ctx, 10).await;
    assert!(!activity.is_empty());
}
