//! Retry scheduling and execution for failed pipeline stages.
//!
//! Each failed stage is stored as one live operation per submission, stage
//! and product. The scheduler sweep claims due operations, re-runs the stage
//! and either resolves the operation or charges a retry against its budget.
//! Operators can force an immediate retry of everything a submission has
//! outstanding with [`retry_now`].

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use supplydesk_core::{OperationState, OperationType, PageWindow, ProcessingStatus};
use supplydesk_db::{FailedOperationRow, NewFailedOperation};
use uuid::Uuid;

use crate::context::PipelineContext;
use crate::error::PipelineError;
use crate::queue::{ExtractionQueue, QueueError};
use crate::worker::{self, ProcessOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Resolved,
    Rescheduled,
    PermanentlyFailed,
}

impl AttemptOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AttemptOutcome::Resolved => "resolved",
            AttemptOutcome::Rescheduled => "rescheduled",
            AttemptOutcome::PermanentlyFailed => "permanently_failed",
        }
    }
}

/// Result of re-running one operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationResult {
    pub operation_id: i64,
    pub operation_type: String,
    pub outcome: AttemptOutcome,
    pub retry_count: i32,
    pub error: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub claimed: usize,
    pub resolved: usize,
    pub rescheduled: usize,
    pub permanently_failed: usize,
}

impl SweepReport {
    fn record(&mut self, outcome: AttemptOutcome) {
        match outcome {
            AttemptOutcome::Resolved => self.resolved += 1,
            AttemptOutcome::Rescheduled => self.rescheduled += 1,
            AttemptOutcome::PermanentlyFailed => self.permanently_failed += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetryReport {
    pub submission_id: Uuid,
    pub attempts: usize,
    pub results: Vec<OperationResult>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoveryStats {
    /// Live operations in any state.
    pub total_failed: i64,
    pub scheduled: i64,
    pub retrying: i64,
    pub permanently_failed: i64,
    pub resolved: i64,
    pub by_operation_type: BTreeMap<String, i64>,
    pub average_resolution_seconds: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueuedOperation {
    pub id: i64,
    pub submission_id: Uuid,
    pub extracted_product_id: Option<i64>,
    pub operation_type: String,
    pub state: String,
    pub last_error: String,
    pub retry_count: i32,
    pub max_retries: i32,
    pub manual_attempts: i32,
    pub next_retry_at: DateTime<Utc>,
    /// `None` for permanently failed operations, `0` when already due.
    pub seconds_until_retry: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StaleSweepReport {
    pub failed_submissions: usize,
    pub released_operations: u64,
}

/// Records a failed stage with the policy's retry budget.
///
/// If the stage already has a live operation, only its error is refreshed.
///
/// # Errors
///
/// Returns [`PipelineError::Db`] if the operation cannot be stored.
pub async fn schedule_failure(
    ctx: &PipelineContext,
    submission_id: i64,
    extracted_product_id: Option<i64>,
    operation_type: OperationType,
    error: &str,
) -> Result<FailedOperationRow, PipelineError> {
    let policy = &ctx.policy.recovery;
    let now = Utc::now();
    let row = supplydesk_db::record_failed_operation(
        &ctx.pool,
        &NewFailedOperation {
            submission_id,
            extracted_product_id,
            operation_type,
            error: error.to_string(),
            max_retries: policy.max_retries,
            next_retry_at: now + policy.backoff(0),
            metadata: json!({ "last_failure_at": now.to_rfc3339() }),
        },
    )
    .await?;

    tracing::info!(
        submission_id,
        operation_id = row.id,
        operation_type = %operation_type,
        state = %row.state,
        next_retry_at = %row.next_retry_at,
        "failed operation recorded"
    );
    Ok(row)
}

/// Claims and re-runs every due operation, up to the policy's batch size.
///
/// # Errors
///
/// Returns [`PipelineError::Db`] if claiming fails. Failures while settling
/// a single operation are logged; the operation is released later by
/// [`sweep_stale_processing`].
pub async fn run_recovery_sweep(ctx: &PipelineContext) -> Result<SweepReport, PipelineError> {
    let claimed =
        supplydesk_db::claim_due_operations(&ctx.pool, ctx.policy.recovery.sweep_batch_size).await?;
    let mut report = SweepReport {
        claimed: claimed.len(),
        ..SweepReport::default()
    };

    for operation in &claimed {
        let attempt = attempt_operation(ctx, operation).await;
        match settle(ctx, operation, attempt).await {
            Ok(result) => report.record(result.outcome),
            Err(e) => tracing::error!(
                operation_id = operation.id,
                error = %e,
                "could not settle recovery attempt"
            ),
        }
    }

    if report.claimed > 0 {
        tracing::info!(
            claimed = report.claimed,
            resolved = report.resolved,
            rescheduled = report.rescheduled,
            permanently_failed = report.permanently_failed,
            "recovery sweep finished"
        );
    }
    Ok(report)
}

/// Immediately retries every outstanding operation of a submission,
/// including permanently failed ones.
///
/// Operations already being retried elsewhere are skipped. A failure still
/// counts against the retry budget.
///
/// # Errors
///
/// Returns [`PipelineError::NotFound`] for an unknown submission,
/// [`PipelineError::NothingToRetry`] when it has no claimable operation, or
/// [`PipelineError::Db`] if bookkeeping fails.
pub async fn retry_now(ctx: &PipelineContext, submission_id: Uuid) -> Result<RetryReport, PipelineError> {
    let started = Instant::now();
    let submission = supplydesk_db::get_submission_by_public_id(&ctx.pool, submission_id)
        .await
        .map_err(|e| not_found_as(e, "submission"))?;

    let claimed = supplydesk_db::claim_operations_for_submission(&ctx.pool, submission.id).await?;
    if claimed.is_empty() {
        return Err(PipelineError::NothingToRetry(submission_id));
    }

    let mut results = Vec::with_capacity(claimed.len());
    for operation in &claimed {
        let attempt = attempt_operation(ctx, operation).await;
        results.push(settle(ctx, operation, attempt).await?);
    }

    let report = RetryReport {
        submission_id,
        attempts: results.len(),
        results,
        elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    };
    tracing::info!(
        %submission_id,
        attempts = report.attempts,
        elapsed_ms = report.elapsed_ms,
        "manual retry finished"
    );
    Ok(report)
}

/// Current recovery backlog and resolution history.
///
/// # Errors
///
/// Returns [`PipelineError::Db`] if a query fails.
pub async fn recovery_stats(ctx: &PipelineContext) -> Result<RecoveryStats, PipelineError> {
    let stats = supplydesk_db::operation_stats(&ctx.pool).await?;
    let by_type = supplydesk_db::operation_counts_by_type(&ctx.pool).await?;

    Ok(RecoveryStats {
        total_failed: stats.total,
        scheduled: stats.scheduled,
        retrying: stats.retrying,
        permanently_failed: stats.permanently_failed,
        resolved: stats.resolved,
        by_operation_type: by_type
            .into_iter()
            .map(|row| (row.operation_type, row.count))
            .collect(),
        average_resolution_seconds: stats.average_resolution_seconds,
    })
}

/// Live operations, soonest retry first; permanently failed ones last.
///
/// # Errors
///
/// Returns [`PipelineError::Db`] if the query fails.
pub async fn recovery_queue(
    ctx: &PipelineContext,
    window: PageWindow,
) -> Result<Vec<QueuedOperation>, PipelineError> {
    let now = Utc::now();
    let rows = supplydesk_db::list_live_operations(&ctx.pool, window.limit, window.offset).await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let op = row.operation;
            let seconds_until_retry = (op.state != OperationState::PermanentlyFailed.as_str())
                .then(|| (op.next_retry_at - now).num_seconds().max(0));
            QueuedOperation {
                id: op.id,
                submission_id: row.submission_public_id,
                extracted_product_id: op.extracted_product_id,
                operation_type: op.operation_type,
                state: op.state,
                last_error: op.last_error,
                retry_count: op.retry_count,
                max_retries: op.max_retries,
                manual_attempts: op.manual_attempts,
                next_retry_at: op.next_retry_at,
                seconds_until_retry,
                created_at: op.created_at,
            }
        })
        .collect())
}

/// Fails submissions stuck in `processing` and returns abandoned `retrying`
/// operations to the schedule.
///
/// # Errors
///
/// Returns [`PipelineError::Db`] if a statement fails.
pub async fn sweep_stale_processing(ctx: &PipelineContext) -> Result<StaleSweepReport, PipelineError> {
    let minutes = ctx.policy.recovery.stale_processing_minutes;
    let stale = supplydesk_db::fail_stale_processing(&ctx.pool, minutes).await?;

    for submission in &stale {
        let error = submission
            .last_error
            .as_deref()
            .unwrap_or("extraction attempt exceeded the processing time limit");
        tracing::warn!(submission_id = %submission.public_id, "stale extraction failed");
        schedule_failure(ctx, submission.id, None, OperationType::AiExtraction, error).await?;
    }

    let released = supplydesk_db::release_stale_retrying(&ctx.pool, minutes).await?;
    if released > 0 {
        tracing::warn!(released, "released abandoned recovery operations");
    }

    Ok(StaleSweepReport {
        failed_submissions: stale.len(),
        released_operations: released,
    })
}

/// Re-queues `pending` submissions that never reached the extraction worker.
///
/// Returns how many were queued. Stops early when the queue is full; the
/// rest are picked up by a later run.
///
/// # Errors
///
/// Returns [`PipelineError::Db`] if claiming fails.
pub async fn dispatch_pending(
    ctx: &PipelineContext,
    queue: &ExtractionQueue,
) -> Result<usize, PipelineError> {
    let policy = &ctx.policy.recovery;
    let ids = supplydesk_db::claim_undispatched_pending(
        &ctx.pool,
        policy.pending_dispatch_after_secs,
        policy.sweep_batch_size,
    )
    .await?;

    let mut queued = 0;
    for id in ids {
        match queue.enqueue(id) {
            Ok(()) => queued += 1,
            Err(QueueError::Full) => {
                tracing::warn!(queued, "extraction queue full; deferring pending dispatch");
                break;
            }
            Err(QueueError::Closed) => {
                tracing::error!("extraction queue closed; cannot dispatch pending submissions");
                break;
            }
        }
    }
    if queued > 0 {
        tracing::info!(queued, "pending submissions dispatched");
    }
    Ok(queued)
}

/// Re-runs the stage behind an operation. `Err` carries the failure message.
async fn attempt_operation(ctx: &PipelineContext, operation: &FailedOperationRow) -> Result<(), String> {
    let operation_type: OperationType =
        operation.operation_type.parse().map_err(|e: supplydesk_core::CoreError| e.to_string())?;
    let submission_id = operation.submission_id;

    match operation_type {
        OperationType::Webhook => match worker::process(ctx, submission_id).await {
            // Dispatch happened; an extraction failure has its own operation.
            Ok(_) | Err(PipelineError::InvalidTransition { .. }) => Ok(()),
            Err(e) => Err(e.to_string()),
        },
        OperationType::AiExtraction => {
            let submission = supplydesk_db::get_submission(&ctx.pool, submission_id)
                .await
                .map_err(|e| e.to_string())?;
            let status: ProcessingStatus = submission
                .processing_status
                .parse()
                .map_err(|e: supplydesk_core::CoreError| e.to_string())?;
            let outcome = match status {
                ProcessingStatus::Completed => return Ok(()),
                ProcessingStatus::Processing => {
                    return Err("an extraction attempt is still running".to_string())
                }
                ProcessingStatus::Failed => worker::reprocess(ctx, submission_id).await,
                ProcessingStatus::Pending => worker::process(ctx, submission_id).await,
            };
            match outcome.map_err(|e| e.to_string())? {
                ProcessOutcome::Completed(_) => Ok(()),
                ProcessOutcome::Failed { error } => Err(error),
                ProcessOutcome::Superseded => Err("extraction attempt was superseded".to_string()),
            }
        }
        OperationType::Validation => worker::route_submission(ctx, submission_id)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string()),
        OperationType::InventoryUpdate => match operation.extracted_product_id {
            Some(product_id) => worker::try_sync_inventory(ctx, product_id)
                .await
                .map(|_| ())
                .map_err(|e| e.to_string()),
            None => Err("inventory operation has no product".to_string()),
        },
    }
}

async fn settle(
    ctx: &PipelineContext,
    operation: &FailedOperationRow,
    attempt: Result<(), String>,
) -> Result<OperationResult, PipelineError> {
    match attempt {
        Ok(()) => {
            // The stage itself may already have resolved it.
            supplydesk_db::resolve_operation(&ctx.pool, operation.id).await?;
            tracing::info!(
                operation_id = operation.id,
                operation_type = %operation.operation_type,
                "operation recovered"
            );
            Ok(OperationResult {
                operation_id: operation.id,
                operation_type: operation.operation_type.clone(),
                outcome: AttemptOutcome::Resolved,
                retry_count: operation.retry_count,
                error: None,
                next_retry_at: None,
            })
        }
        Err(error) => {
            let updated = supplydesk_db::reschedule_operation(
                &ctx.pool,
                operation.id,
                &error,
                &ctx.policy.recovery,
            )
            .await?;
            let Some(updated) = updated else {
                return Ok(OperationResult {
                    operation_id: operation.id,
                    operation_type: operation.operation_type.clone(),
                    outcome: AttemptOutcome::Resolved,
                    retry_count: operation.retry_count,
                    error: Some(error),
                    next_retry_at: None,
                });
            };

            let permanently_failed = updated.state == OperationState::PermanentlyFailed.as_str();
            if permanently_failed {
                tracing::error!(
                    operation_id = updated.id,
                    operation_type = %updated.operation_type,
                    retry_count = updated.retry_count,
                    error = %error,
                    "operation permanently failed"
                );
            } else {
                tracing::warn!(
                    operation_id = updated.id,
                    operation_type = %updated.operation_type,
                    retry_count = updated.retry_count,
                    next_retry_at = %updated.next_retry_at,
                    error = %error,
                    "operation rescheduled"
                );
            }

            Ok(OperationResult {
                operation_id: updated.id,
                operation_type: updated.operation_type,
                outcome: if permanently_failed {
                    AttemptOutcome::PermanentlyFailed
                } else {
                    AttemptOutcome::Rescheduled
                },
                retry_count: updated.retry_count,
                error: Some(error),
                next_retry_at: (!permanently_failed).then_some(updated.next_retry_at),
            })
        }
    }
}

pub(crate) fn not_found_as(error: supplydesk_db::DbError, entity: &'static str) -> PipelineError {
    match error {
        supplydesk_db::DbError::NotFound => PipelineError::NotFound(entity),
        other => other.into(),
    }
}
