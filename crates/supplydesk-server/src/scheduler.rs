//! Background job scheduler.
//!
//! Registers the recurring recovery jobs at server startup:
//! - the recovery sweep retries due failed operations,
//! - the stale sweep fails submissions stuck in `processing`,
//! - the dispatch sweep re-queues `pending` submissions the queue never took.

use supplydesk_core::AppConfig;
use supplydesk_pipeline::{ExtractionQueue, PipelineContext};
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive
/// for the lifetime of the process. Dropping it shuts down all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// a cron expression is invalid, or the scheduler fails to start.
pub async fn build_scheduler(
    ctx: PipelineContext,
    queue: ExtractionQueue,
    config: &AppConfig,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    register_recovery_sweep(&scheduler, ctx.clone(), &config.recovery_sweep_cron).await?;
    register_stale_sweep(&scheduler, ctx.clone(), &config.stale_sweep_cron).await?;
    register_pending_dispatch(&scheduler, ctx, queue, &config.pending_dispatch_cron).await?;

    scheduler.start().await?;
    Ok(scheduler)
}

async fn register_recovery_sweep(
    scheduler: &JobScheduler,
    ctx: PipelineContext,
    schedule: &str,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(schedule, move |_uuid, _lock| {
        let ctx = ctx.clone();
        Box::pin(async move {
            match supplydesk_pipeline::run_recovery_sweep(&ctx).await {
                Ok(report) if report.claimed > 0 => tracing::info!(
                    claimed = report.claimed,
                    resolved = report.resolved,
                    rescheduled = report.rescheduled,
                    permanently_failed = report.permanently_failed,
                    "scheduler: recovery sweep complete"
                ),
                Ok(_) => tracing::debug!("scheduler: recovery sweep found nothing due"),
                Err(e) => tracing::error!(error = %e, "scheduler: recovery sweep failed"),
            }
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}

async fn register_stale_sweep(
    scheduler: &JobScheduler,
    ctx: PipelineContext,
    schedule: &str,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(schedule, move |_uuid, _lock| {
        let ctx = ctx.clone();
        Box::pin(async move {
            match supplydesk_pipeline::sweep_stale_processing(&ctx).await {
                Ok(report) => {
                    if report.failed_submissions > 0 || report.released_operations > 0 {
                        tracing::warn!(
                            failed_submissions = report.failed_submissions,
                            released_operations = report.released_operations,
                            "scheduler: stale work recovered"
                        );
                    }
                }
                Err(e) => tracing::error!(error = %e, "scheduler: stale sweep failed"),
            }
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}

async fn register_pending_dispatch(
    scheduler: &JobScheduler,
    ctx: PipelineContext,
    queue: ExtractionQueue,
    schedule: &str,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(schedule, move |_uuid, _lock| {
        let ctx = ctx.clone();
        let queue = queue.clone();
        Box::pin(async move {
            if let Err(e) = supplydesk_pipeline::dispatch_pending(&ctx, &queue).await {
                tracing::error!(error = %e, "scheduler: pending dispatch failed");
            }
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}
