//! `recovery` subcommands: run the sweeps on demand and inspect the queue.

use clap::Subcommand;
use supplydesk_core::PageWindow;
use supplydesk_pipeline::PipelineContext;
use uuid::Uuid;

use crate::fmt_opt;

#[derive(Debug, Subcommand)]
pub enum RecoveryCommands {
    /// Retry every failed operation that is due now
    Sweep,
    /// Fail submissions stuck in processing and release abandoned retries
    Stale,
    /// Show recovery counters
    Stats,
    /// List live failed operations, soonest retry first
    Queue {
        #[arg(long, default_value = "20")]
        limit: i64,
    },
    /// Retry all operations of one submission now, including permanently failed ones
    Retry {
        /// Public submission id
        submission_id: Uuid,
    },
}

pub(crate) async fn run(ctx: &PipelineContext, command: RecoveryCommands) -> anyhow::Result<()> {
    match command {
        RecoveryCommands::Sweep => {
            let report = supplydesk_pipeline::run_recovery_sweep(ctx).await?;
            println!(
                "claimed {}, resolved {}, rescheduled {}, permanently failed {}",
                report.claimed, report.resolved, report.rescheduled, report.permanently_failed
            );
        }
        RecoveryCommands::Stale => {
            let report = supplydesk_pipeline::sweep_stale_processing(ctx).await?;
            println!(
                "failed {} stale submissions, released {} operations",
                report.failed_submissions, report.released_operations
            );
        }
        RecoveryCommands::Stats => print_stats(ctx).await?,
        RecoveryCommands::Queue { limit } => print_queue(ctx, limit).await?,
        RecoveryCommands::Retry { submission_id } => {
            let report = supplydesk_pipeline::retry_now(ctx, submission_id).await?;
            println!(
                "submission {}: {} operation(s) retried in {} ms",
                report.submission_id, report.attempts, report.elapsed_ms
            );
            for result in &report.results {
                println!(
                    "  #{:<8}{:<18}{:<20}retries={} {}",
                    result.operation_id,
                    result.operation_type,
                    result.outcome.as_str(),
                    result.retry_count,
                    result.error.as_deref().unwrap_or("")
                );
            }
        }
    }
    Ok(())
}

async fn print_stats(ctx: &PipelineContext) -> anyhow::Result<()> {
    let stats = supplydesk_pipeline::recovery_stats(ctx).await?;
    println!("live operations:     {}", stats.total_failed);
    println!("  scheduled:         {}", stats.scheduled);
    println!("  retrying:          {}", stats.retrying);
    println!("  permanently failed: {}", stats.permanently_failed);
    println!("resolved:            {}", stats.resolved);
    println!(
        "avg resolution (s):  {}",
        fmt_opt(stats.average_resolution_seconds.map(|s| format!("{s:.0}")))
    );
    for (operation_type, count) in &stats.by_operation_type {
        println!("  {operation_type:<18}{count}");
    }
    Ok(())
}

async fn print_queue(ctx: &PipelineContext, limit: i64) -> anyhow::Result<()> {
    let operations =
        supplydesk_pipeline::recovery_queue(ctx, PageWindow::from_params(None, Some(limit))).await?;

    if operations.is_empty() {
        println!("recovery queue is empty");
        return Ok(());
    }

    println!(
        "{:<8}{:<38}{:<18}{:<20}{:<9}NEXT IN (s)",
        "ID", "SUBMISSION", "TYPE", "STATE", "RETRIES"
    );
    for op in &operations {
        println!(
            "{:<8}{:<38}{:<18}{:<20}{:<9}{}",
            op.id,
            op.submission_id,
            op.operation_type,
            op.state,
            format!("{}/{}", op.retry_count, op.max_retries),
            fmt_opt(op.seconds_until_retry)
        );
    }
    Ok(())
}
