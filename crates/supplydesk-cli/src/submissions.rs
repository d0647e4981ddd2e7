use clap::Subcommand;
use supplydesk_pipeline::{PipelineContext, ProcessOutcome};
use uuid::Uuid;

use crate::fmt_opt;

#[derive(Debug, Subcommand)]
pub enum SubmissionCommands {
    /// Show a submission with its products and outstanding operations
    Show { submission_id: Uuid },
    /// Run extraction now for a pending submission
    Process { submission_id: Uuid },
    /// Re-run extraction for a failed submission
    Reprocess { submission_id: Uuid },
}

pub(crate) async fn run(ctx: &PipelineContext, command: SubmissionCommands) -> anyhow::Result<()> {
    match command {
        SubmissionCommands::Show { submission_id } => show(ctx, submission_id).await,
        SubmissionCommands::Process { submission_id } => {
            let outcome = supplydesk_pipeline::process_submission(ctx, submission_id).await?;
            print_outcome(submission_id, &outcome);
            Ok(())
        }
        SubmissionCommands::Reprocess { submission_id } => {
            let outcome = supplydesk_pipeline::reprocess_submission(ctx, submission_id).await?;
            print_outcome(submission_id, &outcome);
            Ok(())
        }
    }
}

async fn show(ctx: &PipelineContext, submission_id: Uuid) -> anyhow::Result<()> {
    let detail = supplydesk_pipeline::submission_detail(ctx, submission_id).await?;
    let submission = &detail.submission;

    println!("Submission: {}", submission.public_id);
    println!(
        "Supplier:   {} ({})",
        submission.supplier_name.as_deref().unwrap_or("unknown"),
        submission.supplier_key()
    );
    println!(
        "Status:     processing={} validation={} attempt={}",
        submission.processing_status, submission.validation_status, submission.extraction_attempt
    );
    println!(
        "Confidence: {}",
        fmt_opt(submission.overall_confidence.map(|c| format!("{c:.1}")))
    );
    if let Some(error) = &submission.last_error {
        println!("Last error: {error}");
    }

    if !detail.products.is_empty() {
        println!();
        println!("{:<8}{:<40}{:<12}CATALOG", "ID", "PRODUCT", "CONFIDENCE");
        for product in &detail.products {
            println!(
                "{:<8}{:<40}{:<12.1}{}",
                product.id,
                product.name,
                product.confidence,
                fmt_opt(product.catalog_product_id.as_deref())
            );
        }
    }

    if !detail.operations.is_empty() {
        println!();
        println!("{:<8}{:<18}{:<20}ERROR", "OP", "TYPE", "STATE");
        for op in &detail.operations {
            println!(
                "{:<8}{:<18}{:<20}{}",
                op.id, op.operation_type, op.state, op.last_error
            );
        }
    }
    Ok(())
}

fn print_outcome(submission_id: Uuid, outcome: &ProcessOutcome) {
    match outcome {
        ProcessOutcome::Completed(summary) => println!(
            "{submission_id}: {} product(s), confidence {:.1}, {} auto-approved, {} awaiting review, {} held",
            summary.products,
            summary.overall_confidence,
            summary.auto_approved,
            summary.pending_review,
            summary.held
        ),
        ProcessOutcome::Failed { error } => {
            println!("{submission_id}: extraction failed ({error}); scheduled for recovery");
        }
        ProcessOutcome::Superseded => {
            println!("{submission_id}: result discarded, a newer attempt owns this submission");
        }
    }
}
