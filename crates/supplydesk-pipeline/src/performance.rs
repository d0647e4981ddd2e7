use supplydesk_core::{rank_suppliers, SupplierPerformance, SupplierTally};
use supplydesk_db::SupplierTallyRow;

use crate::context::PipelineContext;
use crate::error::PipelineError;

fn tally(row: SupplierTallyRow) -> SupplierTally {
    SupplierTally {
        supplier_id: row.supplier_key,
        supplier_name: row.supplier_name,
        total_submissions: row.total_submissions,
        products_extracted: row.products_extracted,
        approved: row.approved,
        rejected: row.rejected,
        average_confidence: row.average_confidence,
        last_submission_at: row.last_submission_at,
    }
}

/// Best suppliers by approval rate, then submission volume.
///
/// # Errors
///
/// Returns [`PipelineError::Db`] if the query fails.
pub async fn top_suppliers(ctx: &PipelineContext, limit: usize) -> Result<Vec<SupplierPerformance>, PipelineError> {
    let rows = supplydesk_db::supplier_tallies(&ctx.pool, None).await?;
    Ok(rank_suppliers(
        rows.into_iter().map(tally).collect(),
        &ctx.policy.performance,
        limit,
    ))
}

/// Performance of one supplier, keyed by directory id or phone number.
///
/// # Errors
///
/// Returns [`PipelineError::NotFound`] when the supplier has no submissions,
/// or [`PipelineError::Db`] if the query fails.
pub async fn supplier_performance(
    ctx: &PipelineContext,
    supplier_id: &str,
) -> Result<SupplierPerformance, PipelineError> {
    let row = supplydesk_db::supplier_tallies(&ctx.pool, Some(supplier_id))
        .await?
        .into_iter()
        .next()
        .ok_or(PipelineError::NotFound("supplier"))?;
    Ok(SupplierPerformance::from_tally(tally(row), &ctx.policy.performance))
}
