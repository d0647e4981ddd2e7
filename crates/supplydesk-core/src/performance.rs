//! Supplier performance derived from submission and review history.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::policy::PerformancePolicy;
use crate::status::SupplierTier;

/// Raw per-supplier counts as aggregated from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct SupplierTally {
    pub supplier_id: String,
    pub supplier_name: Option<String>,
    pub total_submissions: i64,
    pub products_extracted: i64,
    /// Decided validation items (automatic and operator).
    pub approved: i64,
    pub rejected: i64,
    pub average_confidence: Option<f64>,
    pub last_submission_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupplierPerformance {
    pub supplier_id: String,
    pub supplier_name: Option<String>,
    pub total_submissions: i64,
    pub products_extracted: i64,
    pub approved: i64,
    pub rejected: i64,
    /// `approved / (approved + rejected)`, `0.0` with no decisions.
    pub approval_rate: f64,
    pub average_confidence: f64,
    pub tier: SupplierTier,
    pub last_submission_at: Option<DateTime<Utc>>,
}

/// `approved / (approved + rejected)`, `0.0` when nothing has been decided.
#[must_use]
pub fn approval_rate(approved: i64, rejected: i64) -> f64 {
    let decided = approved.max(0) + rejected.max(0);
    if decided == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let rate = approved.max(0) as f64 / decided as f64;
    rate
}

impl SupplierPerformance {
    #[must_use]
    pub fn from_tally(tally: SupplierTally, policy: &PerformancePolicy) -> Self {
        let approval_rate = approval_rate(tally.approved, tally.rejected);
        Self {
            tier: policy.tier(approval_rate),
            approval_rate,
            average_confidence: tally
                .average_confidence
                .filter(|c| c.is_finite())
                .unwrap_or(0.0),
            supplier_id: tally.supplier_id,
            supplier_name: tally.supplier_name,
            total_submissions: tally.total_submissions,
            products_extracted: tally.products_extracted,
            approved: tally.approved,
            rejected: tally.rejected,
            last_submission_at: tally.last_submission_at,
        }
    }
}

/// Ranks suppliers best-first: approval rate, then submission volume, then id.
#[must_use]
pub fn rank_suppliers(
    tallies: Vec<SupplierTally>,
    policy: &PerformancePolicy,
    limit: usize,
) -> Vec<SupplierPerformance> {
    let mut ranked: Vec<SupplierPerformance> = tallies
        .into_iter()
        .map(|t| SupplierPerformance::from_tally(t, policy))
        .collect();
    ranked.sort_by(|a, b| {
        b.approval_rate
            .total_cmp(&a.approval_rate)
            .then(b.total_submissions.cmp(&a.total_submissions))
            .then(a.supplier_id.cmp(&b.supplier_id))
    });
    ranked.truncate(limit);
    ranked
}
