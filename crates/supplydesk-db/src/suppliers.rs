//! Per-supplier aggregates. Suppliers are keyed by directory id when the
//! directory knew them at ingestion, otherwise by phone number.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SupplierTallyRow {
    pub supplier_key: String,
    pub supplier_name: Option<String>,
    pub total_submissions: i64,
    pub products_extracted: i64,
    pub approved: i64,
    pub rejected: i64,
    pub average_confidence: Option<f64>,
    pub last_submission_at: Option<DateTime<Utc>>,
}

/// Submission, product and decision counts per supplier; a single supplier
/// when `supplier_key` is given.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn supplier_tallies(
    pool: &PgPool,
    supplier_key: Option<&str>,
) -> Result<Vec<SupplierTallyRow>, DbError> {
    let rows = sqlx::query_as::<_, SupplierTallyRow>(
        "WITH subs AS ( \
           SELECT COALESCE(supplier_id, supplier_phone) AS supplier_key, \
                  MAX(supplier_name) AS supplier_name, \
                  COUNT(*) AS total_submissions, \
                  MAX(created_at) AS last_submission_at \
           FROM submissions \
           WHERE ($1::TEXT IS NULL OR COALESCE(supplier_id, supplier_phone) = $1) \
           GROUP BY 1 \
         ), products AS ( \
           SELECT COALESCE(s.supplier_id, s.supplier_phone) AS supplier_key, \
                  COUNT(ep.id) AS products_extracted, \
                  AVG(ep.confidence) AS average_confidence \
           FROM extracted_products ep \
           JOIN submissions s ON s.id = ep.submission_id \
           GROUP BY 1 \
         ), decisions AS ( \
           SELECT COALESCE(supplier_id, supplier_phone) AS supplier_key, \
                  COUNT(*) FILTER (WHERE status = 'approved') AS approved, \
                  COUNT(*) FILTER (WHERE status = 'rejected') AS rejected \
           FROM validation_items \
           GROUP BY 1 \
         ) \
         SELECT subs.supplier_key, subs.supplier_name, subs.total_submissions, \
                COALESCE(products.products_extracted, 0)::BIGINT AS products_extracted, \
                COALESCE(decisions.approved, 0)::BIGINT AS approved, \
                COALESCE(decisions.rejected, 0)::BIGINT AS rejected, \
                products.average_confidence, \
                subs.last_submission_at \
         FROM subs \
         LEFT JOIN products USING (supplier_key) \
         LEFT JOIN decisions USING (supplier_key) \
         ORDER BY subs.supplier_key",
    )
    .bind(supplier_key)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
