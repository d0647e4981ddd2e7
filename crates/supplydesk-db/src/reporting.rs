//! Read-model queries behind the dashboard endpoints.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// Submission and review funnel counts.
#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub struct PipelineCountsRow {
    pub total_submissions: i64,
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub validation_pending: i64,
    pub validation_approved: i64,
    pub validation_rejected: i64,
    pub items_pending: i64,
    pub items_approved: i64,
    pub items_rejected: i64,
    pub items_auto_approved: i64,
}

#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub struct ConfidenceDistributionRow {
    pub high: i64,
    pub medium: i64,
    pub low: i64,
}

#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub struct AiMetricsRow {
    pub total_extractions: i64,
    pub successful_extractions: i64,
    pub failed_extractions: i64,
    pub average_processing_ms: Option<f64>,
    pub products_extracted: i64,
    pub average_confidence: Option<f64>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ModelUsageRow {
    pub model: String,
    pub products: i64,
    pub average_confidence: Option<f64>,
}

/// One day of the validation trend series.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TrendRow {
    pub day: NaiveDate,
    pub submissions: i64,
    pub approved: i64,
    pub rejected: i64,
    pub average_confidence: Option<f64>,
}

/// One entry of the recent-activity feed.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ActivityRow {
    pub kind: String,
    pub submission_id: Uuid,
    pub supplier_name: Option<String>,
    pub supplier_phone: String,
    pub detail: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Activity and failure counts per pipeline stage.
///
/// `*_failures` count live operations still being retried;
/// `*_permanent` count operations that exhausted their budget.
#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub struct HealthCountsRow {
    pub submissions_last_hour: i64,
    pub submissions_last_24h: i64,
    pub extraction_attempts_24h: i64,
    pub extraction_failures_24h: i64,
    pub webhook_failures: i64,
    pub webhook_permanent: i64,
    pub extraction_failures: i64,
    pub extraction_permanent: i64,
    pub items_created_24h: i64,
    pub validation_failures: i64,
    pub validation_permanent: i64,
    pub approvals_24h: i64,
    pub inventory_failures: i64,
    pub inventory_permanent: i64,
    pub validation_backlog: i64,
}

#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub struct AlertCountsRow {
    pub permanently_failed: i64,
    pub pending_over_warning: i64,
    pub pending_over_critical: i64,
    pub validation_backlog: i64,
    pub extraction_attempts_24h: i64,
    pub extraction_failures_24h: i64,
}

/// Processing and validation funnel counts.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn pipeline_counts(pool: &PgPool) -> Result<PipelineCountsRow, DbError> {
    let row = sqlx::query_as::<_, PipelineCountsRow>(
        "SELECT \
           s.total_submissions, s.pending, s.processing, s.completed, s.failed, \
           s.validation_pending, s.validation_approved, s.validation_rejected, \
           i.items_pending, i.items_approved, i.items_rejected, i.items_auto_approved \
         FROM ( \
           SELECT COUNT(*) AS total_submissions, \
                  COUNT(*) FILTER (WHERE processing_status = 'pending') AS pending, \
                  COUNT(*) FILTER (WHERE processing_status = 'processing') AS processing, \
                  COUNT(*) FILTER (WHERE processing_status = 'completed') AS completed, \
                  COUNT(*) FILTER (WHERE processing_status = 'failed') AS failed, \
                  COUNT(*) FILTER (WHERE validation_status = 'pending') AS validation_pending, \
                  COUNT(*) FILTER (WHERE validation_status = 'approved') AS validation_approved, \
                  COUNT(*) FILTER (WHERE validation_status = 'rejected') AS validation_rejected \
           FROM submissions) s \
         CROSS JOIN ( \
           SELECT COUNT(*) FILTER (WHERE status = 'pending') AS items_pending, \
                  COUNT(*) FILTER (WHERE status = 'approved') AS items_approved, \
                  COUNT(*) FILTER (WHERE status = 'rejected') AS items_rejected, \
                  COUNT(*) FILTER (WHERE decided_by = 'auto') AS items_auto_approved \
           FROM validation_items) i",
    )
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Extracted products bucketed as high (≥ 90), medium (70–89), low (< 70).
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn confidence_distribution(pool: &PgPool) -> Result<ConfidenceDistributionRow, DbError> {
    let row = sqlx::query_as::<_, ConfidenceDistributionRow>(
        "SELECT COUNT(*) FILTER (WHERE confidence >= 90) AS high, \
                COUNT(*) FILTER (WHERE confidence >= 70 AND confidence < 90) AS medium, \
                COUNT(*) FILTER (WHERE confidence < 70) AS low \
         FROM extracted_products",
    )
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Extraction success and product metrics since `since` (all time when `None`).
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn ai_metrics(
    pool: &PgPool,
    since: Option<DateTime<Utc>>,
) -> Result<AiMetricsRow, DbError> {
    let row = sqlx::query_as::<_, AiMetricsRow>(
        "SELECT r.total_extractions, r.successful_extractions, r.failed_extractions, \
                r.average_processing_ms, p.products_extracted, p.average_confidence \
         FROM ( \
           SELECT COUNT(*) AS total_extractions, \
                  COUNT(*) FILTER (WHERE outcome = 'succeeded') AS successful_extractions, \
                  COUNT(*) FILTER (WHERE outcome = 'failed') AS failed_extractions, \
                  AVG(duration_ms)::FLOAT8 AS average_processing_ms \
           FROM extraction_runs \
           WHERE ($1::TIMESTAMPTZ IS NULL OR created_at >= $1)) r \
         CROSS JOIN ( \
           SELECT COUNT(*) AS products_extracted, AVG(confidence) AS average_confidence \
           FROM extracted_products \
           WHERE ($1::TIMESTAMPTZ IS NULL OR created_at >= $1)) p",
    )
    .bind(since)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Products and mean confidence per extraction model.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn model_usage(
    pool: &PgPool,
    since: Option<DateTime<Utc>>,
) -> Result<Vec<ModelUsageRow>, DbError> {
    let rows = sqlx::query_as::<_, ModelUsageRow>(
        "SELECT model, COUNT(*) AS products, AVG(confidence) AS average_confidence \
         FROM extracted_products \
         WHERE ($1::TIMESTAMPTZ IS NULL OR created_at >= $1) \
         GROUP BY model \
         ORDER BY products DESC, model",
    )
    .bind(since)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Daily submissions and decisions for the last `days` days (UTC), oldest
/// first, with quiet days present as zeros.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn validation_trends(pool: &PgPool, days: i32) -> Result<Vec<TrendRow>, DbError> {
    let rows = sqlx::query_as::<_, TrendRow>(
        "WITH days AS ( \
           SELECT gs::DATE AS day \
           FROM generate_series( \
                  (NOW() AT TIME ZONE 'UTC')::DATE - ($1::INT - 1), \
                  (NOW() AT TIME ZONE 'UTC')::DATE, \
                  INTERVAL '1 day') AS gs \
         ), subs AS ( \
           SELECT (created_at AT TIME ZONE 'UTC')::DATE AS day, \
                  COUNT(*) AS submissions, \
                  AVG(overall_confidence) AS average_confidence \
           FROM submissions \
           WHERE created_at >= NOW() - make_interval(days => $1::INT) \
           GROUP BY 1 \
         ), decisions AS ( \
           SELECT (decided_at AT TIME ZONE 'UTC')::DATE AS day, \
                  COUNT(*) FILTER (WHERE status = 'approved') AS approved, \
                  COUNT(*) FILTER (WHERE status = 'rejected') AS rejected \
           FROM validation_items \
           WHERE decided_at >= NOW() - make_interval(days => $1::INT) \
           GROUP BY 1 \
         ) \
         SELECT days.day, \
                COALESCE(subs.submissions, 0)::BIGINT AS submissions, \
                COALESCE(decisions.approved, 0)::BIGINT AS approved, \
                COALESCE(decisions.rejected, 0)::BIGINT AS rejected, \
                subs.average_confidence \
         FROM days \
         LEFT JOIN subs USING (day) \
         LEFT JOIN decisions USING (day) \
         ORDER BY days.day",
    )
    .bind(days)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Latest submission, processing and review events, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn recent_activity(pool: &PgPool, limit: i64) -> Result<Vec<ActivityRow>, DbError> {
    let rows = sqlx::query_as::<_, ActivityRow>(
        "SELECT kind, submission_id, supplier_name, supplier_phone, detail, occurred_at FROM ( \
           SELECT 'submission_received' AS kind, s.public_id AS submission_id, \
                  s.supplier_name, s.supplier_phone, s.content_type AS detail, \
                  s.created_at AS occurred_at \
           FROM submissions s \
           UNION ALL \
           SELECT 'extraction_' || s.processing_status, s.public_id, \
                  s.supplier_name, s.supplier_phone, s.last_error, s.processed_at \
           FROM submissions s \
           WHERE s.processed_at IS NOT NULL \
             AND s.processing_status IN ('completed', 'failed') \
           UNION ALL \
           SELECT 'product_' || vi.status, s.public_id, \
                  vi.supplier_name, vi.supplier_phone, vi.product_snapshot ->> 'name', vi.decided_at \
           FROM validation_items vi \
           JOIN submissions s ON s.id = vi.submission_id \
           WHERE vi.decided_at IS NOT NULL \
         ) activity \
         ORDER BY occurred_at DESC \
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Counts feeding the per-subsystem health report.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn health_counts(pool: &PgPool) -> Result<HealthCountsRow, DbError> {
    let row = sqlx::query_as::<_, HealthCountsRow>(
        "SELECT \
           (SELECT COUNT(*) FROM submissions WHERE created_at >= NOW() - INTERVAL '1 hour') \
               AS submissions_last_hour, \
           (SELECT COUNT(*) FROM submissions WHERE created_at >= NOW() - INTERVAL '24 hours') \
               AS submissions_last_24h, \
           (SELECT COUNT(*) FROM extraction_runs WHERE created_at >= NOW() - INTERVAL '24 hours') \
               AS extraction_attempts_24h, \
           (SELECT COUNT(*) FROM extraction_runs \
              WHERE outcome = 'failed' AND created_at >= NOW() - INTERVAL '24 hours') \
               AS extraction_failures_24h, \
           f.webhook_failures, f.webhook_permanent, \
           f.extraction_failures, f.extraction_permanent, \
           (SELECT COUNT(*) FROM validation_items WHERE created_at >= NOW() - INTERVAL '24 hours') \
               AS items_created_24h, \
           f.validation_failures, f.validation_permanent, \
           (SELECT COUNT(*) FROM validation_items \
              WHERE status = 'approved' AND decided_at >= NOW() - INTERVAL '24 hours') \
               AS approvals_24h, \
           f.inventory_failures, f.inventory_permanent, \
           (SELECT COUNT(*) FROM validation_items WHERE status = 'pending') AS validation_backlog \
         FROM ( \
           SELECT \
             COUNT(*) FILTER (WHERE operation_type = 'webhook' AND state <> 'permanently_failed') \
                 AS webhook_failures, \
             COUNT(*) FILTER (WHERE operation_type = 'webhook' AND state = 'permanently_failed') \
                 AS webhook_permanent, \
             COUNT(*) FILTER (WHERE operation_type = 'ai_extraction' AND state <> 'permanently_failed') \
                 AS extraction_failures, \
             COUNT(*) FILTER (WHERE operation_type = 'ai_extraction' AND state = 'permanently_failed') \
                 AS extraction_permanent, \
             COUNT(*) FILTER (WHERE operation_type = 'validation' AND state <> 'permanently_failed') \
                 AS validation_failures, \
             COUNT(*) FILTER (WHERE operation_type = 'validation' AND state = 'permanently_failed') \
                 AS validation_permanent, \
             COUNT(*) FILTER (WHERE operation_type = 'inventory_update' AND state <> 'permanently_failed') \
                 AS inventory_failures, \
             COUNT(*) FILTER (WHERE operation_type = 'inventory_update' AND state = 'permanently_failed') \
                 AS inventory_permanent \
           FROM failed_operations) f",
    )
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Counts the alert rules are evaluated against.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn alert_counts(
    pool: &PgPool,
    pending_warning_minutes: i64,
    pending_critical_minutes: i64,
) -> Result<AlertCountsRow, DbError> {
    let row = sqlx::query_as::<_, AlertCountsRow>(
        "SELECT \
           (SELECT COUNT(*) FROM failed_operations WHERE state = 'permanently_failed') \
               AS permanently_failed, \
           (SELECT COUNT(*) FROM submissions WHERE processing_status = 'pending' \
              AND created_at < NOW() - ($1::BIGINT * INTERVAL '1 minute')) \
               AS pending_over_warning, \
           (SELECT COUNT(*) FROM submissions WHERE processing_status = 'pending' \
              AND created_at < NOW() - ($2::BIGINT * INTERVAL '1 minute')) \
               AS pending_over_critical, \
           (SELECT COUNT(*) FROM validation_items WHERE status = 'pending') \
               AS validation_backlog, \
           (SELECT COUNT(*) FROM extraction_runs WHERE created_at >= NOW() - INTERVAL '24 hours') \
               AS extraction_attempts_24h, \
           (SELECT COUNT(*) FROM extraction_runs \
              WHERE outcome = 'failed' AND created_at >= NOW() - INTERVAL '24 hours') \
               AS extraction_failures_24h",
    )
    .bind(pending_warning_minutes)
    .bind(pending_critical_minutes)
    .fetch_one(pool)
    .await?;
    Ok(row)
}
