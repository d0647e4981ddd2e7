//! Database operations for `failed_operations` and `recovery_resolutions`.
//!
//! Claims are single conditional `UPDATE`s (the automatic sweep also uses
//! `FOR UPDATE SKIP LOCKED`), so a manual retry and the scheduler can never
//! both own one operation.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use supplydesk_core::{OperationType, RecoveryPolicy};
use uuid::Uuid;

use crate::DbError;

const OPERATION_COLUMNS: &str = "id, submission_id, extracted_product_id, operation_type, state, \
     last_error, retry_count, max_retries, manual_attempts, next_retry_at, metadata, created_at, \
     updated_at";

/// A row from the `failed_operations` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FailedOperationRow {
    pub id: i64,
    pub submission_id: i64,
    pub extracted_product_id: Option<i64>,
    pub operation_type: String,
    pub state: String,
    pub last_error: String,
    pub retry_count: i32,
    pub max_retries: i32,
    pub manual_attempts: i32,
    pub next_retry_at: DateTime<Utc>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewFailedOperation {
    pub submission_id: i64,
    pub extracted_product_id: Option<i64>,
    pub operation_type: OperationType,
    pub error: String,
    pub max_retries: i32,
    pub next_retry_at: DateTime<Utc>,
    pub metadata: Value,
}

/// Aggregate counts over live operations plus resolution history.
#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub struct OperationStatsRow {
    pub total: i64,
    pub scheduled: i64,
    pub retrying: i64,
    pub permanently_failed: i64,
    pub resolved: i64,
    pub average_resolution_seconds: Option<f64>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OperationCountRow {
    pub operation_type: String,
    pub count: i64,
}

/// Records a failed stage.
///
/// When a live operation already exists for the same submission, stage and
/// product, only its error and metadata are refreshed; its retry budget and
/// schedule are left alone. A `max_retries` of zero starts the operation
/// permanently failed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn record_failed_operation(
    pool: &PgPool,
    new: &NewFailedOperation,
) -> Result<FailedOperationRow, DbError> {
    let sql = format!(
        "INSERT INTO failed_operations \
           (submission_id, extracted_product_id, operation_type, state, last_error, \
            max_retries, next_retry_at, metadata) \
         VALUES ($1, $2, $3, \
                 CASE WHEN $5 <= 0 THEN 'permanently_failed' ELSE 'scheduled' END, \
                 $4, GREATEST($5, 0), $6, $7) \
         ON CONFLICT (submission_id, operation_type, product_key) DO UPDATE \
           SET last_error = EXCLUDED.last_error, \
               metadata = failed_operations.metadata || EXCLUDED.metadata, \
               updated_at = NOW() \
         RETURNING {OPERATION_COLUMNS}"
    );
    let row = sqlx::query_as::<_, FailedOperationRow>(&sql)
        .bind(new.submission_id)
        .bind(new.extracted_product_id)
        .bind(new.operation_type.as_str())
        .bind(&new.error)
        .bind(new.max_retries)
        .bind(new.next_retry_at)
        .bind(&new.metadata)
        .fetch_one(pool)
        .await?;

    Ok(row)
}

/// Claims up to `batch_size` operations whose retry time has come.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn claim_due_operations(
    pool: &PgPool,
    batch_size: i64,
) -> Result<Vec<FailedOperationRow>, DbError> {
    let sql = format!(
        "UPDATE failed_operations SET state = 'retrying', updated_at = NOW() \
         WHERE id IN ( \
             SELECT id FROM failed_operations \
             WHERE state = 'scheduled' \
               AND next_retry_at <= NOW() \
               AND retry_count < max_retries \
             ORDER BY next_retry_at, id \
             LIMIT $1 \
             FOR UPDATE SKIP LOCKED) \
         RETURNING {OPERATION_COLUMNS}"
    );
    let mut rows = sqlx::query_as::<_, FailedOperationRow>(&sql)
        .bind(batch_size)
        .fetch_all(pool)
        .await?;
    rows.sort_by_key(|r| (r.next_retry_at, r.id));

    Ok(rows)
}

/// Claims every live operation of a submission for an immediate manual
/// retry, regardless of schedule. Operations another worker is already
/// retrying are skipped.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn claim_operations_for_submission(
    pool: &PgPool,
    submission_id: i64,
) -> Result<Vec<FailedOperationRow>, DbError> {
    let sql = format!(
        "UPDATE failed_operations \
         SET state = 'retrying', manual_attempts = manual_attempts + 1, updated_at = NOW() \
         WHERE submission_id = $1 AND state IN ('scheduled', 'permanently_failed') \
         RETURNING {OPERATION_COLUMNS}"
    );
    let mut rows = sqlx::query_as::<_, FailedOperationRow>(&sql)
        .bind(submission_id)
        .fetch_all(pool)
        .await?;
    rows.sort_by_key(|r| r.id);

    Ok(rows)
}

/// Records another failed attempt of a claimed operation.
///
/// The retry count grows by one but never past `max_retries`; reaching it
/// makes the operation permanently failed, otherwise it is rescheduled after
/// the policy's backoff. Returns `None` when the operation no longer exists.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if a statement fails.
pub async fn reschedule_operation(
    pool: &PgPool,
    id: i64,
    error_message: &str,
    policy: &RecoveryPolicy,
) -> Result<Option<FailedOperationRow>, DbError> {
    let mut tx = pool.begin().await?;

    let current = sqlx::query_as::<_, (i32, i32)>(
        "SELECT retry_count, max_retries FROM failed_operations WHERE id = $1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some((retry_count, max_retries)) = current else {
        tx.rollback().await?;
        return Ok(None);
    };

    let next_count = retry_count.saturating_add(1).min(max_retries);
    let state = if next_count >= max_retries {
        "permanently_failed"
    } else {
        "scheduled"
    };
    let next_retry_at = Utc::now() + policy.backoff(next_count);

    let sql = format!(
        "UPDATE failed_operations \
         SET retry_count = $2, state = $3, last_error = $4, next_retry_at = $5, updated_at = NOW() \
         WHERE id = $1 \
         RETURNING {OPERATION_COLUMNS}"
    );
    let row = sqlx::query_as::<_, FailedOperationRow>(&sql)
        .bind(id)
        .bind(next_count)
        .bind(state)
        .bind(error_message)
        .bind(next_retry_at)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(Some(row))
}

/// Deletes a recovered operation and logs the resolution.
///
/// Returns `false` when the operation was already gone.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if a statement fails.
pub async fn resolve_operation(pool: &PgPool, id: i64) -> Result<bool, DbError> {
    let result = sqlx::query(
        "WITH resolved AS ( \
             DELETE FROM failed_operations WHERE id = $1 \
             RETURNING submission_id, operation_type, retry_count, manual_attempts, created_at) \
         INSERT INTO recovery_resolutions \
           (submission_id, operation_type, retry_count, manual_attempts, failed_at) \
         SELECT submission_id, operation_type, retry_count, manual_attempts, created_at \
         FROM resolved",
    )
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Resolves every live operation of the given stages for a submission,
/// e.g. after a successful extraction outside the recovery loop.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the statement fails.
pub async fn resolve_operations_for_submission(
    pool: &PgPool,
    submission_id: i64,
    operation_types: &[OperationType],
) -> Result<u64, DbError> {
    let types: Vec<&str> = operation_types.iter().map(|t| t.as_str()).collect();
    let result = sqlx::query(
        "WITH resolved AS ( \
             DELETE FROM failed_operations \
             WHERE submission_id = $1 AND operation_type = ANY($2) \
             RETURNING submission_id, operation_type, retry_count, manual_attempts, created_at) \
         INSERT INTO recovery_resolutions \
           (submission_id, operation_type, retry_count, manual_attempts, failed_at) \
         SELECT submission_id, operation_type, retry_count, manual_attempts, created_at \
         FROM resolved",
    )
    .bind(submission_id)
    .bind(&types)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Returns operations left in `retrying` for longer than `older_than_minutes`
/// (their worker died) to the schedule without charging a retry.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn release_stale_retrying(pool: &PgPool, older_than_minutes: i64) -> Result<u64, DbError> {
    let result = sqlx::query(
        "UPDATE failed_operations \
         SET state = CASE WHEN retry_count >= max_retries THEN 'permanently_failed' \
                          ELSE 'scheduled' END, \
             updated_at = NOW() \
         WHERE state = 'retrying' \
           AND updated_at < NOW() - ($1::BIGINT * INTERVAL '1 minute')",
    )
    .bind(older_than_minutes)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// A live operation together with its submission's public id.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct QueuedOperationRow {
    #[sqlx(flatten)]
    pub operation: FailedOperationRow,
    pub submission_public_id: Uuid,
}

/// Live operations, soonest retry first; permanently failed ones last.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_live_operations(
    pool: &PgPool,
    limit: i64,
    offset: i64,
) -> Result<Vec<QueuedOperationRow>, DbError> {
    let sql = format!(
        "SELECT o.*, s.public_id AS submission_public_id \
         FROM (SELECT {OPERATION_COLUMNS} FROM failed_operations) o \
         JOIN submissions s ON s.id = o.submission_id \
         ORDER BY (o.state = 'permanently_failed'), o.next_retry_at, o.id \
         LIMIT $1 OFFSET $2"
    );
    let rows = sqlx::query_as::<_, QueuedOperationRow>(&sql)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Live operations of one submission.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_operations_for_submission(
    pool: &PgPool,
    submission_id: i64,
) -> Result<Vec<FailedOperationRow>, DbError> {
    let sql = format!(
        "SELECT {OPERATION_COLUMNS} FROM failed_operations \
         WHERE submission_id = $1 ORDER BY id"
    );
    let rows = sqlx::query_as::<_, FailedOperationRow>(&sql)
        .bind(submission_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Counts by state plus average time from first failure to resolution.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn operation_stats(pool: &PgPool) -> Result<OperationStatsRow, DbError> {
    let row = sqlx::query_as::<_, OperationStatsRow>(
        "SELECT \
           (SELECT COUNT(*) FROM failed_operations) AS total, \
           (SELECT COUNT(*) FROM failed_operations WHERE state = 'scheduled') AS scheduled, \
           (SELECT COUNT(*) FROM failed_operations WHERE state = 'retrying') AS retrying, \
           (SELECT COUNT(*) FROM failed_operations WHERE state = 'permanently_failed') \
               AS permanently_failed, \
           (SELECT COUNT(*) FROM recovery_resolutions) AS resolved, \
           (SELECT AVG(EXTRACT(EPOCH FROM (resolved_at - failed_at)))::FLOAT8 \
              FROM recovery_resolutions) AS average_resolution_seconds",
    )
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Live operation counts per stage.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn operation_counts_by_type(pool: &PgPool) -> Result<Vec<OperationCountRow>, DbError> {
    let rows = sqlx::query_as::<_, OperationCountRow>(
        "SELECT operation_type, COUNT(*) AS count \
         FROM failed_operations \
         GROUP BY operation_type \
         ORDER BY operation_type",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
