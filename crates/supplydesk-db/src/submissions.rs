//! Database operations for `submissions`.
//!
//! Processing-status changes are single conditional `UPDATE`s so two workers
//! can never both claim, complete, or fail the same extraction attempt.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use supplydesk_core::{ContentType, ProcessingStatus, ValidationStatus};
use uuid::Uuid;

use crate::DbError;

const SUBMISSION_COLUMNS: &str = "id, public_id, source_message_id, supplier_phone, supplier_id, \
     supplier_name, content_type, content, media_url, processing_status, validation_status, \
     overall_confidence, extraction_attempt, last_error, dispatched_at, processing_started_at, \
     processed_at, created_at, updated_at";

/// A row from the `submissions` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SubmissionRow {
    pub id: i64,
    pub public_id: Uuid,
    pub source_message_id: String,
    pub supplier_phone: String,
    pub supplier_id: Option<String>,
    pub supplier_name: Option<String>,
    pub content_type: String,
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub processing_status: String,
    pub validation_status: String,
    pub overall_confidence: Option<f64>,
    pub extraction_attempt: i32,
    pub last_error: Option<String>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubmissionRow {
    /// Supplier identity used for grouping: directory id when known, else phone.
    #[must_use]
    pub fn supplier_key(&self) -> &str {
        self.supplier_id.as_deref().unwrap_or(&self.supplier_phone)
    }
}

#[derive(Debug, Clone)]
pub struct NewSubmission<'a> {
    pub source_message_id: &'a str,
    pub supplier_phone: &'a str,
    pub supplier_id: Option<&'a str>,
    pub supplier_name: Option<&'a str>,
    pub content_type: ContentType,
    pub content: Option<&'a str>,
    pub media_url: Option<&'a str>,
}

/// Result of [`insert_submission`].
#[derive(Debug, Clone)]
pub enum SubmissionInsert {
    Created(SubmissionRow),
    /// A submission with the same source message id already existed.
    Duplicate(SubmissionRow),
}

/// Filters for [`list_submissions`].
#[derive(Debug, Clone, Default)]
pub struct SubmissionListFilter<'a> {
    pub processing_status: Option<ProcessingStatus>,
    pub validation_status: Option<ValidationStatus>,
    pub supplier_id: Option<&'a str>,
    pub limit: i64,
    pub offset: i64,
}

/// Inserts a new `pending` submission.
///
/// A repeated `source_message_id` does not insert; the existing row is
/// returned as [`SubmissionInsert::Duplicate`].
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert or lookup fails.
pub async fn insert_submission(
    pool: &PgPool,
    new: &NewSubmission<'_>,
) -> Result<SubmissionInsert, DbError> {
    let sql = format!(
        "INSERT INTO submissions \
           (public_id, source_message_id, supplier_phone, supplier_id, supplier_name, \
            content_type, content, media_url) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         ON CONFLICT (source_message_id) DO NOTHING \
         RETURNING {SUBMISSION_COLUMNS}"
    );

    let inserted = sqlx::query_as::<_, SubmissionRow>(&sql)
        .bind(Uuid::new_v4())
        .bind(new.source_message_id)
        .bind(new.supplier_phone)
        .bind(new.supplier_id)
        .bind(new.supplier_name)
        .bind(new.content_type.as_str())
        .bind(new.content)
        .bind(new.media_url)
        .fetch_optional(pool)
        .await?;

    if let Some(row) = inserted {
        return Ok(SubmissionInsert::Created(row));
    }

    let sql = format!("SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE source_message_id = $1");
    let existing = sqlx::query_as::<_, SubmissionRow>(&sql)
        .bind(new.source_message_id)
        .fetch_one(pool)
        .await?;

    Ok(SubmissionInsert::Duplicate(existing))
}

/// Fetches a submission by its internal `id`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists, or [`DbError::Sqlx`] if the query fails.
pub async fn get_submission(pool: &PgPool, id: i64) -> Result<SubmissionRow, DbError> {
    let sql = format!("SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE id = $1");
    sqlx::query_as::<_, SubmissionRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// Fetches a submission by its public UUID.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists, or [`DbError::Sqlx`] if the query fails.
pub async fn get_submission_by_public_id(
    pool: &PgPool,
    public_id: Uuid,
) -> Result<SubmissionRow, DbError> {
    let sql = format!("SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE public_id = $1");
    sqlx::query_as::<_, SubmissionRow>(&sql)
        .bind(public_id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// Lists submissions newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_submissions(
    pool: &PgPool,
    filter: &SubmissionListFilter<'_>,
) -> Result<Vec<SubmissionRow>, DbError> {
    let sql = format!(
        "SELECT {SUBMISSION_COLUMNS} FROM submissions \
         WHERE ($1::TEXT IS NULL OR processing_status = $1) \
           AND ($2::TEXT IS NULL OR validation_status = $2) \
           AND ($3::TEXT IS NULL OR COALESCE(supplier_id, supplier_phone) = $3) \
         ORDER BY created_at DESC, id DESC \
         LIMIT $4 OFFSET $5"
    );
    let rows = sqlx::query_as::<_, SubmissionRow>(&sql)
        .bind(filter.processing_status.map(ProcessingStatus::as_str))
        .bind(filter.validation_status.map(ValidationStatus::as_str))
        .bind(filter.supplier_id)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Claims a `pending` submission for a new extraction attempt.
///
/// Moves it to `processing` and increments `extraction_attempt`; the returned
/// row carries the attempt number that must accompany the result.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] for an unknown id,
/// [`DbError::InvalidSubmissionTransition`] when it is not `pending`, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn claim_submission(pool: &PgPool, id: i64) -> Result<SubmissionRow, DbError> {
    let sql = format!(
        "UPDATE submissions \
         SET processing_status = 'processing', \
             extraction_attempt = extraction_attempt + 1, \
             processing_started_at = NOW(), \
             updated_at = NOW() \
         WHERE id = $1 AND processing_status = 'pending' \
         RETURNING {SUBMISSION_COLUMNS}"
    );
    let claimed = sqlx::query_as::<_, SubmissionRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match claimed {
        Some(row) => Ok(row),
        None => {
            get_submission(pool, id).await?;
            Err(DbError::InvalidSubmissionTransition {
                id,
                expected_status: "pending",
            })
        }
    }
}

/// Marks the given attempt as failed.
///
/// Returns `false` without changing anything when `attempt` is no longer the
/// submission's current `processing` attempt.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn fail_submission(
    pool: &PgPool,
    id: i64,
    attempt: i32,
    error_message: &str,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE submissions \
         SET processing_status = 'failed', last_error = $3, \
             processed_at = NOW(), updated_at = NOW() \
         WHERE id = $1 AND extraction_attempt = $2 AND processing_status = 'processing'",
    )
    .bind(id)
    .bind(attempt)
    .bind(error_message)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Moves a `failed` submission back to `pending` and discards the products
/// and undecided review items of earlier attempts.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] for an unknown id,
/// [`DbError::InvalidSubmissionTransition`] when it is not `failed`, or
/// [`DbError::Sqlx`] if a statement fails.
pub async fn reset_failed_submission(pool: &PgPool, id: i64) -> Result<SubmissionRow, DbError> {
    let mut tx = pool.begin().await?;

    let sql = format!(
        "UPDATE submissions \
         SET processing_status = 'pending', validation_status = 'pending', \
             overall_confidence = NULL, dispatched_at = NULL, \
             processing_started_at = NULL, processed_at = NULL, updated_at = NOW() \
         WHERE id = $1 AND processing_status = 'failed' \
         RETURNING {SUBMISSION_COLUMNS}"
    );
    let reset = sqlx::query_as::<_, SubmissionRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

    let Some(row) = reset else {
        tx.rollback().await?;
        get_submission(pool, id).await?;
        return Err(DbError::InvalidSubmissionTransition {
            id,
            expected_status: "failed",
        });
    };

    sqlx::query("DELETE FROM validation_items WHERE submission_id = $1 AND status = 'pending'")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "DELETE FROM extracted_products ep \
         WHERE ep.submission_id = $1 \
           AND NOT EXISTS (SELECT 1 FROM validation_items vi WHERE vi.extracted_product_id = ep.id)",
    )
    .bind(id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(row)
}

/// Records that the submission was handed to the extraction queue.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn mark_dispatched(pool: &PgPool, id: i64) -> Result<(), DbError> {
    sqlx::query("UPDATE submissions SET dispatched_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Claims `pending` submissions that were never dispatched, or were
/// dispatched more than `older_than_secs` ago, and stamps them as dispatched.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn claim_undispatched_pending(
    pool: &PgPool,
    older_than_secs: i64,
    limit: i64,
) -> Result<Vec<i64>, DbError> {
    let ids = sqlx::query_scalar::<_, i64>(
        "UPDATE submissions SET dispatched_at = NOW() \
         WHERE id IN ( \
             SELECT id FROM submissions \
             WHERE processing_status = 'pending' \
               AND created_at < NOW() - ($1::BIGINT * INTERVAL '1 second') \
               AND (dispatched_at IS NULL \
                    OR dispatched_at < NOW() - ($1::BIGINT * INTERVAL '1 second')) \
             ORDER BY created_at, id \
             LIMIT $2 \
             FOR UPDATE SKIP LOCKED) \
         RETURNING id",
    )
    .bind(older_than_secs)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(ids)
}

/// Fails submissions stuck in `processing` for longer than `older_than_minutes`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn fail_stale_processing(
    pool: &PgPool,
    older_than_minutes: i64,
) -> Result<Vec<SubmissionRow>, DbError> {
    let sql = format!(
        "UPDATE submissions \
         SET processing_status = 'failed', \
             last_error = 'extraction attempt exceeded the processing time limit', \
             processed_at = NOW(), updated_at = NOW() \
         WHERE processing_status = 'processing' \
           AND processing_started_at < NOW() - ($1::BIGINT * INTERVAL '1 minute') \
         RETURNING {SUBMISSION_COLUMNS}"
    );
    let rows = sqlx::query_as::<_, SubmissionRow>(&sql)
        .bind(older_than_minutes)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}
