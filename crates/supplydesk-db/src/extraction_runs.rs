//! Append-only log of extraction attempts, read by the AI metrics and
//! health reports.

use sqlx::PgPool;

use crate::DbError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionOutcome {
    Succeeded,
    Failed,
}

impl ExtractionOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ExtractionOutcome::Succeeded => "succeeded",
            ExtractionOutcome::Failed => "failed",
        }
    }
}

/// Appends one attempt to `extraction_runs`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
#[allow(clippy::too_many_arguments)]
pub async fn record_extraction_run(
    pool: &PgPool,
    submission_id: i64,
    attempt: i32,
    outcome: ExtractionOutcome,
    model: Option<&str>,
    duration_ms: i64,
    products_found: i32,
    error_message: Option<&str>,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO extraction_runs \
           (submission_id, extraction_attempt, outcome, model, duration_ms, products_found, error_message) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(submission_id)
    .bind(attempt)
    .bind(outcome.as_str())
    .bind(model)
    .bind(duration_ms)
    .bind(products_found)
    .bind(error_message)
    .execute(pool)
    .await?;

    Ok(())
}
