//! Database operations for `validation_items`.
//!
//! Every write that changes an item's status also recomputes the parent
//! submission's `validation_status` inside the same transaction, with the
//! submission row locked so concurrent decisions on sibling items serialize.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgConnection, PgPool};
use supplydesk_core::{ContentType, Priority, RejectionFeedback, ValidationStatus};

use crate::DbError;

const ITEM_COLUMNS: &str = "id, extracted_product_id, submission_id, supplier_id, supplier_name, \
     supplier_phone, content_type, product_snapshot, confidence, priority, status, decided_by, \
     notes, feedback_reasons, feedback_comment, submitted_at, decided_at, created_at, updated_at";

const PENDING_FILTER: &str = "status = 'pending' \
       AND confidence < $1 \
       AND ($2::TEXT IS NULL OR COALESCE(supplier_id, supplier_phone) = $2) \
       AND ($3::TEXT IS NULL OR content_type = $3) \
       AND ($4::TEXT IS NULL OR priority = $4) \
       AND ($5::FLOAT8 IS NULL OR confidence >= $5) \
       AND ($6::FLOAT8 IS NULL OR confidence <= $6)";

/// A row from the `validation_items` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ValidationItemRow {
    pub id: i64,
    pub extracted_product_id: i64,
    pub submission_id: i64,
    pub supplier_id: Option<String>,
    pub supplier_name: Option<String>,
    pub supplier_phone: String,
    pub content_type: String,
    pub product_snapshot: Value,
    pub confidence: f64,
    pub priority: String,
    pub status: String,
    pub decided_by: Option<String>,
    pub notes: Option<String>,
    pub feedback_reasons: Vec<String>,
    pub feedback_comment: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Review item to create for one extracted product.
#[derive(Debug, Clone)]
pub struct NewValidationItem {
    pub extracted_product_id: i64,
    pub product_snapshot: Value,
    pub confidence: f64,
    pub priority: Priority,
    /// The product cleared the auto-approve threshold. It is inserted as
    /// approved with `decided_by = 'auto'` once none of the submission's
    /// items is pending or rejected, and held back until then.
    pub auto_approved: bool,
}

#[derive(Debug, Clone)]
pub struct RoutedItems {
    /// Items created by this call; items that already existed are skipped.
    pub inserted: Vec<ValidationItemRow>,
    /// Auto-approvable products still waiting on the review outcome.
    pub held: usize,
    pub submission_status: ValidationStatus,
}

/// An operator decision on one pending item.
#[derive(Debug, Clone, Copy)]
pub enum Decision<'a> {
    Approve { notes: Option<&'a str> },
    Reject {
        feedback: &'a RejectionFeedback,
        notes: Option<&'a str>,
    },
}

#[derive(Debug, Clone)]
pub struct DecisionOutcome {
    pub item: ValidationItemRow,
    pub submission_status: ValidationStatus,
}

/// Filters for [`list_pending_items`].
#[derive(Debug, Clone)]
pub struct PendingItemsQuery<'a> {
    pub supplier_id: Option<&'a str>,
    pub content_type: Option<ContentType>,
    pub priority: Option<Priority>,
    pub min_confidence: Option<f64>,
    pub max_confidence: Option<f64>,
    /// Items at or above this confidence never appear in the queue.
    pub below_confidence: f64,
    pub limit: i64,
    pub offset: i64,
}

async fn lock_submission(conn: &mut PgConnection, submission_id: i64) -> Result<(), DbError> {
    sqlx::query_scalar::<_, i64>("SELECT id FROM submissions WHERE id = $1 FOR UPDATE")
        .bind(submission_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(DbError::NotFound)?;
    Ok(())
}

async fn recompute_submission_status(
    conn: &mut PgConnection,
    submission_id: i64,
) -> Result<ValidationStatus, DbError> {
    let raw = sqlx::query_scalar::<_, String>(
        "SELECT status FROM validation_items WHERE submission_id = $1",
    )
    .bind(submission_id)
    .fetch_all(&mut *conn)
    .await?;

    let statuses: Vec<ValidationStatus> = raw.iter().filter_map(|s| s.parse().ok()).collect();
    let status = ValidationStatus::rollup(&statuses);

    sqlx::query(
        "UPDATE submissions SET validation_status = $2, updated_at = NOW() WHERE id = $1",
    )
    .bind(submission_id)
    .bind(status.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(status)
}

/// Creates validation items for a submission's products and recomputes its
/// validation status.
///
/// Products below the threshold get pending review items first. Products
/// that cleared it are approved only when no item of the submission is
/// pending or rejected, so a submission with anything under review holds
/// them until the operator decisions are in.
///
/// Idempotent per product: products that already have an item are skipped,
/// so calling this again after the review releases the held products.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the submission does not exist, or
/// [`DbError::Sqlx`] if a statement fails; nothing is written in that case.
pub async fn route_products(
    pool: &PgPool,
    submission_id: i64,
    items: &[NewValidationItem],
) -> Result<RoutedItems, DbError> {
    let mut tx = pool.begin().await?;
    lock_submission(&mut *tx, submission_id).await?;

    let (auto, review): (Vec<&NewValidationItem>, Vec<&NewValidationItem>) =
        items.iter().partition(|item| item.auto_approved);

    let mut inserted = Vec::new();
    for item in review {
        inserted.extend(insert_item(&mut *tx, submission_id, item).await?);
    }

    let blocked = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM validation_items \
                        WHERE submission_id = $1 AND status <> 'approved')",
    )
    .bind(submission_id)
    .fetch_one(&mut *tx)
    .await?;

    let held = if blocked {
        auto.len()
    } else {
        for item in auto {
            inserted.extend(insert_item(&mut *tx, submission_id, item).await?);
        }
        0
    };

    let submission_status = recompute_submission_status(&mut *tx, submission_id).await?;
    tx.commit().await?;

    Ok(RoutedItems {
        inserted,
        held,
        submission_status,
    })
}

async fn insert_item(
    conn: &mut PgConnection,
    submission_id: i64,
    item: &NewValidationItem,
) -> Result<Option<ValidationItemRow>, DbError> {
    let sql = format!(
        "INSERT INTO validation_items \
           (extracted_product_id, submission_id, supplier_id, supplier_name, supplier_phone, \
            content_type, product_snapshot, confidence, priority, priority_rank, status, \
            decided_by, decided_at, submitted_at) \
         SELECT $2, s.id, s.supplier_id, s.supplier_name, s.supplier_phone, s.content_type, \
                $3, $4, $5, $6, \
                CASE WHEN $7 THEN 'approved' ELSE 'pending' END, \
                CASE WHEN $7 THEN 'auto' END, \
                CASE WHEN $7 THEN NOW() END, \
                s.created_at \
         FROM submissions s WHERE s.id = $1 \
         ON CONFLICT (extracted_product_id) DO NOTHING \
         RETURNING {ITEM_COLUMNS}"
    );
    let row = sqlx::query_as::<_, ValidationItemRow>(&sql)
        .bind(submission_id)
        .bind(item.extracted_product_id)
        .bind(&item.product_snapshot)
        .bind(item.confidence)
        .bind(item.priority.as_str())
        .bind(item.priority.rank())
        .bind(item.auto_approved)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row)
}

/// Applies an operator decision to a `pending` item.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] for an unknown id,
/// [`DbError::AlreadyDecided`] when the item is no longer pending (nothing
/// is changed), or [`DbError::Sqlx`] if a statement fails.
pub async fn decide_validation_item(
    pool: &PgPool,
    id: i64,
    decision: Decision<'_>,
) -> Result<DecisionOutcome, DbError> {
    let mut tx = pool.begin().await?;

    let submission_id =
        sqlx::query_scalar::<_, i64>("SELECT submission_id FROM validation_items WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(DbError::NotFound)?;

    lock_submission(&mut *tx, submission_id).await?;

    let (status, notes, reasons, comment) = match decision {
        Decision::Approve { notes } => ("approved", notes, Vec::new(), None),
        Decision::Reject { feedback, notes } => (
            "rejected",
            notes,
            feedback
                .reasons
                .iter()
                .map(|r| r.as_str().to_string())
                .collect::<Vec<String>>(),
            feedback.comment.as_deref(),
        ),
    };

    let sql = format!(
        "UPDATE validation_items \
         SET status = $2, decided_by = 'operator', decided_at = NOW(), \
             notes = COALESCE($3, notes), feedback_reasons = $4, feedback_comment = $5, \
             updated_at = NOW() \
         WHERE id = $1 AND status = 'pending' \
         RETURNING {ITEM_COLUMNS}"
    );
    let updated = sqlx::query_as::<_, ValidationItemRow>(&sql)
        .bind(id)
        .bind(status)
        .bind(notes)
        .bind(&reasons)
        .bind(comment)
        .fetch_optional(&mut *tx)
        .await?;

    let Some(item) = updated else {
        let current =
            sqlx::query_scalar::<_, String>("SELECT status FROM validation_items WHERE id = $1")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
        tx.rollback().await?;
        return Err(DbError::AlreadyDecided {
            id,
            status: current,
        });
    };

    let submission_status = recompute_submission_status(&mut *tx, submission_id).await?;
    tx.commit().await?;

    Ok(DecisionOutcome {
        item,
        submission_status,
    })
}

/// Fetches an item by `id`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists, or [`DbError::Sqlx`] if the query fails.
pub async fn get_validation_item(pool: &PgPool, id: i64) -> Result<ValidationItemRow, DbError> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM validation_items WHERE id = $1");
    sqlx::query_as::<_, ValidationItemRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// All items of a submission, in product order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_items_for_submission(
    pool: &PgPool,
    submission_id: i64,
) -> Result<Vec<ValidationItemRow>, DbError> {
    let sql = format!(
        "SELECT {ITEM_COLUMNS} FROM validation_items \
         WHERE submission_id = $1 ORDER BY extracted_product_id"
    );
    let rows = sqlx::query_as::<_, ValidationItemRow>(&sql)
        .bind(submission_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// One page of the pending review queue and the total number of matches.
///
/// Ordered by priority (high first), then confidence ascending, then
/// submission time, then id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if a query fails.
pub async fn list_pending_items(
    pool: &PgPool,
    query: &PendingItemsQuery<'_>,
) -> Result<(Vec<ValidationItemRow>, i64), DbError> {
    let sql = format!(
        "SELECT {ITEM_COLUMNS} FROM validation_items \
         WHERE {PENDING_FILTER} \
         ORDER BY priority_rank DESC, confidence ASC, submitted_at ASC, id ASC \
         LIMIT $7 OFFSET $8"
    );
    let rows = sqlx::query_as::<_, ValidationItemRow>(&sql)
        .bind(query.below_confidence)
        .bind(query.supplier_id)
        .bind(query.content_type.map(ContentType::as_str))
        .bind(query.priority.map(Priority::as_str))
        .bind(query.min_confidence)
        .bind(query.max_confidence)
        .bind(query.limit)
        .bind(query.offset)
        .fetch_all(pool)
        .await?;

    let count_sql = format!("SELECT COUNT(*) FROM validation_items WHERE {PENDING_FILTER}");
    let total = sqlx::query_scalar::<_, i64>(&count_sql)
        .bind(query.below_confidence)
        .bind(query.supplier_id)
        .bind(query.content_type.map(ContentType::as_str))
        .bind(query.priority.map(Priority::as_str))
        .bind(query.min_confidence)
        .bind(query.max_confidence)
        .fetch_one(pool)
        .await?;

    Ok((rows, total))
}
