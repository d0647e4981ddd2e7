//! Database operations for `extracted_products`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::PgPool;

use crate::DbError;

const PRODUCT_COLUMNS: &str = "id, submission_id, extraction_attempt, position, name, brand, \
     category, condition, grade, price, currency, quantity, specifications, field_confidence, \
     confidence, model, processing_time_ms, fields_extracted, catalog_product_id, \
     inventory_synced_at, created_at";

/// A row from the `extracted_products` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ExtractedProductRow {
    pub id: i64,
    pub submission_id: i64,
    pub extraction_attempt: i32,
    pub position: i32,
    pub name: String,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub condition: Option<String>,
    pub grade: Option<String>,
    pub price: Option<Decimal>,
    pub currency: Option<String>,
    pub quantity: Option<i32>,
    pub specifications: Value,
    pub field_confidence: Value,
    pub confidence: f64,
    pub model: String,
    pub processing_time_ms: i64,
    pub fields_extracted: Vec<String>,
    pub catalog_product_id: Option<String>,
    pub inventory_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Product ready to be stored for one extraction attempt.
#[derive(Debug, Clone)]
pub struct NewExtractedProduct {
    pub name: String,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub condition: Option<String>,
    pub grade: Option<String>,
    pub price: Option<Decimal>,
    pub currency: Option<String>,
    pub quantity: Option<i32>,
    pub specifications: Value,
    pub field_confidence: Value,
    pub confidence: f64,
    pub model: String,
    pub processing_time_ms: i64,
    pub fields_extracted: Vec<String>,
}

/// Stores the products of an extraction attempt and completes the submission.
///
/// Runs in one transaction guarded by `extraction_attempt = attempt AND
/// processing_status = 'processing'`. When the guard no longer holds (the
/// attempt was failed as stale, or reprocessing started a newer attempt)
/// nothing is written and `None` is returned.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any statement fails; the transaction is
/// rolled back.
pub async fn persist_extraction(
    pool: &PgPool,
    submission_id: i64,
    attempt: i32,
    products: &[NewExtractedProduct],
    overall_confidence: f64,
    transcription: Option<&str>,
) -> Result<Option<Vec<ExtractedProductRow>>, DbError> {
    let mut tx = pool.begin().await?;

    let completed = sqlx::query(
        "UPDATE submissions \
         SET processing_status = 'completed', overall_confidence = $3, \
             content = COALESCE(content, $4), last_error = NULL, \
             processed_at = NOW(), updated_at = NOW() \
         WHERE id = $1 AND extraction_attempt = $2 AND processing_status = 'processing'",
    )
    .bind(submission_id)
    .bind(attempt)
    .bind(overall_confidence)
    .bind(transcription)
    .execute(&mut *tx)
    .await?;

    if completed.rows_affected() == 0 {
        tx.rollback().await?;
        return Ok(None);
    }

    let sql = format!(
        "INSERT INTO extracted_products \
           (submission_id, extraction_attempt, position, name, brand, category, condition, \
            grade, price, currency, quantity, specifications, field_confidence, confidence, \
            model, processing_time_ms, fields_extracted) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17) \
         RETURNING {PRODUCT_COLUMNS}"
    );

    let mut rows = Vec::with_capacity(products.len());
    for (position, product) in products.iter().enumerate() {
        let position = i32::try_from(position).unwrap_or(i32::MAX);
        let row = sqlx::query_as::<_, ExtractedProductRow>(&sql)
            .bind(submission_id)
            .bind(attempt)
            .bind(position)
            .bind(&product.name)
            .bind(&product.brand)
            .bind(&product.category)
            .bind(&product.condition)
            .bind(&product.grade)
            .bind(product.price)
            .bind(&product.currency)
            .bind(product.quantity)
            .bind(&product.specifications)
            .bind(&product.field_confidence)
            .bind(product.confidence)
            .bind(&product.model)
            .bind(product.processing_time_ms)
            .bind(&product.fields_extracted)
            .fetch_one(&mut *tx)
            .await?;
        rows.push(row);
    }

    tx.commit().await?;
    Ok(Some(rows))
}

/// Fetches a product by its `id`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists, or [`DbError::Sqlx`] if the query fails.
pub async fn get_extracted_product(pool: &PgPool, id: i64) -> Result<ExtractedProductRow, DbError> {
    let sql = format!("SELECT {PRODUCT_COLUMNS} FROM extracted_products WHERE id = $1");
    sqlx::query_as::<_, ExtractedProductRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// Products of a submission in extraction order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_products_for_submission(
    pool: &PgPool,
    submission_id: i64,
) -> Result<Vec<ExtractedProductRow>, DbError> {
    let sql = format!(
        "SELECT {PRODUCT_COLUMNS} FROM extracted_products \
         WHERE submission_id = $1 \
         ORDER BY extraction_attempt, position"
    );
    let rows = sqlx::query_as::<_, ExtractedProductRow>(&sql)
        .bind(submission_id)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Stores the catalog id returned by a successful inventory sync.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the product does not exist, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn mark_inventory_synced(
    pool: &PgPool,
    id: i64,
    catalog_product_id: &str,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE extracted_products \
         SET catalog_product_id = $2, inventory_synced_at = NOW() \
         WHERE id = $1",
    )
    .bind(id)
    .bind(catalog_product_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}
