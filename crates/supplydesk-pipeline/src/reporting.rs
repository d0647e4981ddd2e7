//! Dashboard aggregates.
//!
//! Every report is assembled from independent queries. A failing query is
//! logged and contributes zeros, so a report is always returned.

use std::collections::BTreeMap;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;
use supplydesk_core::performance::approval_rate;
use supplydesk_core::{
    evaluate_alerts, subsystem_health, Alert, AlertInputs, HealthStatus, SubsystemActivity,
};
use supplydesk_db::{DbError, HealthCountsRow};
use uuid::Uuid;

use crate::context::PipelineContext;
use crate::error::PipelineError;

pub const MAX_TREND_DAYS: i32 = 90;
const MAX_ACTIVITY_ITEMS: i64 = 100;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardStats {
    pub submissions: SubmissionFunnel,
    pub validation: ValidationFunnel,
    pub review_items: ReviewItemCounts,
    /// Share of decided review items that were approved.
    pub approval_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubmissionFunnel {
    pub total: i64,
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationFunnel {
    pub pending: i64,
    pub approved: i64,
    pub rejected: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReviewItemCounts {
    pub pending: i64,
    pub approved: i64,
    pub rejected: i64,
    pub auto_approved: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfidenceDistribution {
    pub high: i64,
    pub medium: i64,
    pub low: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AiMetrics {
    pub total_extractions: i64,
    pub successful_extractions: i64,
    pub failed_extractions: i64,
    pub success_rate: f64,
    pub average_processing_ms: Option<f64>,
    pub products_extracted: i64,
    pub average_confidence: Option<f64>,
    pub models: Vec<ModelUsage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelUsage {
    pub model: String,
    pub products: i64,
    pub average_confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub submissions: i64,
    pub approved: i64,
    pub rejected: i64,
    pub average_confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityEvent {
    pub kind: String,
    pub submission_id: Uuid,
    pub supplier_name: Option<String>,
    pub supplier_phone: String,
    pub detail: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SubsystemHealth {
    pub status: HealthStatus,
    pub attempts_24h: i64,
    pub failures: i64,
    pub permanently_failed: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemHealth {
    /// Worst status across the database and every subsystem.
    pub status: HealthStatus,
    pub database: HealthStatus,
    pub subsystems: BTreeMap<&'static str, SubsystemHealth>,
    pub validation_backlog: i64,
    pub uptime_seconds: i64,
    pub submissions_last_hour: i64,
    pub submissions_last_24h: i64,
}

fn tolerant<T: Default>(query: &'static str, result: Result<T, DbError>) -> T {
    result.unwrap_or_else(|e| {
        tracing::warn!(query, error = %e, "report query failed; using defaults");
        T::default()
    })
}

/// Submission and review funnels.
pub async fn dashboard_stats(ctx: &PipelineContext) -> DashboardStats {
    let counts = tolerant("pipeline_counts", supplydesk_db::pipeline_counts(&ctx.pool).await);
    DashboardStats {
        submissions: SubmissionFunnel {
            total: counts.total_submissions,
            pending: counts.pending,
            processing: counts.processing,
            completed: counts.completed,
            failed: counts.failed,
        },
        validation: ValidationFunnel {
            pending: counts.validation_pending,
            approved: counts.validation_approved,
            rejected: counts.validation_rejected,
        },
        review_items: ReviewItemCounts {
            pending: counts.items_pending,
            approved: counts.items_approved,
            rejected: counts.items_rejected,
            auto_approved: counts.items_auto_approved,
        },
        approval_rate: approval_rate(counts.items_approved, counts.items_rejected),
    }
}

pub async fn confidence_distribution(ctx: &PipelineContext) -> ConfidenceDistribution {
    let row = tolerant(
        "confidence_distribution",
        supplydesk_db::confidence_distribution(&ctx.pool).await,
    );
    ConfidenceDistribution {
        high: row.high,
        medium: row.medium,
        low: row.low,
    }
}

/// Extraction volume, outcome and model usage, optionally since a point in time.
pub async fn ai_metrics(ctx: &PipelineContext, since: Option<DateTime<Utc>>) -> AiMetrics {
    let row = tolerant("ai_metrics", supplydesk_db::ai_metrics(&ctx.pool, since).await);
    let models = tolerant("model_usage", supplydesk_db::model_usage(&ctx.pool, since).await);

    AiMetrics {
        total_extractions: row.total_extractions,
        successful_extractions: row.successful_extractions,
        failed_extractions: row.failed_extractions,
        success_rate: approval_rate(row.successful_extractions, row.failed_extractions),
        average_processing_ms: row.average_processing_ms,
        products_extracted: row.products_extracted,
        average_confidence: row.average_confidence,
        models: models
            .into_iter()
            .map(|m| ModelUsage {
                model: m.model,
                products: m.products,
                average_confidence: m.average_confidence,
            })
            .collect(),
    }
}

/// Daily buckets for the last `days` days, oldest first, quiet days as zeros.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidRequest`] unless `days` is within 1–90.
pub async fn validation_trends(ctx: &PipelineContext, days: i32) -> Result<Vec<TrendPoint>, PipelineError> {
    if !(1..=MAX_TREND_DAYS).contains(&days) {
        return Err(PipelineError::InvalidRequest(format!(
            "days must be between 1 and {MAX_TREND_DAYS}, got {days}"
        )));
    }

    match supplydesk_db::validation_trends(&ctx.pool, days).await {
        Ok(rows) => Ok(rows
            .into_iter()
            .map(|row| TrendPoint {
                date: row.day,
                submissions: row.submissions,
                approved: row.approved,
                rejected: row.rejected,
                average_confidence: row.average_confidence,
            })
            .collect()),
        Err(e) => {
            tracing::warn!(query = "validation_trends", error = %e, "report query failed; using defaults");
            Ok(zero_filled_trend(Utc::now().date_naive(), days))
        }
    }
}

fn zero_filled_trend(today: NaiveDate, days: i32) -> Vec<TrendPoint> {
    let days = u64::try_from(days.max(1)).unwrap_or(1);
    (0..days)
        .rev()
        .filter_map(|back| today.checked_sub_days(Days::new(back)))
        .map(|date| TrendPoint {
            date,
            submissions: 0,
            approved: 0,
            rejected: 0,
            average_confidence: None,
        })
        .collect()
}

/// Latest submission and decision events, newest first.
pub async fn recent_activity(ctx: &PipelineContext, limit: i64) -> Vec<ActivityEvent> {
    let limit = limit.clamp(1, MAX_ACTIVITY_ITEMS);
    tolerant(
        "recent_activity",
        supplydesk_db::recent_activity(&ctx.pool, limit).await,
    )
    .into_iter()
    .map(|row| ActivityEvent {
        kind: row.kind,
        submission_id: row.submission_id,
        supplier_name: row.supplier_name,
        supplier_phone: row.supplier_phone,
        detail: row.detail,
        occurred_at: row.occurred_at,
    })
    .collect()
}

fn subsystems(counts: &HealthCountsRow, ctx: &PipelineContext) -> BTreeMap<&'static str, SubsystemHealth> {
    let policy = &ctx.policy.alerts;
    [
        (
            "webhook",
            SubsystemActivity {
                attempts: counts.submissions_last_24h,
                failures: counts.webhook_failures,
                permanently_failed: counts.webhook_permanent,
            },
        ),
        (
            "extraction",
            SubsystemActivity {
                attempts: counts.extraction_attempts_24h,
                failures: counts.extraction_failures_24h,
                permanently_failed: counts.extraction_permanent,
            },
        ),
        (
            "validation",
            SubsystemActivity {
                attempts: counts.items_created_24h,
                failures: counts.validation_failures,
                permanently_failed: counts.validation_permanent,
            },
        ),
        (
            "inventory",
            SubsystemActivity {
                attempts: counts.approvals_24h,
                failures: counts.inventory_failures,
                permanently_failed: counts.inventory_permanent,
            },
        ),
    ]
    .into_iter()
    .map(|(name, activity)| {
        (
            name,
            SubsystemHealth {
                status: subsystem_health(activity, policy),
                attempts_24h: activity.attempts,
                failures: activity.failures,
                permanently_failed: activity.permanently_failed,
            },
        )
    })
    .collect()
}

/// Per-subsystem health, uptime and throughput.
pub async fn system_health(ctx: &PipelineContext) -> SystemHealth {
    let database = match supplydesk_db::health_check(&ctx.pool).await {
        Ok(()) => HealthStatus::Healthy,
        Err(e) => {
            tracing::error!(error = %e, "database health check failed");
            HealthStatus::Critical
        }
    };
    let counts = tolerant("health_counts", supplydesk_db::health_counts(&ctx.pool).await);
    let subsystems = subsystems(&counts, ctx);

    let status = subsystems
        .values()
        .map(|s| s.status)
        .chain(std::iter::once(database))
        .max()
        .unwrap_or(HealthStatus::Healthy);

    SystemHealth {
        status,
        database,
        subsystems,
        validation_backlog: counts.validation_backlog,
        uptime_seconds: (Utc::now() - ctx.started_at).num_seconds().max(0),
        submissions_last_hour: counts.submissions_last_hour,
        submissions_last_24h: counts.submissions_last_24h,
    }
}

/// Active alerts, most severe first.
pub async fn system_alerts(ctx: &PipelineContext) -> Vec<Alert> {
    let policy = &ctx.policy.alerts;
    let counts = tolerant(
        "alert_counts",
        supplydesk_db::alert_counts(
            &ctx.pool,
            policy.pending_warning_minutes,
            policy.pending_critical_minutes,
        )
        .await,
    );
    evaluate_alerts(
        &AlertInputs {
            permanently_failed: counts.permanently_failed,
            pending_over_warning: counts.pending_over_warning,
            pending_over_critical: counts.pending_over_critical,
            validation_backlog: counts.validation_backlog,
            extraction_attempts_24h: counts.extraction_attempts_24h,
            extraction_failures_24h: counts.extraction_failures_24h,
        },
        policy,
    )
}
