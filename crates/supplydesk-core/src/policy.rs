//! Tunable pipeline policy: auto-approve threshold, review priority,
//! retry backoff, supplier tiers, and alert limits.
//!
//! Policy is loaded from a YAML file (see `config/pipeline.yaml`). Every
//! section and field is optional; missing values fall back to the defaults
//! documented on each field.

use std::path::Path;

use chrono::TimeDelta;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::status::{Priority, SupplierTier};
use crate::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelinePolicy {
    pub validation: ValidationPolicy,
    pub recovery: RecoveryPolicy,
    pub performance: PerformancePolicy,
    pub alerts: AlertPolicy,
}

/// Routing rules applied to freshly extracted products.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidationPolicy {
    /// Products at or above this confidence (0–100) skip human review. Default `80`.
    pub auto_approve_threshold: f64,
    /// Below this confidence an item is high priority. Default `50`.
    pub high_priority_below: f64,
    /// Below this confidence an item is at least medium priority. Default `70`.
    pub medium_priority_below: f64,
    /// Offer value (`price × quantity`) at or above which an item is high priority. Default `5000`.
    pub high_value_amount: f64,
    /// Offer value at or above which an item is at least medium priority. Default `1000`.
    pub medium_value_amount: f64,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            auto_approve_threshold: 80.0,
            high_priority_below: 50.0,
            medium_priority_below: 70.0,
            high_value_amount: 5_000.0,
            medium_value_amount: 1_000.0,
        }
    }
}

impl ValidationPolicy {
    #[must_use]
    pub fn auto_approves(&self, confidence: f64) -> bool {
        confidence >= self.auto_approve_threshold
    }

    /// Derives review priority from confidence and offer value.
    ///
    /// The more urgent of the confidence-derived and value-derived
    /// priorities wins. A missing price contributes nothing.
    #[must_use]
    pub fn priority(&self, confidence: f64, offer_value: Option<Decimal>) -> Priority {
        let by_confidence = if confidence < self.high_priority_below {
            Priority::High
        } else if confidence < self.medium_priority_below {
            Priority::Medium
        } else {
            Priority::Low
        };

        let value = offer_value.and_then(|v| v.to_f64()).unwrap_or(0.0);
        let by_value = if value >= self.high_value_amount {
            Priority::High
        } else if value >= self.medium_value_amount {
            Priority::Medium
        } else {
            Priority::Low
        };

        by_confidence.max(by_value)
    }
}

/// Retry budget and backoff schedule for failed operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecoveryPolicy {
    /// Automatic attempts before an operation is permanently failed. Default `3`.
    pub max_retries: i32,
    /// First delay in seconds; doubles per retry. Default `30`.
    pub backoff_base_secs: u64,
    /// Upper bound on any single delay in seconds. Default `3600`.
    pub backoff_cap_secs: u64,
    /// Operations claimed per scheduler sweep. Default `25`.
    pub sweep_batch_size: i64,
    /// Minutes a submission may sit in `processing` before it is failed as stale. Default `15`.
    pub stale_processing_minutes: i64,
    /// Seconds a `pending` submission may wait before the dispatch sweep re-queues it. Default `120`.
    pub pending_dispatch_after_secs: i64,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_secs: 30,
            backoff_cap_secs: 3_600,
            sweep_batch_size: 25,
            stale_processing_minutes: 15,
            pending_dispatch_after_secs: 120,
        }
    }
}

impl RecoveryPolicy {
    /// Delay before the next attempt given how many retries already ran.
    ///
    /// `min(base × 2^retry_count, cap)`; non-decreasing in `retry_count`.
    #[must_use]
    pub fn backoff(&self, retry_count: i32) -> TimeDelta {
        let exponent = u32::try_from(retry_count.max(0)).unwrap_or(0).min(32);
        let secs = self
            .backoff_base_secs
            .saturating_mul(1u64 << exponent)
            .min(self.backoff_cap_secs);
        TimeDelta::seconds(i64::try_from(secs).unwrap_or(i64::MAX / 1_000))
    }
}

/// Approval-rate cutoffs for supplier tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PerformancePolicy {
    /// Minimum approval rate (0–1) for `excellent`. Default `0.90`.
    pub excellent_min_rate: f64,
    /// Minimum approval rate (0–1) for `good`. Default `0.70`.
    pub good_min_rate: f64,
}

impl Default for PerformancePolicy {
    fn default() -> Self {
        Self {
            excellent_min_rate: 0.90,
            good_min_rate: 0.70,
        }
    }
}

impl PerformancePolicy {
    #[must_use]
    pub fn tier(&self, approval_rate: f64) -> SupplierTier {
        if approval_rate >= self.excellent_min_rate {
            SupplierTier::Excellent
        } else if approval_rate >= self.good_min_rate {
            SupplierTier::Good
        } else {
            SupplierTier::NeedsImprovement
        }
    }
}

/// Thresholds for the system-alerts feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AlertPolicy {
    /// More than this many permanently failed operations raises a critical alert. Default `0`.
    pub max_permanently_failed: i64,
    /// Submissions pending longer than this raise a warning. Default `60`.
    pub pending_warning_minutes: i64,
    /// Submissions pending longer than this raise a critical alert. Default `240`.
    pub pending_critical_minutes: i64,
    /// Pending validation items above this count raise a warning. Default `100`.
    pub validation_backlog_warning: i64,
    /// Extraction failure ratio (0–1) over the last 24 h above this raises a warning. Default `0.25`.
    pub extraction_failure_rate_warning: f64,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            max_permanently_failed: 0,
            pending_warning_minutes: 60,
            pending_critical_minutes: 240,
            validation_backlog_warning: 100,
            extraction_failure_rate_warning: 0.25,
        }
    }
}

/// Load and validate the pipeline policy from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_policy(path: &Path) -> Result<PipelinePolicy, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::PolicyFileIo {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_policy(&content)
}

/// Like [`load_policy`], but a missing file yields the built-in defaults.
///
/// # Errors
///
/// Returns `ConfigError` if an existing file cannot be read, parsed, or
/// fails validation.
pub fn load_policy_or_default(path: &Path) -> Result<PipelinePolicy, ConfigError> {
    match load_policy(path) {
        Err(ConfigError::PolicyFileIo { source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            Ok(PipelinePolicy::default())
        }
        other => other,
    }
}

/// Parse and validate policy YAML.
///
/// # Errors
///
/// Returns `ConfigError::PolicyFileParse` for malformed YAML and
/// `ConfigError::Validation` for out-of-range values.
pub fn parse_policy(content: &str) -> Result<PipelinePolicy, ConfigError> {
    let policy: PipelinePolicy =
        serde_yaml::from_str(content).map_err(ConfigError::PolicyFileParse)?;
    validate_policy(&policy)?;
    Ok(policy)
}

fn validate_policy(policy: &PipelinePolicy) -> Result<(), ConfigError> {
    let v = &policy.validation;
    if !(0.0..=100.0).contains(&v.auto_approve_threshold) {
        return Err(ConfigError::Validation(format!(
            "validation.auto_approve_threshold must be within 0-100, got {}",
            v.auto_approve_threshold
        )));
    }
    if v.high_priority_below > v.medium_priority_below {
        return Err(ConfigError::Validation(
            "validation.high_priority_below must not exceed medium_priority_below".to_string(),
        ));
    }
    if v.medium_value_amount > v.high_value_amount {
        return Err(ConfigError::Validation(
            "validation.medium_value_amount must not exceed high_value_amount".to_string(),
        ));
    }

    let r = &policy.recovery;
    if r.max_retries < 1 {
        return Err(ConfigError::Validation(format!(
            "recovery.max_retries must be at least 1, got {}",
            r.max_retries
        )));
    }
    if r.backoff_base_secs == 0 || r.backoff_cap_secs < r.backoff_base_secs {
        return Err(ConfigError::Validation(
            "recovery.backoff_base_secs must be positive and not exceed backoff_cap_secs"
                .to_string(),
        ));
    }
    if r.sweep_batch_size < 1 {
        return Err(ConfigError::Validation(
            "recovery.sweep_batch_size must be at least 1".to_string(),
        ));
    }

    let p = &policy.performance;
    if !(0.0..=1.0).contains(&p.good_min_rate)
        || !(0.0..=1.0).contains(&p.excellent_min_rate)
        || p.good_min_rate > p.excellent_min_rate
    {
        return Err(ConfigError::Validation(
            "performance rates must be within 0-1 with good_min_rate <= excellent_min_rate"
                .to_string(),
        ));
    }

    let a = &policy.alerts;
    if a.pending_warning_minutes > a.pending_critical_minutes {
        return Err(ConfigError::Validation(
            "alerts.pending_warning_minutes must not exceed pending_critical_minutes".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
#[path = "policy_test.rs"]
mod tests;
