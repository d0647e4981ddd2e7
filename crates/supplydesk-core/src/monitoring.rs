//! Threshold rules behind the health endpoint and the system-alerts feed.

use serde::Serialize;

use crate::policy::AlertPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        })
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Critical => "critical",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub code: &'static str,
    pub severity: Severity,
    pub message: String,
    pub value: f64,
}

/// Counters the alert rules are evaluated against.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AlertInputs {
    pub permanently_failed: i64,
    pub pending_over_warning: i64,
    pub pending_over_critical: i64,
    pub validation_backlog: i64,
    pub extraction_attempts_24h: i64,
    pub extraction_failures_24h: i64,
}

/// Recent activity of one pipeline subsystem.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SubsystemActivity {
    pub attempts: i64,
    pub failures: i64,
    pub permanently_failed: i64,
}

#[must_use]
pub fn failure_ratio(failures: i64, attempts: i64) -> f64 {
    if attempts <= 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let ratio = failures.max(0) as f64 / attempts as f64;
    ratio.min(1.0)
}

#[allow(clippy::cast_precision_loss)]
fn count_value(count: i64) -> f64 {
    count as f64
}

/// Health of one subsystem.
///
/// Critical when half or more of recent attempts failed or anything is
/// permanently failed; degraded when the failure ratio exceeds the alert
/// threshold; healthy otherwise (including no recent activity).
#[must_use]
pub fn subsystem_health(activity: SubsystemActivity, policy: &AlertPolicy) -> HealthStatus {
    let ratio = failure_ratio(activity.failures, activity.attempts);
    if activity.permanently_failed > 0 || (activity.attempts > 0 && ratio >= 0.5) {
        HealthStatus::Critical
    } else if ratio > policy.extraction_failure_rate_warning {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

/// Evaluates every alert rule, most severe first.
#[must_use]
pub fn evaluate_alerts(inputs: &AlertInputs, policy: &AlertPolicy) -> Vec<Alert> {
    let mut alerts = Vec::new();

    if inputs.permanently_failed > policy.max_permanently_failed {
        alerts.push(Alert {
            code: "permanently_failed_operations",
            severity: Severity::Critical,
            message: format!(
                "{} operation(s) exhausted their retry budget and need manual attention",
                inputs.permanently_failed
            ),
            value: count_value(inputs.permanently_failed),
        });
    }

    if inputs.pending_over_critical > 0 {
        alerts.push(Alert {
            code: "submissions_pending_too_long",
            severity: Severity::Critical,
            message: format!(
                "{} submission(s) pending for more than {} minutes",
                inputs.pending_over_critical, policy.pending_critical_minutes
            ),
            value: count_value(inputs.pending_over_critical),
        });
    } else if inputs.pending_over_warning > 0 {
        alerts.push(Alert {
            code: "submissions_pending_too_long",
            severity: Severity::Warning,
            message: format!(
                "{} submission(s) pending for more than {} minutes",
                inputs.pending_over_warning, policy.pending_warning_minutes
            ),
            value: count_value(inputs.pending_over_warning),
        });
    }

    if inputs.validation_backlog > policy.validation_backlog_warning {
        alerts.push(Alert {
            code: "validation_backlog",
            severity: Severity::Warning,
            message: format!(
                "{} product(s) waiting for review",
                inputs.validation_backlog
            ),
            value: count_value(inputs.validation_backlog),
        });
    }

    let ratio = failure_ratio(
        inputs.extraction_failures_24h,
        inputs.extraction_attempts_24h,
    );
    if ratio > policy.extraction_failure_rate_warning {
        alerts.push(Alert {
            code: "extraction_failure_rate",
            severity: Severity::Warning,
            message: format!(
                "{:.0}% of extraction attempts failed in the last 24 hours",
                ratio * 100.0
            ),
            value: ratio,
        });
    }

    alerts.sort_by(|a, b| b.severity.cmp(&a.severity));
    alerts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_system_raises_nothing() {
        assert!(evaluate_alerts(&AlertInputs::default(), &AlertPolicy::default()).is_empty());
    }

    #[test]
    fn permanently_failed_above_limit_is_critical() {
        let inputs = AlertInputs {
            permanently_failed: 1,
            ..AlertInputs::default()
        };
        let alerts = evaluate_alerts(&inputs, &AlertPolicy::default());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].code, "permanently_failed_operations");
        assert_eq!(alerts[0].severity, Severity::Critical);
    }

    #[test]
    fn permanently_failed_within_limit_is_silent() {
        let policy = AlertPolicy {
            max_permanently_failed: 5,
            ..AlertPolicy::default()
        };
        let inputs = AlertInputs {
            permanently_failed: 5,
            ..AlertInputs::default()
        };
        assert!(evaluate_alerts(&inputs, &policy).is_empty());
    }

    #[test]
    fn long_pending_escalates_to_critical() {
        let inputs = AlertInputs {
            pending_over_warning: 4,
            pending_over_critical: 2,
            ..AlertInputs::default()
        };
        let alerts = evaluate_alerts(&inputs, &AlertPolicy::default());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Critical);
    }

    #[test]
    fn alerts_are_sorted_most_severe_first() {
        let inputs = AlertInputs {
            permanently_failed: 2,
            validation_backlog: 500,
            extraction_attempts_24h: 10,
            extraction_failures_24h: 5,
            ..AlertInputs::default()
        };
        let alerts = evaluate_alerts(&inputs, &AlertPolicy::default());
        assert_eq!(alerts.len(), 3);
        assert_eq!(alerts[0].severity, Severity::Critical);
        assert!(alerts[1..].iter().all(|a| a.severity == Severity::Warning));
    }

    #[test]
    fn failure_ratio_handles_zero_attempts() {
        assert!(failure_ratio(3, 0).abs() < f64::EPSILON);
    }

    #[test]
    fn display_matches_serialized_names() {
        assert_eq!(Severity::Warning.to_string(), "warning");
        assert_eq!(format!("{:<9}|", HealthStatus::Degraded), "degraded |");
    }

    #[test]
    fn subsystem_health_levels() {
        let policy = AlertPolicy::default();
        let idle = SubsystemActivity::default();
        assert_eq!(subsystem_health(idle, &policy), HealthStatus::Healthy);

        let flaky = SubsystemActivity {
            attempts: 10,
            failures: 3,
            permanently_failed: 0,
        };
        assert_eq!(subsystem_health(flaky, &policy), HealthStatus::Degraded);

        let broken = SubsystemActivity {
            attempts: 10,
            failures: 6,
            permanently_failed: 0,
        };
        assert_eq!(subsystem_health(broken, &policy), HealthStatus::Critical);

        let stuck = SubsystemActivity {
            attempts: 0,
            failures: 0,
            permanently_failed: 1,
        };
        assert_eq!(subsystem_health(stuck, &policy), HealthStatus::Critical);
    }
}
