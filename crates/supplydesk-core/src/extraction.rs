//! Candidate products produced by AI extraction and the confidence maths
//! applied to them.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::policy::ValidationPolicy;
use crate::status::{Priority, ProductCondition};
use crate::CoreError;

/// Structured fields that carry a confidence score.
pub const STRUCTURED_FIELDS: &[&str] = &[
    "name",
    "brand",
    "category",
    "condition",
    "grade",
    "price",
    "currency",
    "quantity",
    "specifications",
];

/// One product the extraction service found in a supplier message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductCandidate {
    pub name: String,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub condition: Option<ProductCondition>,
    /// Cosmetic grade, only meaningful for refurbished stock (e.g. `"A"`).
    pub grade: Option<String>,
    pub price: Option<Decimal>,
    /// ISO 4217 code, e.g. `"EUR"`.
    pub currency: Option<String>,
    pub quantity: Option<i32>,
    #[serde(default)]
    pub specifications: BTreeMap<String, String>,
    /// Field name → confidence (0–100) as reported by the model.
    #[serde(default)]
    pub field_confidence: BTreeMap<String, f64>,
}

impl ProductCandidate {
    /// Rejects candidates whose values cannot be stored as a product offer.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidCandidate`] describing the first problem found.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.trim().is_empty() {
            return Err(CoreError::InvalidCandidate("name is empty".to_string()));
        }
        if self.price.is_some_and(|p| p.is_sign_negative()) {
            return Err(CoreError::InvalidCandidate(format!(
                "price is negative for '{}'",
                self.name
            )));
        }
        if self.quantity.is_some_and(|q| q < 0) {
            return Err(CoreError::InvalidCandidate(format!(
                "quantity is negative for '{}'",
                self.name
            )));
        }
        if let Some(currency) = &self.currency {
            if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
                return Err(CoreError::InvalidCandidate(format!(
                    "currency '{currency}' is not an ISO 4217 code"
                )));
            }
        }
        Ok(())
    }

    /// Structured fields that hold a value.
    #[must_use]
    pub fn populated_fields(&self) -> Vec<&'static str> {
        STRUCTURED_FIELDS
            .iter()
            .copied()
            .filter(|field| match *field {
                "name" => !self.name.trim().is_empty(),
                "brand" => self.brand.is_some(),
                "category" => self.category.is_some(),
                "condition" => self.condition.is_some(),
                "grade" => self.grade.is_some(),
                "price" => self.price.is_some(),
                "currency" => self.currency.is_some(),
                "quantity" => self.quantity.is_some(),
                "specifications" => !self.specifications.is_empty(),
                _ => false,
            })
            .collect()
    }

    /// Confidence for every structured field, clamped to 0–100.
    ///
    /// Unpopulated fields score 0. A populated field the model did not score
    /// also scores 0.
    #[must_use]
    pub fn normalized_confidence(&self) -> BTreeMap<String, f64> {
        let populated = self.populated_fields();
        STRUCTURED_FIELDS
            .iter()
            .map(|field| {
                let score = if populated.contains(field) {
                    self.field_confidence
                        .get(*field)
                        .copied()
                        .filter(|s| s.is_finite())
                        .unwrap_or(0.0)
                        .clamp(0.0, 100.0)
                } else {
                    0.0
                };
                ((*field).to_string(), score)
            })
            .collect()
    }

    /// Product confidence: mean confidence of the populated fields.
    #[must_use]
    pub fn confidence(&self) -> f64 {
        let normalized = self.normalized_confidence();
        let populated = self.populated_fields();
        mean(populated.iter().filter_map(|f| normalized.get(*f).copied())).unwrap_or(0.0)
    }
}

/// Arithmetic mean, `None` for an empty input.
#[must_use]
pub fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0_f64, 0_u32), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / f64::from(count))
}

/// Overall submission confidence: mean of its products' confidences.
#[must_use]
pub fn overall_confidence(product_confidences: &[f64]) -> Option<f64> {
    mean(product_confidences.iter().copied())
}

/// Display bucket for a confidence score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBucket {
    /// ≥ 90
    High,
    /// 70–89
    Medium,
    /// < 70
    Low,
}

impl ConfidenceBucket {
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            ConfidenceBucket::High
        } else if score >= 70.0 {
            ConfidenceBucket::Medium
        } else {
            ConfidenceBucket::Low
        }
    }
}

/// Where a single extracted product goes after extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    AutoApprove,
    Review(Priority),
}

/// Routing for every product of one submission, in product order.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingPlan {
    pub routes: Vec<Route>,
}

impl RoutingPlan {
    /// Routes each `(confidence, offer_value)` pair through `policy`.
    #[must_use]
    pub fn build(products: &[(f64, Option<Decimal>)], policy: &ValidationPolicy) -> Self {
        let routes = products
            .iter()
            .map(|(confidence, value)| {
                if policy.auto_approves(*confidence) {
                    Route::AutoApprove
                } else {
                    Route::Review(policy.priority(*confidence, *value))
                }
            })
            .collect();
        Self { routes }
    }

    #[must_use]
    pub fn review_count(&self) -> usize {
        self.routes
            .iter()
            .filter(|r| matches!(r, Route::Review(_)))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, confidence: &[(&str, f64)]) -> ProductCandidate {
        ProductCandidate {
            name: name.to_string(),
            brand: None,
            category: None,
            condition: None,
            grade: None,
            price: None,
            currency: None,
            quantity: None,
            specifications: BTreeMap::new(),
            field_confidence: confidence
                .iter()
                .map(|(k, v)| ((*k).to_string(), *v))
                .collect(),
        }
    }

    #[test]
    fn normalized_confidence_covers_every_structured_field() {
        let c = candidate("iPhone 13", &[("name", 95.0)]);
        let normalized = c.normalized_confidence();
        assert_eq!(normalized.len(), STRUCTURED_FIELDS.len());
        assert!((normalized["name"] - 95.0).abs() < f64::EPSILON);
        assert!(normalized["price"].abs() < f64::EPSILON);
    }

    #[test]
    fn confidence_is_mean_of_populated_fields() {
        let mut c = candidate("Galaxy S22", &[("name", 90.0), ("price", 70.0)]);
        c.price = Some(Decimal::new(450, 0));
        assert!((c.confidence() - 80.0).abs() < 1e-9);
    }

    #[test]
    fn confidence_is_clamped() {
        let c = candidate("Pixel 7", &[("name", 140.0)]);
        assert!((c.confidence() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn populated_field_without_score_counts_as_zero() {
        let mut c = candidate("Pixel 7", &[("name", 80.0)]);
        c.brand = Some("Google".to_string());
        assert!((c.confidence() - 40.0).abs() < 1e-9);
    }

    #[test]
    fn validate_rejects_blank_name() {
        let c = candidate("  ", &[]);
        assert!(matches!(c.validate(), Err(CoreError::InvalidCandidate(_))));
    }

    #[test]
    fn validate_rejects_bad_currency() {
        let mut c = candidate("iPad", &[]);
        c.currency = Some("euro".to_string());
        assert!(c.validate().is_err());
        c.currency = Some("EUR".to_string());
        assert!(c.validate().is_ok());
    }

    #[test]
    fn validate_rejects_negative_price() {
        let mut c = candidate("iPad", &[]);
        c.price = Some(Decimal::new(-1, 0));
        assert!(c.validate().is_err());
    }

    #[test]
    fn buckets_follow_display_cutoffs() {
        assert_eq!(ConfidenceBucket::from_score(90.0), ConfidenceBucket::High);
        assert_eq!(ConfidenceBucket::from_score(89.9), ConfidenceBucket::Medium);
        assert_eq!(ConfidenceBucket::from_score(70.0), ConfidenceBucket::Medium);
        assert_eq!(ConfidenceBucket::from_score(69.9), ConfidenceBucket::Low);
    }

    #[test]
    fn mixed_confidence_submission_routes_per_product() {
        let policy = ValidationPolicy::default();
        let plan = RoutingPlan::build(&[(95.0, None), (40.0, None)], &policy);
        assert_eq!(plan.routes[0], Route::AutoApprove);
        assert_eq!(plan.routes[1], Route::Review(Priority::High));
        assert_eq!(plan.review_count(), 1);
        assert!((overall_confidence(&[95.0, 40.0]).unwrap() - 67.5).abs() < 1e-9);
    }

    #[test]
    fn all_high_confidence_submission_needs_no_review() {
        let policy = ValidationPolicy::default();
        let plan = RoutingPlan::build(&[(95.0, None), (81.0, None)], &policy);
        assert_eq!(plan.review_count(), 0);
    }

    #[test]
    fn empty_inputs_have_no_routes_or_confidence() {
        let plan = RoutingPlan::build(&[], &ValidationPolicy::default());
        assert!(plan.routes.is_empty());
        assert!(overall_confidence(&[]).is_none());
    }
}
