//! Reviewer input: rejection feedback and pending-queue filters.

use serde::{Deserialize, Serialize};

use crate::status::{ContentType, Priority};
use crate::CoreError;

const DEFAULT_PAGE_LIMIT: i64 = 20;
const MAX_PAGE_LIMIT: i64 = 100;
const MAX_FEEDBACK_CHARS: usize = 2_000;

/// Why a reviewer rejected an extracted product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCategory {
    IncorrectPrice,
    IncorrectProduct,
    MissingInformation,
    Duplicate,
    PoorMediaQuality,
    NotForSale,
    Other,
}

impl ReasonCategory {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ReasonCategory::IncorrectPrice => "incorrect_price",
            ReasonCategory::IncorrectProduct => "incorrect_product",
            ReasonCategory::MissingInformation => "missing_information",
            ReasonCategory::Duplicate => "duplicate",
            ReasonCategory::PoorMediaQuality => "poor_media_quality",
            ReasonCategory::NotForSale => "not_for_sale",
            ReasonCategory::Other => "other",
        }
    }
}

/// Structured rejection feedback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionFeedback {
    #[serde(default)]
    pub reasons: Vec<ReasonCategory>,
    #[serde(default)]
    pub comment: Option<String>,
}

impl RejectionFeedback {
    /// Checks the feedback is usable and returns it with a trimmed comment.
    ///
    /// Feedback needs at least one reason or a non-empty comment.
    /// [`ReasonCategory::Other`] always needs a comment.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::EmptyFeedback`] when neither a reason nor a
    /// comment is given, or when `other` is given without a comment, and
    /// [`CoreError::InvalidFeedback`] when the comment is too long.
    pub fn validated(&self) -> Result<RejectionFeedback, CoreError> {
        let comment = self
            .comment
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(ToOwned::to_owned);

        if self.reasons.is_empty() && comment.is_none() {
            return Err(CoreError::EmptyFeedback(
                "rejection needs at least one reason or a comment".to_string(),
            ));
        }
        if self.reasons.contains(&ReasonCategory::Other) && comment.is_none() {
            return Err(CoreError::EmptyFeedback(
                "reason 'other' requires a comment".to_string(),
            ));
        }
        if comment
            .as_ref()
            .is_some_and(|c| c.chars().count() > MAX_FEEDBACK_CHARS)
        {
            return Err(CoreError::InvalidFeedback(format!(
                "comment exceeds {MAX_FEEDBACK_CHARS} characters"
            )));
        }

        let mut reasons: Vec<ReasonCategory> = Vec::with_capacity(self.reasons.len());
        for reason in &self.reasons {
            if !reasons.contains(reason) {
                reasons.push(*reason);
            }
        }
        Ok(RejectionFeedback { reasons, comment })
    }
}

/// Filters accepted by the pending validation queue.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct QueueFilters {
    pub supplier_id: Option<String>,
    pub content_type: Option<ContentType>,
    pub priority: Option<Priority>,
    pub min_confidence: Option<f64>,
    pub max_confidence: Option<f64>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Page window derived from `page`/`limit` request parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: i64,
    pub limit: i64,
    pub offset: i64,
}

impl PageWindow {
    /// 1-based page, limit clamped to `1..=100` (default 20).
    #[must_use]
    pub fn from_params(page: Option<i64>, limit: Option<i64>) -> Self {
        let page = page.unwrap_or(1).max(1);
        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
        Self {
            page,
            limit,
            offset: (page - 1).saturating_mul(limit),
        }
    }
}

impl QueueFilters {
    /// Validates confidence bounds.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidFilter`] when a bound is outside 0–100 or
    /// the range is inverted.
    pub fn validate(&self) -> Result<(), CoreError> {
        for (name, bound) in [
            ("min_confidence", self.min_confidence),
            ("max_confidence", self.max_confidence),
        ] {
            if let Some(value) = bound {
                if !(0.0..=100.0).contains(&value) {
                    return Err(CoreError::InvalidFilter(format!(
                        "{name} must be within 0-100, got {value}"
                    )));
                }
            }
        }
        if let (Some(min), Some(max)) = (self.min_confidence, self.max_confidence) {
            if min > max {
                return Err(CoreError::InvalidFilter(
                    "min_confidence must not exceed max_confidence".to_string(),
                ));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn window(&self) -> PageWindow {
        PageWindow::from_params(self.page, self.limit)
    }
}
