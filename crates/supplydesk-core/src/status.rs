//! Closed status vocabularies for submissions, validation items, and
//! recovery operations.
//!
//! Every status column in the database is stored as lowercase text and parsed
//! back into one of these enums at the pipeline boundary. Transition rules
//! live next to the enums so every call site matches exhaustively.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// All variants in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(CoreError::UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

/// Kind of content carried by an inbound supplier message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    Image,
    Pdf,
    Voice,
}

text_enum!(ContentType, "content type", {
    Text => "text",
    Image => "image",
    Pdf => "pdf",
    Voice => "voice",
});

impl ContentType {
    /// Media kinds must carry a media reference; text carries its body inline.
    #[must_use]
    pub fn requires_media(self) -> bool {
        !matches!(self, ContentType::Text)
    }
}

/// Extraction progress of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

text_enum!(ProcessingStatus, "processing status", {
    Pending => "pending",
    Processing => "processing",
    Completed => "completed",
    Failed => "failed",
});

/// Events that move a submission through its processing lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingEvent {
    /// A worker claims the submission for an extraction attempt.
    Claim,
    /// The claimed attempt persisted its products.
    Complete,
    /// The claimed attempt failed (service error, timeout, bad output).
    Fail,
    /// Operator reprocess or automatic recovery resets a failed submission.
    Reset,
}

impl ProcessingStatus {
    /// Applies `event` to the current status.
    ///
    /// The only backward edge is `failed -> pending` through [`ProcessingEvent::Reset`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidTransition`] when `event` is not allowed
    /// from the current status.
    pub fn apply(self, event: ProcessingEvent) -> Result<Self, CoreError> {
        use ProcessingEvent as E;
        use ProcessingStatus as S;

        match (self, event) {
            (S::Pending, E::Claim) => Ok(S::Processing),
            (S::Processing, E::Complete) => Ok(S::Completed),
            (S::Processing, E::Fail) => Ok(S::Failed),
            (S::Failed, E::Reset) => Ok(S::Pending),
            (S::Pending | S::Processing | S::Completed | S::Failed, _) => {
                Err(CoreError::InvalidTransition {
                    from: self.as_str(),
                    event: format!("{event:?}").to_lowercase(),
                })
            }
        }
    }
}

/// Review outcome of a submission or a single validation item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Pending,
    Approved,
    Rejected,
}

text_enum!(ValidationStatus, "validation status", {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
});

impl ValidationStatus {
    /// Derives a submission's validation status from its items' statuses.
    ///
    /// A single rejected item rejects the submission. Otherwise any pending
    /// item keeps it pending, and it is approved once every item is
    /// approved. A submission with no items stays pending.
    #[must_use]
    pub fn rollup(items: &[ValidationStatus]) -> ValidationStatus {
        if items.contains(&ValidationStatus::Rejected) {
            ValidationStatus::Rejected
        } else if items.is_empty() || items.contains(&ValidationStatus::Pending) {
            ValidationStatus::Pending
        } else {
            ValidationStatus::Approved
        }
    }
}

/// Who decided a validation item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecidedBy {
    Auto,
    Operator,
}

text_enum!(DecidedBy, "decided by", {
    Auto => "auto",
    Operator => "operator",
});

/// Review priority of a validation item.
///
/// Ordering follows urgency: `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

text_enum!(Priority, "priority", {
    Low => "low",
    Medium => "medium",
    High => "high",
});

impl Priority {
    /// Numeric rank stored alongside the text value so SQL can sort by it.
    #[must_use]
    pub fn rank(self) -> i16 {
        match self {
            Priority::Low => 1,
            Priority::Medium => 2,
            Priority::High => 3,
        }
    }
}

/// Pipeline stage a failed operation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Webhook,
    AiExtraction,
    Validation,
    InventoryUpdate,
}

text_enum!(OperationType, "operation type", {
    Webhook => "webhook",
    AiExtraction => "ai_extraction",
    Validation => "validation",
    InventoryUpdate => "inventory_update",
});

/// Recovery state of a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    Scheduled,
    Retrying,
    PermanentlyFailed,
}

text_enum!(OperationState, "operation state", {
    Scheduled => "scheduled",
    Retrying => "retrying",
    PermanentlyFailed => "permanently_failed",
});

/// Physical condition of an offered product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductCondition {
    New,
    Used,
    Refurbished,
}

text_enum!(ProductCondition, "product condition", {
    New => "new",
    Used => "used",
    Refurbished => "refurbished",
});

/// Performance tier assigned to a supplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupplierTier {
    Excellent,
    Good,
    NeedsImprovement,
}

text_enum!(SupplierTier, "supplier tier", {
    Excellent => "excellent",
    Good => "good",
    NeedsImprovement => "needs_improvement",
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_parses_all_supported_kinds() {
        for kind in ContentType::ALL {
            assert_eq!(kind.as_str().parse::<ContentType>().unwrap(), *kind);
        }
    }

    #[test]
    fn content_type_rejects_unknown_kind() {
        let err = "video".parse::<ContentType>().unwrap_err();
        assert!(matches!(
            err,
            CoreError::UnknownVariant { kind: "content type", ref value } if value == "video"
        ));
    }

    #[test]
    fn only_text_skips_media() {
        assert!(!ContentType::Text.requires_media());
        assert!(ContentType::Image.requires_media());
        assert!(ContentType::Pdf.requires_media());
        assert!(ContentType::Voice.requires_media());
    }

    #[test]
    fn processing_happy_path() {
        let s = ProcessingStatus::Pending
            .apply(ProcessingEvent::Claim)
            .and_then(|s| s.apply(ProcessingEvent::Complete))
            .unwrap();
        assert_eq!(s, ProcessingStatus::Completed);
    }

    #[test]
    fn processing_cannot_skip_to_completed() {
        assert!(ProcessingStatus::Pending
            .apply(ProcessingEvent::Complete)
            .is_err());
    }

    #[test]
    fn processing_only_backward_edge_is_failed_reset() {
        assert_eq!(
            ProcessingStatus::Failed
                .apply(ProcessingEvent::Reset)
                .unwrap(),
            ProcessingStatus::Pending
        );
        for status in [
            ProcessingStatus::Pending,
            ProcessingStatus::Processing,
            ProcessingStatus::Completed,
        ] {
            assert!(
                status.apply(ProcessingEvent::Reset).is_err(),
                "{status} must not reset"
            );
        }
    }

    #[test]
    fn completed_is_terminal() {
        for event in [
            ProcessingEvent::Claim,
            ProcessingEvent::Complete,
            ProcessingEvent::Fail,
            ProcessingEvent::Reset,
        ] {
            assert!(ProcessingStatus::Completed.apply(event).is_err());
        }
    }

    #[test]
    fn rollup_pending_while_any_item_pending() {
        assert_eq!(
            ValidationStatus::rollup(&[ValidationStatus::Approved, ValidationStatus::Pending]),
            ValidationStatus::Pending
        );
        assert_eq!(ValidationStatus::rollup(&[]), ValidationStatus::Pending);
    }

    #[test]
    fn rollup_any_rejection_rejects_the_submission() {
        assert_eq!(
            ValidationStatus::rollup(&[ValidationStatus::Rejected, ValidationStatus::Approved]),
            ValidationStatus::Rejected
        );
        assert_eq!(
            ValidationStatus::rollup(&[ValidationStatus::Pending, ValidationStatus::Rejected]),
            ValidationStatus::Rejected
        );
    }

    #[test]
    fn rollup_approved_only_when_every_item_approved() {
        assert_eq!(
            ValidationStatus::rollup(&[ValidationStatus::Approved, ValidationStatus::Approved]),
            ValidationStatus::Approved
        );
    }

    #[test]
    fn priority_orders_by_urgency() {
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
        assert!(Priority::High.rank() > Priority::Low.rank());
    }

    #[test]
    fn operation_type_round_trips_snake_case() {
        assert_eq!(OperationType::InventoryUpdate.as_str(), "inventory_update");
        assert_eq!(
            "ai_extraction".parse::<OperationType>().unwrap(),
            OperationType::AiExtraction
        );
        let json = serde_json::to_string(&OperationState::PermanentlyFailed).unwrap();
        assert_eq!(json, "\"permanently_failed\"");
    }
}
