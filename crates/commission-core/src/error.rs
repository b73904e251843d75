//! # Error Types — Structured Rejection Taxonomy
//!
//! Defines the single top-level error returned by every engine operation.
//! All errors use `thiserror` for derive-based `Display` and `Error`.
//!
//! ## Design
//!
//! - Validation and precondition errors name the transition attempted,
//!   the object it was attempted on, and every failing condition on its
//!   own line.
//! - Integrity errors (sequence or uniqueness failures) are the only
//!   retryable class.
//! - Upstream errors wrap a failure reported by a host interface together
//!   with the context in which it was called.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A rejected transition: what was attempted, on what, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// The transition or operation attempted (e.g. `"commission confirm"`).
    pub transition: String,
    /// The object the transition was attempted on (e.g. `"S00042"`).
    pub object: String,
    /// Each failing condition, one per entry.
    pub conditions: Vec<String>,
}

impl Rejection {
    /// Build a rejection with one or more failing conditions.
    pub fn new(
        transition: impl Into<String>,
        object: impl Into<String>,
        conditions: Vec<String>,
    ) -> Self {
        Self {
            transition: transition.into(),
            object: object.into(),
            conditions,
        }
    }

    /// The failing conditions joined one per line.
    pub fn reason_lines(&self) -> String {
        self.conditions.join("\n")
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} rejected for {}", self.transition, self.object)?;
        for condition in &self.conditions {
            write!(f, "\n- {condition}")?;
        }
        Ok(())
    }
}

/// Coarse classification of a [`CommissionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    Permission,
    Precondition,
    Integrity,
    Upstream,
    NotFound,
}

/// Top-level error type for the commission engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommissionError {
    /// An invariant or guard failed; user-correctable.
    #[error("validation error: {0}")]
    Validation(Rejection),

    /// The actor lacks the capability the transition requires.
    #[error("permission denied: {0}")]
    Permission(Rejection),

    /// The object is not in a state from which the transition is allowed.
    #[error("precondition failed: {0}")]
    Precondition(Rejection),

    /// Uniqueness or sequence failure. Retryable at most once.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// A host interface returned an error.
    #[error("upstream error in {context}: {message}")]
    Upstream {
        /// What the engine was doing when the host call failed.
        context: String,
        /// The host's error message.
        message: String,
    },

    /// An identifier did not resolve.
    #[error("not found: {0}")]
    NotFound(String),
}

impl CommissionError {
    /// A validation failure listing every failing condition.
    pub fn validation(
        transition: impl Into<String>,
        object: impl Into<String>,
        conditions: Vec<String>,
    ) -> Self {
        Self::Validation(Rejection::new(transition, object, conditions))
    }

    /// A missing-capability failure.
    pub fn permission(
        transition: impl Into<String>,
        object: impl Into<String>,
        condition: impl Into<String>,
    ) -> Self {
        Self::Permission(Rejection::new(transition, object, vec![condition.into()]))
    }

    /// A state-machine mismatch.
    pub fn precondition(
        transition: impl Into<String>,
        object: impl Into<String>,
        condition: impl Into<String>,
    ) -> Self {
        Self::Precondition(Rejection::new(transition, object, vec![condition.into()]))
    }

    /// Wrap a host interface failure with the calling context.
    pub fn upstream(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Upstream {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// The coarse class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Permission(_) => ErrorKind::Permission,
            Self::Precondition(_) => ErrorKind::Precondition,
            Self::Integrity(_) => ErrorKind::Integrity,
            Self::Upstream { .. } => ErrorKind::Upstream,
            Self::NotFound(_) => ErrorKind::NotFound,
        }
    }

    /// Whether a single retry is permitted.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Integrity(_))
    }

    /// The rejection details, if this error is a rejected transition.
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Validation(r) | Self::Permission(r) | Self::Precondition(r) => Some(r),
            _ => None,
        }
    }

    /// The failing conditions, empty for non-rejection errors.
    pub fn conditions(&self) -> &[String] {
        self.rejection()
            .map(|r| r.conditions.as_slice())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_display_lists_each_condition_on_its_own_line() {
        let err = CommissionError::validation(
            "commission pay",
            "S00042",
            vec![
                "No posted customer invoices found".to_string(),
                "Order total must be positive".to_string(),
            ],
        );
        let text = err.to_string();
        assert!(text.starts_with("validation error: commission pay rejected for S00042"));
        assert!(text.contains("\n- No posted customer invoices found"));
        assert!(text.contains("\n- Order total must be positive"));
    }

    #[test]
    fn only_integrity_errors_are_retryable() {
        assert!(CommissionError::Integrity("dup".into()).is_retryable());
        assert!(!CommissionError::precondition("x", "y", "z").is_retryable());
        assert!(!CommissionError::upstream("invoice lookup", "timeout").is_retryable());
    }

    #[test]
    fn kind_matches_variant() {
        assert_eq!(
            CommissionError::permission("voucher approve", "PV00001", "missing REVIEWER").kind(),
            ErrorKind::Permission
        );
        assert_eq!(
            CommissionError::NotFound("order".into()).kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn conditions_empty_for_non_rejections() {
        assert!(CommissionError::Integrity("x".into()).conditions().is_empty());
        let err = CommissionError::precondition("commission confirm", "S1", "status is PAID");
        assert_eq!(err.conditions(), ["status is PAID".to_string()]);
        assert_eq!(
            err.rejection().map(|r| r.reason_lines()),
            Some("status is PAID".to_string())
        );
    }
}
