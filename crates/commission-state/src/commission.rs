//! # Commission Status State Machine
//!
//! ## States
//!
//! ```text
//! Draft ──calc──▶ Calculated ──confirm──▶ Confirmed ──pay──▶ Paid
//!   ▲                 │                      │                 │
//!   └──── reset ──────┴──────── reset ───────┘                 │
//!                     │                      │                 │
//!                     └──────── reject (ADMIN) ────────────────┴──▶ Cancelled
//! ```
//!
//! `reset` is refused from `Paid`. The only way back from `Paid` is
//! [`CommissionLifecycle::reopen`], used when the origin order itself is
//! reset to draft. `Cancelled` is reached by `reject` or by cancelling the
//! origin order, and may be reset.
//!
//! The commission sequence is allocated on the first confirm and never
//! changes afterwards, not even across resets.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use commission_core::{Actor, Capability, CommissionError, Timestamp, UserId};

use crate::record::{append, TransitionRecord};

// ─── Commission Status ───────────────────────────────────────────────

/// The lifecycle state of an order's commission bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommissionStatus {
    #[default]
    Draft,
    Calculated,
    Confirmed,
    Paid,
    Cancelled,
}

impl CommissionStatus {
    /// Whether the bundle inputs may be edited and recalculated.
    pub fn accepts_edits(&self) -> bool {
        matches!(self, Self::Draft | Self::Calculated)
    }

    /// Whether computed amounts are frozen.
    pub fn is_frozen(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Paid)
    }

    /// Whether `self → to` appears in the transition table.
    pub fn can_transition_to(&self, to: CommissionStatus) -> bool {
        use CommissionStatus::*;
        matches!(
            (self, to),
            (Draft, Calculated)
                | (Calculated, Calculated)
                | (Calculated, Confirmed)
                | (Confirmed, Paid)
                | (Draft, Draft)
                | (Calculated, Draft)
                | (Confirmed, Draft)
                | (Cancelled, Draft)
                | (Draft, Cancelled)
                | (Calculated, Cancelled)
                | (Confirmed, Cancelled)
                | (Paid, Cancelled)
        )
    }
}

impl std::fmt::Display for CommissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Draft => "DRAFT",
            Self::Calculated => "CALCULATED",
            Self::Confirmed => "CONFIRMED",
            Self::Paid => "PAID",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

/// Why a commission transition was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommissionStateError {
    #[error("commission cannot move from {from} to {to}")]
    InvalidTransition {
        from: CommissionStatus,
        to: CommissionStatus,
    },

    #[error("commission is {state}; {action} requires {required}")]
    WrongState {
        state: CommissionStatus,
        action: &'static str,
        required: &'static str,
    },

    #[error("commission already processed; payouts were generated")]
    AlreadyProcessed,
}

impl CommissionStateError {
    /// As a precondition failure of `transition` on `object`.
    pub fn into_error(self, transition: &str, object: &str) -> CommissionError {
        CommissionError::precondition(transition, object, self.to_string())
    }
}

// ─── Lifecycle ───────────────────────────────────────────────────────

/// Status and lifecycle fields of a commission bundle.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommissionLifecycle {
    pub status: CommissionStatus,
    /// Assigned on the first confirm; immutable afterwards.
    pub sequence: Option<String>,
    pub confirmed_by: Option<UserId>,
    pub confirmed_at: Option<Timestamp>,
    pub rejected_by: Option<UserId>,
    pub rejected_at: Option<Timestamp>,
    pub paid_at: Option<Timestamp>,
    /// Payouts have been generated for this bundle.
    pub processed: bool,
    /// Why the last `pay` (or auto-calculation) failed, one reason per line.
    pub blocked_reason: Option<String>,
    pub notes: Vec<String>,
    pub transitions: Vec<TransitionRecord<CommissionStatus>>,
}

impl CommissionLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// DRAFT|CALCULATED → CALCULATED.
    pub fn mark_calculated(
        &mut self,
        actor: &Actor,
        object: &str,
    ) -> Result<TransitionRecord<CommissionStatus>, CommissionError> {
        self.require_transition(CommissionStatus::Calculated, "commission calc", object)?;
        Ok(self.do_transition(CommissionStatus::Calculated, actor, "calculated"))
    }

    /// CALCULATED → CONFIRMED.
    ///
    /// `allocate_sequence` is only called when no sequence has been
    /// assigned yet. If it fails, nothing changes.
    pub fn confirm<F>(
        &mut self,
        actor: &Actor,
        object: &str,
        allocate_sequence: F,
    ) -> Result<TransitionRecord<CommissionStatus>, CommissionError>
    where
        F: FnOnce() -> Result<String, CommissionError>,
    {
        const T: &str = "commission confirm";
        self.require_transition(CommissionStatus::Confirmed, T, object)?;
        if self.status != CommissionStatus::Calculated {
            return Err(CommissionStateError::WrongState {
                state: self.status,
                action: "confirm",
                required: "CALCULATED",
            }
            .into_error(T, object));
        }
        if self.sequence.is_none() {
            self.sequence = Some(allocate_sequence()?);
        }
        let record = self.do_transition(CommissionStatus::Confirmed, actor, "confirmed");
        self.confirmed_by = Some(actor.user);
        self.confirmed_at = Some(record.timestamp);
        self.blocked_reason = None;
        Ok(record)
    }

    /// Check that `pay` may be attempted: CONFIRMED and not yet processed.
    pub fn check_payable(&self, object: &str) -> Result<(), CommissionError> {
        const T: &str = "commission pay";
        self.require_transition(CommissionStatus::Paid, T, object)?;
        if self.processed {
            return Err(CommissionStateError::AlreadyProcessed.into_error(T, object));
        }
        Ok(())
    }

    /// CONFIRMED → PAID. Marks the bundle processed.
    pub fn pay(
        &mut self,
        actor: &Actor,
        object: &str,
    ) -> Result<TransitionRecord<CommissionStatus>, CommissionError> {
        self.check_payable(object)?;
        let record = self.do_transition(CommissionStatus::Paid, actor, "payouts generated");
        self.processed = true;
        self.paid_at = Some(record.timestamp);
        self.blocked_reason = None;
        Ok(record)
    }

    /// Any state except PAID → DRAFT. Clears every lifecycle field except
    /// the sequence.
    pub fn reset(
        &mut self,
        actor: &Actor,
        object: &str,
        reason: &str,
    ) -> Result<TransitionRecord<CommissionStatus>, CommissionError> {
        self.require_transition(CommissionStatus::Draft, "commission reset", object)?;
        Ok(self.reset_fields(actor, reason))
    }

    /// Any state → DRAFT, including PAID. Only used when the origin order
    /// is reopened.
    pub fn reopen(&mut self, actor: &Actor, reason: &str) -> TransitionRecord<CommissionStatus> {
        self.reset_fields(actor, reason)
    }

    /// CALCULATED|CONFIRMED|PAID → CANCELLED. Requires `ADMIN`.
    pub fn reject(
        &mut self,
        actor: &Actor,
        object: &str,
        note: &str,
    ) -> Result<TransitionRecord<CommissionStatus>, CommissionError> {
        const T: &str = "commission reject";
        self.require_transition(CommissionStatus::Cancelled, T, object)?;
        if self.status == CommissionStatus::Draft {
            return Err(CommissionStateError::WrongState {
                state: self.status,
                action: "reject",
                required: "CALCULATED, CONFIRMED or PAID",
            }
            .into_error(T, object));
        }
        actor.require(Capability::Admin, T, object)?;
        let record = self.do_transition(CommissionStatus::Cancelled, actor, note);
        self.rejected_by = Some(actor.user);
        self.rejected_at = Some(record.timestamp);
        self.notes.push(format!("Rejected by {}: {note}", actor.name));
        Ok(record)
    }

    /// Any non-CANCELLED state → CANCELLED because the origin order was
    /// cancelled. `None` when already cancelled.
    pub fn cancel_for_origin(
        &mut self,
        actor: &Actor,
        reason: &str,
    ) -> Option<TransitionRecord<CommissionStatus>> {
        if self.status == CommissionStatus::Cancelled {
            return None;
        }
        let record = self.do_transition(CommissionStatus::Cancelled, actor, reason);
        self.notes.push(reason.to_string());
        Some(record)
    }

    /// Whether the sequence has been assigned.
    pub fn has_sequence(&self) -> bool {
        self.sequence.is_some()
    }

    /// The most recent transition.
    pub fn last_transition(&self) -> Option<&TransitionRecord<CommissionStatus>> {
        self.transitions.last()
    }

    fn require_transition(
        &self,
        to: CommissionStatus,
        transition: &str,
        object: &str,
    ) -> Result<(), CommissionError> {
        if self.status.can_transition_to(to) {
            Ok(())
        } else {
            Err(CommissionStateError::InvalidTransition {
                from: self.status,
                to,
            }
            .into_error(transition, object))
        }
    }

    fn reset_fields(&mut self, actor: &Actor, reason: &str) -> TransitionRecord<CommissionStatus> {
        let record = self.do_transition(CommissionStatus::Draft, actor, reason);
        self.confirmed_by = None;
        self.confirmed_at = None;
        self.rejected_by = None;
        self.rejected_at = None;
        self.paid_at = None;
        self.processed = false;
        self.blocked_reason = None;
        self.notes.clear();
        record
    }

    fn do_transition(
        &mut self,
        to: CommissionStatus,
        actor: &Actor,
        reason: &str,
    ) -> TransitionRecord<CommissionStatus> {
        let record = append(&mut self.transitions, self.status, to, actor, reason);
        tracing::debug!(from = %self.status, to = %to, actor = %actor, "commission status transition");
        self.status = to;
        record
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use commission_core::ErrorKind;

    fn admin() -> Actor {
        Actor::new(UserId::new(), "ada").with_capability(Capability::Admin)
    }

    fn clerk() -> Actor {
        Actor::new(UserId::new(), "carl")
    }

    fn confirmed() -> CommissionLifecycle {
        let mut lc = CommissionLifecycle::new();
        lc.mark_calculated(&clerk(), "S1").unwrap();
        lc.confirm(&clerk(), "S1", || Ok("COMM00001".to_string())).unwrap();
        lc
    }

    #[test]
    fn happy_path_records_every_transition() {
        let mut lc = confirmed();
        lc.pay(&clerk(), "S1").unwrap();
        assert_eq!(lc.status, CommissionStatus::Paid);
        assert!(lc.processed);
        assert!(lc.paid_at.is_some());
        assert_eq!(lc.sequence.as_deref(), Some("COMM00001"));
        let path: Vec<_> = lc.transitions.iter().map(|t| t.to_state).collect();
        assert_eq!(
            path,
            vec![
                CommissionStatus::Calculated,
                CommissionStatus::Confirmed,
                CommissionStatus::Paid
            ]
        );
        assert!(lc
            .transitions
            .windows(2)
            .all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn confirm_from_draft_is_a_precondition_error() {
        let mut lc = CommissionLifecycle::new();
        let err = lc.confirm(&clerk(), "S1", || Ok("X".into())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Precondition);
        assert_eq!(lc.status, CommissionStatus::Draft);
        assert!(lc.sequence.is_none());
        assert!(lc.transitions.is_empty());
    }

    #[test]
    fn confirm_from_paid_is_rejected() {
        let mut lc = confirmed();
        lc.pay(&clerk(), "S1").unwrap();
        let err = lc.confirm(&clerk(), "S1", || Ok("X".into())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Precondition);
        assert!(err.to_string().contains("commission cannot move from PAID to CONFIRMED"));
    }

    #[test]
    fn sequence_is_assigned_once() {
        let mut lc = confirmed();
        lc.reset(&clerk(), "S1", "edit").unwrap();
        lc.mark_calculated(&clerk(), "S1").unwrap();
        let mut called = false;
        lc.confirm(&clerk(), "S1", || {
            called = true;
            Ok("COMM00002".into())
        })
        .unwrap();
        assert!(!called);
        assert_eq!(lc.sequence.as_deref(), Some("COMM00001"));
    }

    #[test]
    fn failed_sequence_allocation_changes_nothing() {
        let mut lc = CommissionLifecycle::new();
        lc.mark_calculated(&clerk(), "S1").unwrap();
        let err = lc
            .confirm(&clerk(), "S1", || Err(CommissionError::Integrity("dup".into())))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Integrity);
        assert_eq!(lc.status, CommissionStatus::Calculated);
        assert_eq!(lc.transitions.len(), 1);
    }

    #[test]
    fn pay_twice_is_refused() {
        let mut lc = confirmed();
        lc.pay(&clerk(), "S1").unwrap();
        assert_eq!(lc.pay(&clerk(), "S1").unwrap_err().kind(), ErrorKind::Precondition);
    }

    #[test]
    fn processed_flag_blocks_pay_from_confirmed() {
        let mut lc = confirmed();
        lc.processed = true;
        let err = lc.check_payable("S1").unwrap_err();
        assert!(err.to_string().contains("already processed"));
    }

    #[test]
    fn reset_refused_from_paid_but_reopen_allowed() {
        let mut lc = confirmed();
        lc.pay(&clerk(), "S1").unwrap();
        assert_eq!(
            lc.reset(&clerk(), "S1", "edit").unwrap_err().kind(),
            ErrorKind::Precondition
        );
        lc.reopen(&Actor::system(), "origin order reset to draft");
        assert_eq!(lc.status, CommissionStatus::Draft);
        assert!(!lc.processed);
        assert!(lc.paid_at.is_none());
        assert_eq!(lc.sequence.as_deref(), Some("COMM00001"));
    }

    #[test]
    fn reset_clears_lifecycle_fields() {
        let mut lc = confirmed();
        lc.blocked_reason = Some("No posted customer invoices found".into());
        lc.reset(&clerk(), "S1", "edit").unwrap();
        assert_eq!(lc.status, CommissionStatus::Draft);
        assert!(lc.confirmed_by.is_none());
        assert!(lc.confirmed_at.is_none());
        assert!(lc.blocked_reason.is_none());
    }

    #[test]
    fn reject_requires_admin() {
        let mut lc = confirmed();
        let err = lc.reject(&clerk(), "S1", "duplicate deal").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permission);
        assert_eq!(lc.status, CommissionStatus::Confirmed);

        let admin = admin();
        lc.reject(&admin, "S1", "duplicate deal").unwrap();
        assert_eq!(lc.status, CommissionStatus::Cancelled);
        assert_eq!(lc.rejected_by, Some(admin.user));
        assert!(lc.rejected_at.is_some());
        assert_eq!(lc.notes, vec!["Rejected by ada: duplicate deal".to_string()]);
    }

    #[test]
    fn reject_from_draft_is_a_precondition_error_even_for_admin() {
        let mut lc = CommissionLifecycle::new();
        let err = lc.reject(&clerk(), "S1", "x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Precondition);
    }

    #[test]
    fn rejected_commission_can_be_reset() {
        let mut lc = confirmed();
        lc.reject(&admin(), "S1", "x").unwrap();
        lc.reset(&clerk(), "S1", "retry").unwrap();
        assert!(lc.rejected_by.is_none());
        assert!(lc.notes.is_empty());
    }

    #[test]
    fn origin_cancel_is_idempotent() {
        let mut lc = confirmed();
        assert!(lc.cancel_for_origin(&Actor::system(), "origin cancelled").is_some());
        assert!(lc.cancel_for_origin(&Actor::system(), "origin cancelled").is_none());
        assert_eq!(lc.status, CommissionStatus::Cancelled);
    }

    #[test]
    fn edits_only_before_confirm() {
        assert!(CommissionStatus::Draft.accepts_edits());
        assert!(CommissionStatus::Calculated.accepts_edits());
        assert!(!CommissionStatus::Confirmed.accepts_edits());
        assert!(CommissionStatus::Paid.is_frozen());
    }

    #[test]
    fn status_serializes_screaming() {
        assert_eq!(
            serde_json::to_string(&CommissionStatus::Calculated).unwrap(),
            "\"CALCULATED\""
        );
    }
}
