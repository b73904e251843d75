//! # Payment Voucher Workflow State Machine
//!
//! ## States
//!
//! ```text
//! Draft ─submit─▶ Review ─approve─▶ Approve ─authorise─▶ Authorize ─mark_paid─▶ Paid
//!   ▲               │                  │                     │
//!   └─ send_back ───┘◀── send_back ────┘◀──── send_back ─────┘
//!   │
//!   └─ reset ── Cancel ◀── cancel (from any state before Paid)
//! ```
//!
//! | from      | allowed to                  |
//! |-----------|-----------------------------|
//! | Draft     | Review, Cancel              |
//! | Review    | Approve, Draft, Cancel      |
//! | Approve   | Authorize, Review, Cancel   |
//! | Authorize | Paid, Approve, Cancel       |
//! | Paid      | (terminal)                  |
//! | Cancel    | Draft                       |
//!
//! ## Gating
//!
//! A request is checked in a fixed order: the transition must be in the
//! table (precondition), the actor must hold the action's capability
//! (permission), and only then are business guards evaluated by the caller.
//! [`VoucherWorkflow::check`] covers the first two; [`VoucherWorkflow::commit`]
//! applies the transition once the guards pass.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use commission_core::{Actor, Capability, CommissionError, UserId};

use crate::record::{append, TransitionRecord};

// ─── Voucher State ───────────────────────────────────────────────────

/// The workflow state of a payment voucher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoucherState {
    #[default]
    Draft,
    Review,
    Approve,
    Authorize,
    Paid,
    Cancel,
}

impl VoucherState {
    /// Every state.
    pub const ALL: [VoucherState; 6] = [
        Self::Draft,
        Self::Review,
        Self::Approve,
        Self::Authorize,
        Self::Paid,
        Self::Cancel,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Paid)
    }

    /// Whether `self → to` is in the transition table.
    pub fn can_transition_to(&self, to: VoucherState) -> bool {
        use VoucherState::*;
        matches!(
            (self, to),
            (Draft, Review)
                | (Draft, Cancel)
                | (Review, Approve)
                | (Review, Draft)
                | (Review, Cancel)
                | (Approve, Authorize)
                | (Approve, Review)
                | (Approve, Cancel)
                | (Authorize, Paid)
                | (Authorize, Approve)
                | (Authorize, Cancel)
                | (Cancel, Draft)
        )
    }

    /// The capability whose holders act next. `None` for `Draft` (the
    /// creator acts) and for end states.
    pub fn next_capability(&self) -> Option<Capability> {
        match self {
            Self::Review => Some(Capability::Reviewer),
            Self::Approve => Some(Capability::Approver),
            Self::Authorize => Some(Capability::Authorizer),
            Self::Draft | Self::Paid | Self::Cancel => None,
        }
    }
}

impl std::fmt::Display for VoucherState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Draft => "DRAFT",
            Self::Review => "REVIEW",
            Self::Approve => "APPROVE",
            Self::Authorize => "AUTHORIZE",
            Self::Paid => "PAID",
            Self::Cancel => "CANCEL",
        };
        f.write_str(s)
    }
}

// ─── Actions ─────────────────────────────────────────────────────────

/// A user-facing workflow action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoucherAction {
    /// Draft → Review.
    Submit,
    /// Review → Approve.
    Approve,
    /// Approve → Authorize.
    Authorise,
    /// Authorize → Paid.
    MarkPaid,
    /// One stage back: Review → Draft, Approve → Review, Authorize → Approve.
    SendBack,
    /// Any state before Paid → Cancel.
    Cancel,
    /// Cancel → Draft.
    Reset,
}

impl VoucherAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::Approve => "approve",
            Self::Authorise => "authorise",
            Self::MarkPaid => "mark_paid",
            Self::SendBack => "send_back",
            Self::Cancel => "cancel",
            Self::Reset => "reset",
        }
    }

    /// The state this action leads to from `from`, if it applies there.
    pub fn target(&self, from: VoucherState) -> Option<VoucherState> {
        use VoucherState::*;
        let to = match (self, from) {
            (Self::Submit, Draft) => Review,
            (Self::Approve, Review) => Approve,
            (Self::Authorise, Approve) => Authorize,
            (Self::MarkPaid, Authorize) => Paid,
            (Self::SendBack, Review) => Draft,
            (Self::SendBack, Approve) => Review,
            (Self::SendBack, Authorize) => Approve,
            (Self::Cancel, Draft | Review | Approve | Authorize) => Cancel,
            (Self::Reset, Cancel) => Draft,
            _ => return None,
        };
        Some(to)
    }

    /// The action that moves `from → to`, if the pair is in the table.
    pub fn between(from: VoucherState, to: VoucherState) -> Option<VoucherAction> {
        [
            Self::Submit,
            Self::Approve,
            Self::Authorise,
            Self::MarkPaid,
            Self::SendBack,
            Self::Cancel,
            Self::Reset,
        ]
        .into_iter()
        .find(|action| action.target(from) == Some(to))
    }

    /// The capability required. `Submit` has none; it is limited to the
    /// voucher's creator or a `MANAGER`.
    pub fn required_capability(&self) -> Option<Capability> {
        match self {
            Self::Submit => None,
            Self::Approve => Some(Capability::Reviewer),
            Self::Authorise => Some(Capability::Approver),
            Self::MarkPaid => Some(Capability::Authorizer),
            Self::SendBack | Self::Cancel | Self::Reset => Some(Capability::Manager),
        }
    }
}

impl std::fmt::Display for VoucherAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

/// Why a voucher transition was refused by the state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VoucherStateError {
    #[error("voucher cannot move from {from} to {to}")]
    InvalidTransition { from: VoucherState, to: VoucherState },

    #[error("{action} is not available in state {state}")]
    ActionUnavailable {
        action: VoucherAction,
        state: VoucherState,
    },

    #[error("voucher is in terminal state {state}")]
    TerminalState { state: VoucherState },
}

impl VoucherStateError {
    pub fn into_error(self, transition: &str, object: &str) -> CommissionError {
        CommissionError::precondition(transition, object, self.to_string())
    }
}

// ─── Workflow ────────────────────────────────────────────────────────

/// State and transition log of one voucher.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VoucherWorkflow {
    pub state: VoucherState,
    pub transitions: Vec<TransitionRecord<VoucherState>>,
}

impl VoucherWorkflow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `action` for `actor` and return the target state.
    ///
    /// `creator` is the voucher's creator; only they or a `MANAGER` may
    /// submit.
    pub fn check(
        &self,
        action: VoucherAction,
        actor: &Actor,
        creator: UserId,
        object: &str,
    ) -> Result<VoucherState, CommissionError> {
        let transition = format!("voucher {action}");
        let to = self.target_of(action).map_err(|e| e.into_error(&transition, object))?;
        match action.required_capability() {
            Some(capability) => actor.require(capability, &transition, object)?,
            None => {
                if actor.user != creator && !actor.has(Capability::Manager) {
                    return Err(CommissionError::permission(
                        transition,
                        object,
                        format!("{} is neither the creator nor a MANAGER", actor.name),
                    ));
                }
            }
        }
        Ok(to)
    }

    /// Validate a raw `from → to` request against the table.
    pub fn check_target(&self, to: VoucherState, object: &str) -> Result<VoucherAction, CommissionError> {
        VoucherAction::between(self.state, to).ok_or_else(|| {
            VoucherStateError::InvalidTransition {
                from: self.state,
                to,
            }
            .into_error(&format!("voucher transition to {to}"), object)
        })
    }

    /// Apply a transition already validated by [`Self::check`].
    pub fn commit(
        &mut self,
        to: VoucherState,
        actor: &Actor,
        object: &str,
        note: &str,
    ) -> Result<TransitionRecord<VoucherState>, CommissionError> {
        if !self.state.can_transition_to(to) {
            return Err(VoucherStateError::InvalidTransition {
                from: self.state,
                to,
            }
            .into_error("voucher commit", object));
        }
        let record = append(&mut self.transitions, self.state, to, actor, note);
        self.state = to;
        Ok(record)
    }

    fn target_of(&self, action: VoucherAction) -> Result<VoucherState, VoucherStateError> {
        if self.state.is_terminal() {
            return Err(VoucherStateError::TerminalState { state: self.state });
        }
        action
            .target(self.state)
            .ok_or(VoucherStateError::ActionUnavailable {
                action,
                state: self.state,
            })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
