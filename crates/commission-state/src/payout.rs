//! # Payout Document State Machine
//!
//! ```text
//! Draft ──send──▶ Sent ──approve──▶ Approved ──complete──▶ Done
//!   │              │                   │                    │
//!   └──────────────┴───── cancel ──────┴──▶ Cancel ◀────────┘
//!                                            (manual, MANAGER)
//! ```
//!
//! A `Done` payout is already reconciled with the ledger; cascades never
//! cancel it. Only [`PayoutLifecycle::cancel_done`] does, and it requires
//! the `MANAGER` capability.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use commission_core::{Actor, Capability, CommissionError};

use crate::record::{append, TransitionRecord};

/// The state of a payout document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutState {
    #[default]
    Draft,
    Sent,
    /// Also accepts the host's `PURCHASE` on input.
    #[serde(alias = "PURCHASE")]
    Approved,
    Done,
    Cancel,
}

impl PayoutState {
    /// Whether the payout still counts as an obligation.
    pub fn is_live(&self) -> bool {
        !matches!(self, Self::Cancel)
    }

    /// Whether a cascade may cancel this payout.
    pub fn is_auto_cancellable(&self) -> bool {
        matches!(self, Self::Draft | Self::Sent | Self::Approved)
    }

    /// Whether `self → to` is an ordinary transition. The manual
    /// `Done → Cancel` path is not included.
    pub fn can_transition_to(&self, to: PayoutState) -> bool {
        use PayoutState::*;
        matches!(
            (self, to),
            (Draft, Sent)
                | (Sent, Approved)
                | (Approved, Done)
                | (Draft, Cancel)
                | (Sent, Cancel)
                | (Approved, Cancel)
        )
    }
}

impl std::fmt::Display for PayoutState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Draft => "DRAFT",
            Self::Sent => "SENT",
            Self::Approved => "APPROVED",
            Self::Done => "DONE",
            Self::Cancel => "CANCEL",
        };
        f.write_str(s)
    }
}

/// Why a payout transition was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayoutStateError {
    #[error("payout cannot move from {from} to {to}")]
    InvalidTransition { from: PayoutState, to: PayoutState },

    #[error("payout is {state}; only DONE payouts need a manual cancel")]
    NotDone { state: PayoutState },
}

impl PayoutStateError {
    pub fn into_error(self, transition: &str, object: &str) -> CommissionError {
        CommissionError::precondition(transition, object, self.to_string())
    }
}

/// State and transition log of one payout document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PayoutLifecycle {
    pub state: PayoutState,
    pub transitions: Vec<TransitionRecord<PayoutState>>,
}

impl PayoutLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move along the ordinary transition table.
    pub fn transition(
        &mut self,
        to: PayoutState,
        actor: &Actor,
        object: &str,
        reason: &str,
    ) -> Result<TransitionRecord<PayoutState>, CommissionError> {
        if !self.state.can_transition_to(to) {
            return Err(PayoutStateError::InvalidTransition {
                from: self.state,
                to,
            }
            .into_error(&format!("payout {}", verb(to)), object));
        }
        Ok(self.do_transition(to, actor, reason))
    }

    /// DONE → CANCEL. Requires `MANAGER`.
    pub fn cancel_done(
        &mut self,
        actor: &Actor,
        object: &str,
        reason: &str,
    ) -> Result<TransitionRecord<PayoutState>, CommissionError> {
        const T: &str = "payout manual cancel";
        if self.state != PayoutState::Done {
            return Err(PayoutStateError::NotDone { state: self.state }.into_error(T, object));
        }
        actor.require(Capability::Manager, T, object)?;
        Ok(self.do_transition(PayoutState::Cancel, actor, reason))
    }

    fn do_transition(
        &mut self,
        to: PayoutState,
        actor: &Actor,
        reason: &str,
    ) -> TransitionRecord<PayoutState> {
        let record = append(&mut self.transitions, self.state, to, actor, reason);
        self.state = to;
        record
    }
}

fn verb(to: PayoutState) -> &'static str {
    match to {
        PayoutState::Draft => "draft",
        PayoutState::Sent => "send",
        PayoutState::Approved => "approve",
        PayoutState::Done => "complete",
        PayoutState::Cancel => "cancel",
    }
}
