//! # commission-state — Commission, Payout and Voucher State Machines
//!
//! Each machine is an enum of states with a validated transition table and
//! an append-only log of [`TransitionRecord`]s. Transitions outside the
//! table are rejected as precondition failures and leave the state
//! untouched.
//!
//! ## State Machines
//!
//! - **Commission** (`commission.rs`): `Draft → Calculated → Confirmed →
//!   Paid` with `Cancelled` via reject or origin cancellation, and reset
//!   back to `Draft`.
//!
//! - **Payout** (`payout.rs`): `Draft → Sent → Approved → Done`, cancellable
//!   from any state before `Done`; a done payout needs a manual cancel.
//!
//! - **Voucher** (`voucher.rs`): the four-stage approval workflow
//!   `Draft → Review → Approve → Authorize → Paid`, with send-back,
//!   cancel and reset, each action gated on a capability.
//!
//! ## Design
//!
//! The machines are enum-based rather than typestate. Every state is loaded
//! from storage and driven by user requests, so the target state is only
//! known at runtime.

pub mod commission;
pub mod payout;
pub mod record;
pub mod voucher;

// ─── Commission re-exports ──────────────────────────────────────────

pub use commission::{CommissionLifecycle, CommissionStateError, CommissionStatus};

// ─── Payout re-exports ──────────────────────────────────────────────

pub use payout::{PayoutLifecycle, PayoutState, PayoutStateError};

// ─── Voucher re-exports ─────────────────────────────────────────────

pub use voucher::{VoucherAction, VoucherState, VoucherStateError, VoucherWorkflow};

// ─── Shared ─────────────────────────────────────────────────────────

pub use record::TransitionRecord;
