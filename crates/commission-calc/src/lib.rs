//! # commission-calc — Commission Calculator and Allocation Validator
//!
//! Pure computation over a sale order snapshot. Nothing here performs I/O
//! or holds state between calls.
//!
//! - **Slots** (`slot.rs`): the fixed set of beneficiary roles, their side
//!   (external or internal), and the per-slot assignment entered on an order.
//!
//! - **Order** (`order.rs`): the commission-relevant snapshot of a sale
//!   order and the price-unit base.
//!
//! - **Calculator** (`calculator.rs`): maps `(type, rate, fixed)` to an
//!   amount per slot, then sums already-rounded amounts into the published
//!   aggregates. Same inputs always yield equal outputs.
//!
//! - **Validator** (`validator.rs`): enumerates invariant violations and
//!   classifies the allocation as under, full or over.
//!
//! - **Dependencies** (`dependency.rs`): the inputs a breakdown depends on,
//!   declared once, with a dirty-set tracker for recomputation.

pub mod breakdown;
pub mod calculator;
pub mod dependency;
pub mod order;
pub mod slot;
pub mod validator;

pub use breakdown::{AllocationStatus, CommissionBreakdown, RateSource, SlotAmount};
pub use calculator::{CalcSettings, Calculator};
pub use dependency::{CommissionDependency, DirtyTracker};
pub use order::{OrderLine, OrderSnapshot};
pub use slot::{BeneficiarySlot, CommissionInputs, CommissionType, SlotAssignment, SlotSide};
pub use validator::{Validator, Violation, Violations};
