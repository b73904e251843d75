//! # commission-core — Foundational Types for the Commission Engine
//!
//! Every other crate in the workspace depends on `commission-core`; it
//! depends on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype identifiers.** `SaleOrderId`, `PartnerId`, `PayoutId`,
//!    `VoucherId` and friends are distinct types. A payout id cannot be
//!    passed where an order id is expected.
//!
//! 2. **Decimal money only.** All amounts are `rust_decimal::Decimal`.
//!    Currency rounding goes through [`money::round_currency`], which
//!    rounds half away from zero and rescales to exactly two places.
//!
//! 3. **One error taxonomy.** [`CommissionError`] carries the five
//!    rejection classes (validation, permission, precondition, integrity,
//!    upstream). Module-level errors convert into it.
//!
//! 4. **UTC-only timestamps.** [`Timestamp`] rejects non-UTC input and
//!    offers a strictly monotonic successor for append-only histories.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `commission-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod audit;
pub mod capability;
pub mod config;
pub mod error;
pub mod identity;
pub mod money;
pub mod sequence;
pub mod temporal;

pub use audit::{AuditEntry, AuditObject, AuditSink, InMemoryAuditLog};
pub use capability::{Actor, Capability};
pub use config::{ConfigError, EngineConfig, InternalBaseMode};
pub use error::{CommissionError, ErrorKind, Rejection};
pub use identity::{
    InvoiceId, JournalId, PartnerId, PayoutId, ProductId, SaleOrderId, UserId, VoucherId,
};
pub use money::{round_currency, CurrencyCode};
pub use sequence::{AtomicSequences, SequenceAllocator, SequenceFormat};
pub use temporal::Timestamp;
