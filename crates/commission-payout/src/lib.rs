//! # commission-payout — Payout Materialiser
//!
//! Turns a paid commission breakdown into vendor-side payout documents and
//! keeps them consistent with their origin order.
//!
//! - **Documents** (`document.rs`): the payout document and its lines.
//!
//! - **Product** (`product.rs`): the synthetic commission service product,
//!   created lazily and never duplicated.
//!
//! - **Materialise** (`materialise.rs`): one document per distinct
//!   beneficiary, one line per slot the beneficiary holds.
//!
//! - **Book** (`book.rs`): the concurrent payout store. All-or-nothing batch
//!   insert, per-origin smart link, cascade cancellation on origin cancel
//!   or reset, manual cancel of done payouts, and partner statements.

pub mod book;
pub mod document;
pub mod materialise;
pub mod product;

pub use book::{CascadeCause, CascadeReport, PartnerStatement, PayoutBook, RetainedPayout, StatementLine};
pub use document::{PayoutDocument, PayoutLine};
pub use materialise::{materialise, PayoutOrigin};
pub use product::{CommissionServiceProduct, CommissionServiceRegistry};
