//! # commission-engine
//!
//! The lifecycle controller of the commission bundle carried by each sale
//! order. It ties the calculator and validator to the commission state
//! machine and drives the payout book and the voucher registry.
//!
//! ## Operations
//!
//! | Operation | Transition |
//! |-----------|------------|
//! | [`CommissionEngine::calculate`] | DRAFT, CALCULATED → CALCULATED |
//! | [`CommissionEngine::confirm`] | CALCULATED → CONFIRMED |
//! | [`CommissionEngine::pay`], [`CommissionEngine::pay_many`] | CONFIRMED → PAID |
//! | [`CommissionEngine::reset`] | any but PAID → DRAFT |
//! | [`CommissionEngine::reject`] | CALCULATED, CONFIRMED, PAID → CANCELLED |
//! | [`CommissionEngine::on_event`] | host order and invoice events |
//!
//! Every operation either applies completely, audit entry included, or
//! leaves the order as it was.

pub mod engine;
pub mod events;
pub mod host;
pub mod order;
pub mod payment;
pub mod payouts;
pub mod prerequisite;

pub use engine::{CommissionEngine, HostServices};
pub use events::EventOutcome;
pub use host::{HostEvent, HostInvoice, InMemoryInvoices, InvoiceKind, InvoiceSource, InvoiceState, PostedInvoice};
pub use order::{InvoiceStatus, InvoiceSummary, NewOrder, OrderState, SaleOrder};
pub use payouts::PayoutLink;
pub use prerequisite::{pay_blockers, PayBlocker};
