//! # commission-voucher — Payment Voucher Workflow
//!
//! A voucher wraps a scheduled disbursement in a four-stage approval
//! workflow. It is independent of the ledger payment that materialises when
//! it is authorised.
//!
//! - **Voucher** (`voucher.rs`): the voucher record, its direction
//!   (`PV` outbound, `RV` inbound) and the append-only workflow history.
//!
//! - **Token** (`token.rs`): the verification token minted once at
//!   creation, the QR payload derived from the voucher, and payload
//!   fingerprints.
//!
//! - **Activity** (`activity.rs`): open to-dos for the holders of the
//!   next-step capability, notifications, and the user directory.
//!
//! - **Gateway** (`gateway.rs`): the host's payment interface, called on
//!   authorisation.
//!
//! - **Registry** (`registry.rs`): the voucher service. Creation, edits,
//!   gated transitions, and verification by token or scanned payload.
//!
//! ## Crate Policy
//!
//! - The verification token never changes after creation.
//! - Voucher numbers are allocated once, at creation, and never reused.
//! - History entries are append-only with strictly increasing timestamps.

pub mod activity;
pub mod gateway;
pub mod registry;
pub mod token;
pub mod voucher;

pub use activity::{
    Activity, ActivityBoard, InMemoryDirectory, InMemoryNotifier, Notification, Notifier,
    UserDirectory,
};
pub use gateway::{InMemoryPaymentGateway, PaymentGateway, PaymentRef};
pub use registry::{
    SubmitBlocker, TransitionContext, VerificationOutcome, VoucherPatch, VoucherRegistry, VoucherSettings,
    VoucherView,
};
pub use token::{fingerprint, QrPayload, VerificationToken};
pub use voucher::{NewVoucher, PaymentVoucher, VoucherDirection, WorkflowHistoryEntry};
