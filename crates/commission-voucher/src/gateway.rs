//! # Payment Gateway
//!
//! The host's ledger interface. Authorising a voucher asks the gateway to
//! create the payment; the returned reference is stored on the voucher as a
//! weak link. Leaving AUTHORIZE for anything but PAID voids it again, as
//! does a failure after the payment was created.

use std::sync::atomic::{AtomicU64, Ordering};

use commission_core::CommissionError;
use serde::{Deserialize, Serialize};

use crate::voucher::PaymentVoucher;

/// Reference of a ledger payment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentRef(pub String);

/// Creates ledger payments for authorised vouchers.
pub trait PaymentGateway: Send + Sync {
    fn create_payment(&self, voucher: &PaymentVoucher) -> Result<PaymentRef, CommissionError>;

    /// Withdraw a payment created by [`create_payment`](Self::create_payment).
    fn void_payment(&self, payment: &PaymentRef) -> Result<(), CommissionError>;
}

/// Gateway that numbers payments in memory.
#[derive(Debug, Default)]
pub struct InMemoryPaymentGateway {
    issued: AtomicU64,
    voided: AtomicU64,
}

impl InMemoryPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many payments have been created.
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }

    /// How many payments have been voided.
    pub fn voided(&self) -> u64 {
        self.voided.load(Ordering::SeqCst)
    }

    /// Payments created and not voided.
    pub fn outstanding(&self) -> u64 {
        self.issued().saturating_sub(self.voided())
    }
}

impl PaymentGateway for InMemoryPaymentGateway {
    fn create_payment(&self, voucher: &PaymentVoucher) -> Result<PaymentRef, CommissionError> {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PaymentRef(format!("PAY/{}/{n:06}", voucher.direction.prefix())))
    }

    fn void_payment(&self, payment: &PaymentRef) -> Result<(), CommissionError> {
        self.voided.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(payment = %payment.0, "payment voided");
        Ok(())
    }
}
