//! # Payment Voucher Record

use std::fmt;

use chrono::NaiveDate;
use commission_core::{CurrencyCode, JournalId, PartnerId, PayoutId, Timestamp, UserId, VoucherId};
use commission_state::{VoucherState, VoucherWorkflow};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::token::{QrPayload, VerificationToken};

/// Direction of the disbursement; each has its own number sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoucherDirection {
    /// Payment voucher, money leaving the company.
    #[default]
    Outbound,
    /// Receipt voucher, money coming in.
    Inbound,
}

impl VoucherDirection {
    /// Number prefix and sequence code.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Outbound => "PV",
            Self::Inbound => "RV",
        }
    }
}

impl fmt::Display for VoucherDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// One line of the append-only workflow history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowHistoryEntry {
    pub voucher: VoucherId,
    /// `None` for the creation entry.
    pub from_state: Option<VoucherState>,
    pub to_state: VoucherState,
    pub user: UserId,
    pub at: Timestamp,
    pub notes: Option<String>,
    pub ip: Option<String>,
}

/// Fields supplied when drafting a voucher.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewVoucher {
    pub direction: VoucherDirection,
    pub partner: Option<PartnerId>,
    pub amount: Decimal,
    pub currency: Option<CurrencyCode>,
    pub payment_date: Option<NaiveDate>,
    pub reference: Option<String>,
    pub memo: Option<String>,
    pub journal: Option<JournalId>,
    pub payout: Option<PayoutId>,
    /// Allow a payment date in the past at submit.
    pub backdate_override: bool,
}

/// A payment voucher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentVoucher {
    pub id: VoucherId,
    pub number: String,
    pub direction: VoucherDirection,
    pub partner: Option<PartnerId>,
    pub amount: Decimal,
    pub currency: Option<CurrencyCode>,
    pub payment_date: Option<NaiveDate>,
    pub reference: Option<String>,
    pub memo: Option<String>,
    pub journal: Option<JournalId>,
    /// The payout this voucher disburses, if drafted from one.
    pub payout: Option<PayoutId>,
    pub backdate_override: bool,
    pub workflow: VoucherWorkflow,
    pub creator: UserId,
    /// Moved the voucher from REVIEW to APPROVE.
    pub reviewer: Option<UserId>,
    /// Moved the voucher from APPROVE to AUTHORIZE.
    pub approver: Option<UserId>,
    /// Moved the voucher from AUTHORIZE to PAID.
    pub authorizer: Option<UserId>,
    pub created_at: Timestamp,
    pub submitted_at: Option<Timestamp>,
    pub reviewed_at: Option<Timestamp>,
    pub approved_at: Option<Timestamp>,
    pub paid_at: Option<Timestamp>,
    pub cancelled_at: Option<Timestamp>,
    pub verification_token: VerificationToken,
    pub qr_payload: String,
    /// Ledger payment created by the host on authorisation.
    pub payment_ref: Option<String>,
    pub history: Vec<WorkflowHistoryEntry>,
}

impl PaymentVoucher {
    pub fn state(&self) -> VoucherState {
        self.workflow.state
    }

    /// Re-derive the QR payload from the current fields.
    pub fn render_qr(&self, base_url: &str) -> String {
        QrPayload {
            number: &self.number,
            amount: self.amount,
            partner: self.partner,
            payment_date: self.payment_date,
            base_url,
            token: &self.verification_token,
        }
        .render()
    }

    /// Append a history entry, strictly later than the previous one.
    pub(crate) fn push_history(
        &mut self,
        from_state: Option<VoucherState>,
        to_state: VoucherState,
        user: UserId,
        notes: Option<String>,
        ip: Option<String>,
    ) -> Timestamp {
        let at = Timestamp::strictly_after(self.history.last().map(|h| h.at));
        self.history.push(WorkflowHistoryEntry {
            voucher: self.id,
            from_state,
            to_state,
            user,
            at,
            notes,
            ip,
        });
        at
    }

    /// Clear the approval trail when the voucher returns to DRAFT.
    pub(crate) fn clear_approvals(&mut self) {
        self.reviewer = None;
        self.approver = None;
        self.authorizer = None;
        self.submitted_at = None;
        self.reviewed_at = None;
        self.approved_at = None;
        self.cancelled_at = None;
    }
}
