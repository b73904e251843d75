//! Payout and voucher operations that start from an order or a payout.

use chrono::NaiveDate;
use commission_core::{Actor, CommissionError, JournalId, PartnerId, PayoutId, SaleOrderId};
use commission_payout::{PartnerStatement, PayoutDocument};
use commission_state::{PayoutState, TransitionRecord};
use commission_voucher::{NewVoucher, PaymentVoucher, VoucherDirection};
use serde::Serialize;

use crate::engine::CommissionEngine;

/// The payouts linked from an order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayoutLink {
    pub order: SaleOrderId,
    /// Every payout referencing the order, cancelled ones included.
    pub count: usize,
    pub payouts: Vec<PayoutDocument>,
}

impl CommissionEngine {
    pub fn payout_link(&self, order: SaleOrderId) -> Result<PayoutLink, CommissionError> {
        self.cell(order)?;
        let payouts = self.payouts.for_origin(order);
        Ok(PayoutLink {
            order,
            count: payouts.len(),
            payouts,
        })
    }

    /// Move a payout along its own lifecycle.
    pub fn transition_payout(
        &self,
        id: PayoutId,
        to: PayoutState,
        actor: &Actor,
        reason: &str,
    ) -> Result<PayoutDocument, CommissionError> {
        let (doc, _) = self.payouts.transition(id, to, actor, reason, self.audit.as_ref())?;
        Ok(doc)
    }

    /// Cancel a DONE payout. Requires `MANAGER`.
    pub fn cancel_done_payout(
        &self,
        id: PayoutId,
        actor: &Actor,
        reason: &str,
    ) -> Result<(PayoutDocument, TransitionRecord<PayoutState>), CommissionError> {
        self.payouts.cancel_done_manually(id, actor, reason, self.audit.as_ref())
    }

    /// Live payouts addressed to `partner`.
    pub fn partner_statement(&self, partner: PartnerId) -> PartnerStatement {
        self.payouts.statement(partner)
    }

    /// Draft a payment voucher that disburses payout `id`.
    pub fn create_voucher_for_payout(
        &self,
        id: PayoutId,
        actor: &Actor,
        journal: Option<JournalId>,
        payment_date: Option<NaiveDate>,
    ) -> Result<PaymentVoucher, CommissionError> {
        let payout = self
            .payouts
            .get(&id)
            .ok_or_else(|| CommissionError::NotFound(id.to_string()))?;
        if !payout.is_live() {
            return Err(CommissionError::precondition(
                "voucher create",
                &payout.name,
                "payout is cancelled",
            ));
        }
        let voucher = self.vouchers.create(
            NewVoucher {
                direction: VoucherDirection::Outbound,
                partner: Some(payout.beneficiary),
                amount: payout.total(),
                currency: Some(payout.currency.clone()),
                payment_date,
                reference: Some(payout.name.clone()),
                memo: Some(format!("Commission payout for {}", payout.origin_name)),
                journal,
                payout: Some(payout.id),
                backdate_override: false,
            },
            actor,
        )?;
        tracing::info!(payout = %payout.name, voucher = %voucher.number, "voucher drafted from payout");
        Ok(voucher)
    }
}
