//! # Payout Documents

use commission_calc::BeneficiarySlot;
use commission_core::money::round_currency;
use commission_core::{CurrencyCode, PartnerId, PayoutId, ProductId, SaleOrderId, Timestamp};
use commission_state::{PayoutLifecycle, PayoutState};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One line of a payout document: the commission of one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutLine {
    /// The slot the amount came from.
    pub slot: BeneficiarySlot,
    /// `"<ROLE_LABEL> Commission for <sale order name>"`.
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub product: ProductId,
}

impl PayoutLine {
    pub fn subtotal(&self) -> Decimal {
        round_currency(self.quantity.saturating_mul(self.unit_price))
    }
}

/// A vendor-side payable addressed to one beneficiary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutDocument {
    pub id: PayoutId,
    /// Display reference, unique per origin.
    pub name: String,
    pub beneficiary: PartnerId,
    pub origin_sale_order: SaleOrderId,
    pub origin_name: String,
    pub currency: CurrencyCode,
    pub lines: Vec<PayoutLine>,
    /// Role label of the only line; `None` once lines are grouped.
    pub commission_type_label: Option<String>,
    pub lifecycle: PayoutLifecycle,
    pub notes: Vec<String>,
    pub created_at: Timestamp,
}

impl PayoutDocument {
    pub fn state(&self) -> PayoutState {
        self.lifecycle.state
    }

    /// Sum of line subtotals.
    pub fn total(&self) -> Decimal {
        round_currency(
            self.lines
                .iter()
                .map(PayoutLine::subtotal)
                .fold(Decimal::ZERO, Decimal::saturating_add),
        )
    }

    pub fn is_live(&self) -> bool {
        self.state().is_live()
    }
}
