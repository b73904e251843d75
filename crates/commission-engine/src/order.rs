//! # Sale Order Aggregate
//!
//! The commission bundle lives on the sale order: slot inputs, the last
//! breakdown, the lifecycle fields, and a memo of the order's posted
//! invoices. The breakdown is derived state; [`DirtyTracker`] records which
//! inputs changed since it was computed.

use std::fmt;

use commission_calc::{
    CommissionBreakdown, CommissionDependency, CommissionInputs, DirtyTracker, OrderLine, OrderSnapshot,
};
use commission_core::money::round_currency;
use commission_core::{CurrencyCode, SaleOrderId};
use commission_state::CommissionLifecycle;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::host::PostedInvoice;

/// Host state of the sale order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    #[default]
    Draft,
    Sent,
    Sale,
    Done,
    Cancel,
}

impl OrderState {
    /// `sale` or `done`.
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Sale | Self::Done)
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Sale => "sale",
            Self::Done => "done",
            Self::Cancel => "cancel",
        })
    }
}

/// Host invoicing status of the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    #[default]
    No,
    ToInvoice,
    Invoiced,
    Upselling,
}

/// Fields supplied when the host registers an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub name: String,
    #[serde(default)]
    pub state: OrderState,
    #[serde(default)]
    pub invoice_status: InvoiceStatus,
    pub lines: Vec<OrderLine>,
    pub untaxed_total: Decimal,
    /// Total including taxes.
    pub amount_total: Decimal,
    pub currency: CurrencyCode,
    #[serde(default)]
    pub commission: CommissionInputs,
}

/// Memo of the order's posted customer invoices.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InvoiceSummary {
    pub posted_count: usize,
    pub posted_untaxed: Decimal,
}

impl InvoiceSummary {
    pub fn from_posted(invoices: &[PostedInvoice]) -> Self {
        Self {
            posted_count: invoices.len(),
            posted_untaxed: round_currency(
                invoices
                    .iter()
                    .map(|i| i.untaxed_amount)
                    .fold(Decimal::ZERO, Decimal::saturating_add),
            ),
        }
    }

    pub fn has_posted(&self) -> bool {
        self.posted_count > 0
    }
}

/// A sale order with its commission bundle.
#[derive(Debug, Clone)]
pub struct SaleOrder {
    pub id: SaleOrderId,
    pub name: String,
    pub state: OrderState,
    pub invoice_status: InvoiceStatus,
    pub lines: Vec<OrderLine>,
    pub untaxed_total: Decimal,
    pub amount_total: Decimal,
    pub currency: CurrencyCode,
    pub inputs: CommissionInputs,
    pub breakdown: CommissionBreakdown,
    pub lifecycle: CommissionLifecycle,
    pub(crate) dirty: DirtyTracker,
    /// `None` until read, and again after any invoice event.
    pub(crate) invoices: Option<InvoiceSummary>,
}

impl SaleOrder {
    pub(crate) fn from_new(order: NewOrder) -> Self {
        let mut dirty = DirtyTracker::new();
        dirty.mark_all([CommissionDependency::OrderLines, CommissionDependency::UntaxedTotal]);
        Self {
            id: SaleOrderId::new(),
            name: order.name,
            state: order.state,
            invoice_status: order.invoice_status,
            lines: order.lines,
            untaxed_total: order.untaxed_total,
            amount_total: order.amount_total,
            currency: order.currency,
            inputs: order.commission,
            breakdown: CommissionBreakdown::default(),
            lifecycle: CommissionLifecycle::new(),
            dirty,
            invoices: None,
        }
    }

    /// The calculator's view of this order.
    pub fn snapshot(&self) -> OrderSnapshot {
        OrderSnapshot {
            name: self.name.clone(),
            lines: self.lines.clone(),
            untaxed_total: self.untaxed_total,
            currency: self.currency.clone(),
        }
    }

    /// Whether an input changed since the breakdown was computed.
    pub fn is_dirty(&self) -> bool {
        self.dirty.is_dirty()
    }

    /// The memoised invoice summary, if it is current.
    pub fn cached_invoices(&self) -> Option<&InvoiceSummary> {
        self.invoices.as_ref()
    }

    pub(crate) fn invalidate_invoices(&mut self) {
        self.invoices = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commission_core::InvoiceId;

    #[test]
    fn new_order_starts_dirty_with_empty_breakdown() {
        let order = SaleOrder::from_new(NewOrder {
            name: "S00001".into(),
            state: OrderState::Draft,
            invoice_status: InvoiceStatus::No,
            lines: vec![OrderLine::new("Unit", Decimal::ONE_HUNDRED, Decimal::ONE)],
            untaxed_total: Decimal::ONE_HUNDRED,
            amount_total: Decimal::ONE_HUNDRED,
            currency: CurrencyCode::new("AED").unwrap(),
            commission: CommissionInputs::default(),
        });
        assert!(order.is_dirty());
        assert!(order.breakdown.slots.is_empty());
        assert_eq!(order.snapshot().untaxed_total, Decimal::ONE_HUNDRED);
        assert!(order.cached_invoices().is_none());
    }

    #[test]
    fn invoice_summary_sums_posted_amounts() {
        let summary = InvoiceSummary::from_posted(&[
            PostedInvoice {
                id: InvoiceId::new(),
                untaxed_amount: "40.005".parse().unwrap(),
            },
            PostedInvoice {
                id: InvoiceId::new(),
                untaxed_amount: "60".parse().unwrap(),
            },
        ]);
        assert_eq!(summary.posted_count, 2);
        assert_eq!(summary.posted_untaxed, "100.01".parse::<Decimal>().unwrap());
        assert!(!InvoiceSummary::default().has_posted());
    }

    #[test]
    fn order_states_render_lowercase() {
        assert_eq!(OrderState::Sale.to_string(), "sale");
        assert!(OrderState::Done.is_confirmed());
        assert!(!OrderState::Sent.is_confirmed());
    }
}
