//! # Host Interfaces
//!
//! What the engine needs from the ERP host: the posted customer invoices of
//! an order, and a stream of order-level events. Everything else (payouts,
//! vouchers, sequences) the engine owns itself.

use commission_core::{CommissionError, InvoiceId, SaleOrderId};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::order::InvoiceStatus;

// ─── Invoices ────────────────────────────────────────────────────────

/// A posted customer invoice as the engine sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostedInvoice {
    pub id: InvoiceId,
    pub untaxed_amount: Decimal,
}

/// Reads invoices from the host.
pub trait InvoiceSource: Send + Sync {
    /// Customer invoices of `order` in state posted. Vendor bills and
    /// refunds are excluded.
    fn posted_customer_invoices(&self, order: SaleOrderId) -> Result<Vec<PostedInvoice>, CommissionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceKind {
    CustomerInvoice,
    CustomerRefund,
    VendorBill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceState {
    Draft,
    Posted,
    Cancel,
}

/// An invoice held by [`InMemoryInvoices`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInvoice {
    pub id: InvoiceId,
    pub kind: InvoiceKind,
    pub state: InvoiceState,
    pub untaxed_amount: Decimal,
}

impl HostInvoice {
    /// A posted customer invoice.
    pub fn posted(untaxed_amount: Decimal) -> Self {
        Self {
            id: InvoiceId::new(),
            kind: InvoiceKind::CustomerInvoice,
            state: InvoiceState::Posted,
            untaxed_amount,
        }
    }
}

/// Invoice source kept in memory, for tests and offline runs.
#[derive(Debug, Default)]
pub struct InMemoryInvoices {
    invoices: DashMap<SaleOrderId, Vec<HostInvoice>>,
}

impl InMemoryInvoices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `invoice` to `order`. Returns its id.
    pub fn record(&self, order: SaleOrderId, invoice: HostInvoice) -> InvoiceId {
        let id = invoice.id;
        self.invoices.entry(order).or_default().push(invoice);
        id
    }

    /// Change the state of invoice `id`. Returns `false` when unknown.
    pub fn set_state(&self, order: SaleOrderId, id: InvoiceId, state: InvoiceState) -> bool {
        let Some(mut list) = self.invoices.get_mut(&order) else {
            return false;
        };
        match list.iter_mut().find(|i| i.id == id) {
            Some(invoice) => {
                invoice.state = state;
                true
            }
            None => false,
        }
    }
}

impl InvoiceSource for InMemoryInvoices {
    fn posted_customer_invoices(&self, order: SaleOrderId) -> Result<Vec<PostedInvoice>, CommissionError> {
        Ok(self
            .invoices
            .get(&order)
            .map(|list| {
                list.iter()
                    .filter(|i| i.kind == InvoiceKind::CustomerInvoice && i.state == InvoiceState::Posted)
                    .map(|i| PostedInvoice {
                        id: i.id,
                        untaxed_amount: i.untaxed_amount,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

// ─── Events ──────────────────────────────────────────────────────────

/// Order-level events raised by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    OrderConfirmed {
        order: SaleOrderId,
    },
    OrderCancelled {
        order: SaleOrderId,
    },
    /// `confirmed` answers the dialog shown when a payout is past DRAFT.
    OrderResetToDraft {
        order: SaleOrderId,
        confirmed: bool,
    },
    InvoicePosted {
        order: SaleOrderId,
        invoice: InvoiceId,
        untaxed_amount: Decimal,
    },
    InvoiceUnposted {
        order: SaleOrderId,
        invoice: InvoiceId,
    },
    InvoiceStatusChanged {
        order: SaleOrderId,
        status: InvoiceStatus,
    },
}

impl HostEvent {
    pub fn order(&self) -> SaleOrderId {
        match self {
            Self::OrderConfirmed { order }
            | Self::OrderCancelled { order }
            | Self::OrderResetToDraft { order, .. }
            | Self::InvoicePosted { order, .. }
            | Self::InvoiceUnposted { order, .. }
            | Self::InvoiceStatusChanged { order, .. } => *order,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::OrderConfirmed { .. } => "order_confirmed",
            Self::OrderCancelled { .. } => "order_cancelled",
            Self::OrderResetToDraft { .. } => "order_reset_to_draft",
            Self::InvoicePosted { .. } => "invoice_posted",
            Self::InvoiceUnposted { .. } => "invoice_unposted",
            Self::InvoiceStatusChanged { .. } => "invoice_status_changed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_posted_customer_invoices_are_reported() {
        let source = InMemoryInvoices::new();
        let order = SaleOrderId::new();
        let posted = source.record(order, HostInvoice::posted(Decimal::ONE_HUNDRED));
        source.record(
            order,
            HostInvoice {
                kind: InvoiceKind::VendorBill,
                ..HostInvoice::posted(Decimal::TEN)
            },
        );
        source.record(
            order,
            HostInvoice {
                state: InvoiceState::Draft,
                ..HostInvoice::posted(Decimal::TEN)
            },
        );
        let found = source.posted_customer_invoices(order).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, posted);

        assert!(source.set_state(order, posted, InvoiceState::Cancel));
        assert!(source.posted_customer_invoices(order).unwrap().is_empty());
        assert!(source.posted_customer_invoices(SaleOrderId::new()).unwrap().is_empty());
    }

    #[test]
    fn events_deserialize_from_tagged_json() {
        let order = SaleOrderId::new();
        let json = format!(r#"{{"event": "order_reset_to_draft", "order": "{}", "confirmed": true}}"#, order.0);
        let event: HostEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, HostEvent::OrderResetToDraft { order, confirmed: true });
        assert_eq!(event.name(), "order_reset_to_draft");
    }
}
