//! # Payout Prerequisites
//!
//! Conditions checked before a CONFIRMED commission may move to PAID. Every
//! failing condition is reported, each on its own line, and the lines are
//! stored as the order's blocked reason.

use commission_core::EngineConfig;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::order::{InvoiceStatus, InvoiceSummary, OrderState, SaleOrder};

/// One unmet payout prerequisite.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayBlocker {
    #[error("Order must be confirmed (sale or done), but it is {state}")]
    OrderNotConfirmed { state: OrderState },

    #[error("Order total must be positive, got {total:.2}")]
    NonPositiveTotal { total: Decimal },

    #[error("No posted customer invoices found")]
    NoPostedInvoices,

    #[error("Order is not fully invoiced: {invoiced:.2} of {untaxed:.2} posted")]
    NotFullyInvoiced { invoiced: Decimal, untaxed: Decimal },

    #[error("Commission already processed; payouts were generated")]
    AlreadyProcessed,

    #[error("{count} payout(s) from an earlier run are not cancelled")]
    PayoutsOutstanding { count: usize },

    #[error("No beneficiary has both a partner and a positive commission amount")]
    NoPayableBeneficiary,
}

/// Every unmet prerequisite of paying `order`, in a fixed order.
///
/// `invoices` must be freshly read from the host. `live_payouts` counts the
/// order's payouts that are not cancelled; a DONE payout survives a reset,
/// so it is checked alongside the processed flag.
pub fn pay_blockers(
    order: &SaleOrder,
    invoices: &InvoiceSummary,
    live_payouts: usize,
    config: &EngineConfig,
) -> Vec<PayBlocker> {
    let mut blockers = Vec::new();

    if !order.state.is_confirmed() {
        blockers.push(PayBlocker::OrderNotConfirmed { state: order.state });
    }
    if order.amount_total <= Decimal::ZERO {
        blockers.push(PayBlocker::NonPositiveTotal {
            total: order.amount_total,
        });
    }
    if config.require_posted_invoices_for_payout {
        if !invoices.has_posted() {
            blockers.push(PayBlocker::NoPostedInvoices);
        }
        let fully_invoiced = order.invoice_status == InvoiceStatus::Invoiced
            || invoices.posted_untaxed >= order.untaxed_total.saturating_sub(config.calc_tolerance);
        if !fully_invoiced {
            blockers.push(PayBlocker::NotFullyInvoiced {
                invoiced: invoices.posted_untaxed,
                untaxed: order.untaxed_total,
            });
        }
    }
    if order.lifecycle.processed {
        blockers.push(PayBlocker::AlreadyProcessed);
    }
    if live_payouts > 0 {
        blockers.push(PayBlocker::PayoutsOutstanding { count: live_payouts });
    }
    if !order.breakdown.has_payable_beneficiary() {
        blockers.push(PayBlocker::NoPayableBeneficiary);
    }
    blockers
}
