//! # Host Events
//!
//! Reactions to order-level events raised by the host. Confirming an order
//! may trigger an automatic calculation whose failure never blocks the
//! confirmation. Cancelling or resetting an order cascades to its payouts.

use commission_calc::CommissionBreakdown;
use commission_core::{Actor, CommissionError};
use commission_payout::{CascadeCause, CascadeReport};
use commission_state::CommissionStatus;

use crate::engine::{clear_computed, CommissionEngine};
use crate::host::HostEvent;
use crate::order::OrderState;

/// What the engine did with an event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    /// The order was confirmed and its commission calculated.
    Calculated(CommissionBreakdown),
    /// The order was confirmed; no calculation was due.
    CalculationSkipped,
    /// The order was confirmed; the calculation failed and its reason is
    /// stored as the blocked reason.
    CalculationFailed(String),
    Cancelled(CascadeReport),
    Reset(CascadeReport),
    /// The invoice memo was dropped.
    InvoicesInvalidated,
}

impl CommissionEngine {
    /// Apply a host event. Every change is made by the system actor.
    pub fn on_event(&self, event: &HostEvent) -> Result<EventOutcome, CommissionError> {
        let system = Actor::system();
        let actor = &system;
        tracing::debug!(event = event.name(), order = %event.order(), "host event");
        match event {
            HostEvent::OrderConfirmed { order } => self.transact(*order, |order| {
                order.state = OrderState::Sale;
                order.invalidate_invoices();
                if !self.config.auto_calculate_on_confirm || !order.lifecycle.status.accepts_edits() {
                    return Ok(EventOutcome::CalculationSkipped);
                }
                let before = order.clone();
                match self.calculate_in(order, actor) {
                    Ok(breakdown) => Ok(EventOutcome::Calculated(breakdown)),
                    Err(err) => {
                        *order = before;
                        let reason = err.to_string();
                        tracing::warn!(order = %order.name, error = %reason, "automatic calculation failed");
                        order.lifecycle.blocked_reason = Some(reason.clone());
                        Ok(EventOutcome::CalculationFailed(reason))
                    }
                }
            }),

            HostEvent::OrderCancelled { order } => self.transact(*order, |order| {
                order.state = OrderState::Cancel;
                let report = self.cascade(order, CascadeCause::OriginCancelled, actor);
                if let Some(record) = order
                    .lifecycle
                    .cancel_for_origin(actor, "Cancelled due to origin order cancellation")
                {
                    self.audit_commission(order, "origin_cancel", &record, actor)?;
                }
                tracing::info!(
                    order = %order.name,
                    payouts_cancelled = report.cancelled_count(),
                    "order cancelled"
                );
                Ok(EventOutcome::Cancelled(report))
            }),

            HostEvent::OrderResetToDraft { order, confirmed } => self.transact(*order, |order| {
                if self.payouts.has_progressed_payout(order.id) && !confirmed {
                    return Err(CommissionError::precondition(
                        "order reset",
                        &order.name,
                        "payouts past DRAFT exist; confirm the reset to cancel them",
                    ));
                }
                order.state = OrderState::Draft;
                if order.lifecycle.status != CommissionStatus::Draft {
                    let record = order.lifecycle.reopen(actor, "Origin order reset to draft");
                    self.audit_commission(order, "origin_reset", &record, actor)?;
                }
                clear_computed(order);
                let report = self.cascade(order, CascadeCause::OriginReset, actor);
                tracing::info!(
                    order = %order.name,
                    payouts_cancelled = report.cancelled_count(),
                    payouts_removed = report.destroyed.len(),
                    "order reset to draft"
                );
                Ok(EventOutcome::Reset(report))
            }),

            HostEvent::InvoicePosted { order, .. } | HostEvent::InvoiceUnposted { order, .. } => {
                self.transact(*order, |order| {
                    order.invalidate_invoices();
                    Ok(EventOutcome::InvoicesInvalidated)
                })
            }

            HostEvent::InvoiceStatusChanged { order, status } => self.transact(*order, |order| {
                order.invoice_status = *status;
                order.invalidate_invoices();
                Ok(EventOutcome::InvoicesInvalidated)
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use commission_calc::{BeneficiarySlot, CommissionInputs, CommissionType, OrderLine, SlotAssignment};
    use commission_core::{Capability, CurrencyCode, EngineConfig, ErrorKind, PartnerId, SaleOrderId, UserId};
    use commission_state::PayoutState;
    use rust_decimal::Decimal;

    use super::*;
    use crate::engine::HostServices;
    use crate::host::{HostInvoice, InMemoryInvoices};
    use crate::order::{InvoiceStatus, NewOrder};

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn manager() -> Actor {
        Actor::new(UserId::new(), "Mo").with_capability(Capability::Manager)
    }

    fn new_order(rate: &str) -> NewOrder {
        NewOrder {
            name: "S00020".into(),
            state: OrderState::Draft,
            invoice_status: InvoiceStatus::No,
            lines: vec![OrderLine::new("Unit", dec("1000"), Decimal::ONE)],
            untaxed_total: dec("1000"),
            amount_total: dec("1000"),
            currency: CurrencyCode::new("AED").unwrap(),
            commission: CommissionInputs::default().with_slot(
                BeneficiarySlot::Broker,
                SlotAssignment::percent(PartnerId::new(), CommissionType::UntaxedTotal, dec(rate)),
            ),
        }
    }

    fn paid_engine() -> (CommissionEngine, SaleOrderId) {
        let invoices = Arc::new(InMemoryInvoices::new());
        let engine = CommissionEngine::new(
            EngineConfig::default(),
            HostServices {
                invoices: invoices.clone(),
                ..HostServices::default()
            },
        );
        let id = engine.register_order(new_order("5")).unwrap();
        engine.on_event(&HostEvent::OrderConfirmed { order: id }).unwrap();
        engine.confirm(id, &manager()).unwrap();
        invoices.record(id, HostInvoice::posted(dec("1000")));
        engine.pay(id, &manager()).unwrap();
        (engine, id)
    }

    #[test]
    fn confirming_the_order_calculates() {
        let engine = CommissionEngine::in_memory(EngineConfig::default());
        let id = engine.register_order(new_order("5")).unwrap();
        let outcome = engine.on_event(&HostEvent::OrderConfirmed { order: id }).unwrap();
        let EventOutcome::Calculated(breakdown) = outcome else {
            panic!("expected a calculation, got {outcome:?}");
        };
        assert_eq!(breakdown.amount(BeneficiarySlot::Broker), dec("50"));
        let order = engine.order(id).unwrap();
        assert_eq!(order.state, OrderState::Sale);
        assert_eq!(order.lifecycle.status, CommissionStatus::Calculated);
    }

    #[test]
    fn failed_auto_calculation_does_not_block_confirmation() {
        let engine = CommissionEngine::in_memory(EngineConfig::default());
        let id = engine.register_order(new_order("5")).unwrap();
        // Negative rates are rejected once the bundle is recalculated.
        engine.transact(id, |order| {
            order.inputs.set(
                BeneficiarySlot::Broker,
                SlotAssignment::percent(PartnerId::new(), CommissionType::UntaxedTotal, dec("-5")),
            );
            Ok(())
        })
        .unwrap();
        let outcome = engine.on_event(&HostEvent::OrderConfirmed { order: id }).unwrap();
        assert!(matches!(outcome, EventOutcome::CalculationFailed(_)));
        let order = engine.order(id).unwrap();
        assert_eq!(order.state, OrderState::Sale);
        assert_eq!(order.lifecycle.status, CommissionStatus::Draft);
        assert!(order.lifecycle.blocked_reason.is_some());
    }

    #[test]
    fn cancelling_the_order_cancels_commission_and_payouts() {
        let (engine, id) = paid_engine();
        let outcome = engine.on_event(&HostEvent::OrderCancelled { order: id }).unwrap();
        let EventOutcome::Cancelled(report) = outcome else {
            panic!("expected a cascade, got {outcome:?}");
        };
        assert_eq!(report.cancelled_count(), 1);
        assert!(report.destroyed.is_empty());
        assert_eq!(engine.order(id).unwrap().lifecycle.status, CommissionStatus::Cancelled);
        let payouts = engine.payouts().for_origin(id);
        assert_eq!(payouts[0].state(), PayoutState::Cancel);
    }

    #[test]
    fn reset_with_progressed_payout_needs_confirmation() {
        let (engine, id) = paid_engine();
        let payout = engine.payouts().for_origin(id)[0].id;
        engine.transition_payout(payout, PayoutState::Sent, &manager(), "sent").unwrap();

        let err = engine
            .on_event(&HostEvent::OrderResetToDraft { order: id, confirmed: false })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Precondition);
        assert_eq!(engine.order(id).unwrap().lifecycle.status, CommissionStatus::Paid);

        let outcome = engine
            .on_event(&HostEvent::OrderResetToDraft { order: id, confirmed: true })
            .unwrap();
        assert!(matches!(outcome, EventOutcome::Reset(ref r) if r.destroyed.len() == 1));
        let order = engine.order(id).unwrap();
        assert_eq!(order.lifecycle.status, CommissionStatus::Draft);
        assert!(!order.lifecycle.processed);
        assert!(order.breakdown.is_zero());
        assert_eq!(engine.payouts().count_for_origin(id), 0);
    }

    #[test]
    fn invoice_events_drop_the_memo() {
        let engine = CommissionEngine::in_memory(EngineConfig::default());
        let id = engine.register_order(new_order("5")).unwrap();
        engine.invoice_summary(id).unwrap();
        assert!(engine.order(id).unwrap().cached_invoices().is_some());
        engine
            .on_event(&HostEvent::InvoiceStatusChanged {
                order: id,
                status: InvoiceStatus::Invoiced,
            })
            .unwrap();
        let order = engine.order(id).unwrap();
        assert!(order.cached_invoices().is_none());
        assert_eq!(order.invoice_status, InvoiceStatus::Invoiced);
    }
}
