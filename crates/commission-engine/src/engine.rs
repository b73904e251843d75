//! # Commission Engine
//!
//! Owns every sale order's commission bundle and drives its lifecycle.
//!
//! ## Transactions
//!
//! Orders are stored as `Arc<Mutex<SaleOrder>>`; the mutex is the row lock.
//! An operation locks the order, mutates a clone, writes the audit entry,
//! and only then stores the clone back. Any error on the way leaves the
//! stored order exactly as it was. Operations on several orders lock them
//! in ascending id order.

use std::fmt;
use std::sync::Arc;

use commission_calc::{
    BeneficiarySlot, Calculator, CommissionBreakdown, CommissionDependency, CommissionType, OrderLine,
    SlotAssignment, Validator,
};
use commission_core::sequence::next_with_retry;
use commission_core::{
    Actor, AtomicSequences, AuditEntry, AuditObject, AuditSink, CommissionError, EngineConfig,
    InMemoryAuditLog, SaleOrderId, SequenceAllocator, SequenceFormat,
};
use commission_payout::{CascadeCause, CascadeReport, CommissionServiceRegistry, PayoutBook};
use commission_state::{CommissionStateError, CommissionStatus, TransitionRecord};
use commission_voucher::{
    InMemoryDirectory, InMemoryNotifier, InMemoryPaymentGateway, Notifier, PaymentGateway, UserDirectory,
    VoucherRegistry, VoucherSettings,
};
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::host::{InMemoryInvoices, InvoiceSource};
use crate::order::{NewOrder, SaleOrder};

// ─── Host Services ───────────────────────────────────────────────────

/// The pluggable collaborators of the engine.
pub struct HostServices {
    pub invoices: Arc<dyn InvoiceSource>,
    pub audit: Arc<dyn AuditSink>,
    pub sequences: Arc<dyn SequenceAllocator>,
    pub notifier: Arc<dyn Notifier>,
    pub directory: Arc<dyn UserDirectory>,
    pub gateway: Arc<dyn PaymentGateway>,
}

impl Default for HostServices {
    fn default() -> Self {
        Self {
            invoices: Arc::new(InMemoryInvoices::new()),
            audit: Arc::new(InMemoryAuditLog::new()),
            sequences: Arc::new(AtomicSequences::new()),
            notifier: Arc::new(InMemoryNotifier::new()),
            directory: Arc::new(InMemoryDirectory::default()),
            gateway: Arc::new(InMemoryPaymentGateway::new()),
        }
    }
}

// ─── Engine ──────────────────────────────────────────────────────────

/// The commission engine.
pub struct CommissionEngine {
    pub(crate) config: EngineConfig,
    pub(crate) calculator: Calculator,
    pub(crate) validator: Validator,
    pub(crate) orders: DashMap<SaleOrderId, Arc<Mutex<SaleOrder>>>,
    pub(crate) payouts: PayoutBook,
    pub(crate) products: CommissionServiceRegistry,
    pub(crate) vouchers: VoucherRegistry,
    pub(crate) sequences: Arc<dyn SequenceAllocator>,
    pub(crate) invoices: Arc<dyn InvoiceSource>,
    pub(crate) audit: Arc<dyn AuditSink>,
}

impl CommissionEngine {
    /// An engine over `host`. `config` is expected to be validated.
    pub fn new(config: EngineConfig, host: HostServices) -> Self {
        let vouchers = VoucherRegistry::new(
            VoucherSettings::from(&config),
            Arc::clone(&host.sequences),
            Arc::clone(&host.audit),
        )
        .with_notifier(host.notifier)
        .with_directory(host.directory)
        .with_gateway(host.gateway);
        Self {
            calculator: Calculator::from_config(&config),
            validator: Validator::from_config(&config),
            config,
            orders: DashMap::new(),
            payouts: PayoutBook::new(),
            products: CommissionServiceRegistry::new(),
            vouchers,
            sequences: host.sequences,
            invoices: host.invoices,
            audit: host.audit,
        }
    }

    /// An engine with in-memory host services.
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::new(config, HostServices::default())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn payouts(&self) -> &PayoutBook {
        &self.payouts
    }

    pub fn vouchers(&self) -> &VoucherRegistry {
        &self.vouchers
    }

    pub fn products(&self) -> &CommissionServiceRegistry {
        &self.products
    }

    // ── Orders ──────────────────────────────────────────────────────

    /// Register a host order and compute its initial breakdown.
    pub fn register_order(&self, order: NewOrder) -> Result<SaleOrderId, CommissionError> {
        let mut order = SaleOrder::from_new(order);
        self.recompute(&mut order, "order register")?;
        let id = order.id;
        tracing::info!(order = %order.name, id = %id, "order registered");
        self.orders.insert(id, Arc::new(Mutex::new(order)));
        Ok(id)
    }

    /// A copy of the stored order.
    pub fn order(&self, id: SaleOrderId) -> Option<SaleOrder> {
        let cell = self.orders.get(&id).map(|c| Arc::clone(c.value()))?;
        let order = cell.lock().clone();
        Some(order)
    }

    /// The current breakdown, recomputed first if an input changed.
    pub fn breakdown(&self, id: SaleOrderId) -> Result<CommissionBreakdown, CommissionError> {
        self.transact(id, |order| {
            if order.is_dirty() && order.lifecycle.status.accepts_edits() {
                self.recompute(order, "commission read")?;
            }
            Ok(order.breakdown.clone())
        })
    }

    // ── Bundle inputs ───────────────────────────────────────────────

    /// Place `assignment` in `slot`. An empty assignment clears the slot.
    pub fn set_slot(
        &self,
        id: SaleOrderId,
        slot: BeneficiarySlot,
        assignment: SlotAssignment,
        actor: &Actor,
    ) -> Result<CommissionBreakdown, CommissionError> {
        self.transact(id, |order| {
            require_editable(order, "commission edit")?;
            order.inputs.set(slot, assignment);
            order.dirty.mark(CommissionDependency::Slot(slot));
            self.recompute(order, "commission edit")?;
            tracing::debug!(order = %order.name, slot = %slot, actor = %actor, "slot updated");
            Ok(order.breakdown.clone())
        })
    }

    /// Change the method used by slots without an explicit type.
    pub fn set_calculation_method(
        &self,
        id: SaleOrderId,
        method: CommissionType,
        actor: &Actor,
    ) -> Result<CommissionBreakdown, CommissionError> {
        self.transact(id, |order| {
            require_editable(order, "commission edit")?;
            order.inputs.calculation_method_default = method;
            order.dirty.mark(CommissionDependency::CalculationMethodDefault);
            self.recompute(order, "commission edit")?;
            tracing::debug!(order = %order.name, method = ?method, actor = %actor, "calculation method updated");
            Ok(order.breakdown.clone())
        })
    }

    /// Replace the order lines and totals, as the host does on edit.
    ///
    /// Edits are not lifecycle transitions and write no audit entry.
    pub fn set_lines(
        &self,
        id: SaleOrderId,
        lines: Vec<OrderLine>,
        untaxed_total: Decimal,
        amount_total: Decimal,
        actor: &Actor,
    ) -> Result<(), CommissionError> {
        self.transact(id, |order| {
            require_unfrozen(order, "order update")?;
            order.lines = lines;
            order.untaxed_total = untaxed_total;
            order.amount_total = amount_total;
            order
                .dirty
                .mark_all([CommissionDependency::OrderLines, CommissionDependency::UntaxedTotal]);
            if order.lifecycle.status.accepts_edits() {
                self.recompute(order, "order update")?;
            }
            tracing::debug!(order = %order.name, lines = order.lines.len(), actor = %actor, "order lines updated");
            Ok(())
        })
    }

    /// Change the untaxed and tax-inclusive totals.
    pub fn set_untaxed(
        &self,
        id: SaleOrderId,
        untaxed_total: Decimal,
        amount_total: Decimal,
        actor: &Actor,
    ) -> Result<(), CommissionError> {
        self.transact(id, |order| {
            require_unfrozen(order, "order update")?;
            order.untaxed_total = untaxed_total;
            order.amount_total = amount_total;
            order.dirty.mark(CommissionDependency::UntaxedTotal);
            if order.lifecycle.status.accepts_edits() {
                self.recompute(order, "order update")?;
            }
            tracing::debug!(order = %order.name, untaxed = %untaxed_total, actor = %actor, "order totals updated");
            Ok(())
        })
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// DRAFT|CALCULATED → CALCULATED.
    pub fn calculate(&self, id: SaleOrderId, actor: &Actor) -> Result<CommissionBreakdown, CommissionError> {
        self.transact(id, |order| self.calculate_in(order, actor))
    }

    /// CALCULATED → CONFIRMED. Allocates the commission number on the
    /// first confirm.
    pub fn confirm(&self, id: SaleOrderId, actor: &Actor) -> Result<String, CommissionError> {
        const T: &str = "commission confirm";
        self.transact(id, |order| {
            if order.lifecycle.status != CommissionStatus::Calculated {
                return Err(CommissionStateError::InvalidTransition {
                    from: order.lifecycle.status,
                    to: CommissionStatus::Confirmed,
                }
                .into_error(T, &order.name));
            }
            if order.is_dirty() {
                self.recompute(order, T)?;
            }
            self.validator
                .validate(&order.breakdown)
                .map_err(|violations| violations.into_error(T, &order.name))?;

            let format = SequenceFormat::new(
                self.config.commission_sequence_prefix.as_str(),
                self.config.sequence_padding,
            );
            let record = order.lifecycle.confirm(actor, &order.name, || {
                let value = next_with_retry(self.sequences.as_ref(), &self.config.commission_sequence_prefix)?;
                Ok(format.render(value))
            })?;
            self.audit_commission(order, "confirm", &record, actor)?;

            let sequence = order.lifecycle.sequence.clone().unwrap_or_default();
            tracing::info!(
                order = %order.name,
                from = %record.from_state,
                to = %record.to_state,
                actor = %actor,
                sequence = %sequence,
                "commission confirmed"
            );
            Ok(sequence)
        })
    }

    /// Any state but PAID → DRAFT. Cancels and removes the order's
    /// non-DONE payouts and zeroes every computed amount.
    pub fn reset(&self, id: SaleOrderId, actor: &Actor, reason: &str) -> Result<CascadeReport, CommissionError> {
        self.transact(id, |order| {
            let record = order.lifecycle.reset(actor, &order.name, reason)?;
            self.audit_commission(order, "reset", &record, actor)?;
            clear_computed(order);
            let report = self.cascade(order, CascadeCause::CommissionReset, actor);
            tracing::info!(
                order = %order.name,
                from = %record.from_state,
                to = %record.to_state,
                actor = %actor,
                payouts_cancelled = report.cancelled_count(),
                "commission reset"
            );
            Ok(report)
        })
    }

    /// CALCULATED|CONFIRMED|PAID → CANCELLED. Requires `ADMIN`.
    pub fn reject(&self, id: SaleOrderId, actor: &Actor, note: &str) -> Result<(), CommissionError> {
        self.transact(id, |order| {
            let record = order.lifecycle.reject(actor, &order.name, note)?;
            self.audit_commission(order, "reject", &record, actor)?;
            tracing::info!(
                order = %order.name,
                from = %record.from_state,
                to = %record.to_state,
                actor = %actor,
                "commission rejected"
            );
            Ok(())
        })
    }

    // ── Internals ───────────────────────────────────────────────────

    pub(crate) fn cell(&self, id: SaleOrderId) -> Result<Arc<Mutex<SaleOrder>>, CommissionError> {
        self.orders
            .get(&id)
            .map(|c| Arc::clone(c.value()))
            .ok_or_else(|| CommissionError::NotFound(id.to_string()))
    }

    /// Run `f` on a clone of order `id` under its lock; store the clone
    /// only if `f` succeeds.
    pub(crate) fn transact<T>(
        &self,
        id: SaleOrderId,
        f: impl FnOnce(&mut SaleOrder) -> Result<T, CommissionError>,
    ) -> Result<T, CommissionError> {
        let cell = self.cell(id)?;
        let mut stored = cell.lock();
        let mut draft = stored.clone();
        let out = f(&mut draft)?;
        *stored = draft;
        Ok(out)
    }

    pub(crate) fn calculate_in(&self, order: &mut SaleOrder, actor: &Actor) -> Result<CommissionBreakdown, CommissionError> {
        const T: &str = "commission calc";
        if !order.lifecycle.status.accepts_edits() {
            return Err(CommissionStateError::InvalidTransition {
                from: order.lifecycle.status,
                to: CommissionStatus::Calculated,
            }
            .into_error(T, &order.name));
        }
        self.recompute(order, T)?;
        let record = order.lifecycle.mark_calculated(actor, &order.name)?;
        self.audit_commission(order, "calc", &record, actor)?;
        tracing::info!(
            order = %order.name,
            from = %record.from_state,
            to = %record.to_state,
            actor = %actor,
            total = %order.breakdown.total_commission,
            status = %order.breakdown.allocation_status,
            "commission calculated"
        );
        Ok(order.breakdown.clone())
    }

    /// Recompute the breakdown. Hard violations reject the change.
    pub(crate) fn recompute(&self, order: &mut SaleOrder, transition: &str) -> Result<(), CommissionError> {
        let breakdown = self.calculator.calculate(&order.snapshot(), &order.inputs);
        self.validator
            .validate_hard(&breakdown)
            .map_err(|violations| violations.into_error(transition, &order.name))?;
        let changed = order.dirty.take();
        tracing::debug!(order = %order.name, changed = ?changed, "breakdown recomputed");
        order.breakdown = breakdown;
        Ok(())
    }

    pub(crate) fn audit_commission(
        &self,
        order: &SaleOrder,
        transition: &str,
        record: &TransitionRecord<CommissionStatus>,
        actor: &Actor,
    ) -> Result<(), CommissionError> {
        self.audit.record(
            AuditEntry::new(
                AuditObject::Commission,
                &order.name,
                transition,
                record.from_state,
                record.to_state,
                actor,
            )
            .with_note(record.reason.clone())
            .with_timestamp(record.timestamp),
        )
    }

    /// Cancel the order's payouts for `cause`.
    pub(crate) fn cascade(&self, order: &SaleOrder, cause: CascadeCause, actor: &Actor) -> CascadeReport {
        let report = self
            .payouts
            .cascade_cancel(order.id, cause, actor, self.audit.as_ref());
        if report.has_retained() {
            tracing::warn!(
                order = %order.name,
                retained = report.retained_done.len(),
                "done payouts were not cancelled; cancel them manually"
            );
        }
        report
    }
}

impl fmt::Debug for CommissionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommissionEngine")
            .field("orders_count", &self.orders.len())
            .field("payouts", &self.payouts)
            .field("vouchers", &self.vouchers)
            .finish_non_exhaustive()
    }
}

fn require_editable(order: &SaleOrder, transition: &str) -> Result<(), CommissionError> {
    if order.lifecycle.status.accepts_edits() {
        Ok(())
    } else {
        Err(CommissionStateError::WrongState {
            state: order.lifecycle.status,
            action: "editing the bundle",
            required: "DRAFT or CALCULATED",
        }
        .into_error(transition, &order.name))
    }
}

fn require_unfrozen(order: &SaleOrder, transition: &str) -> Result<(), CommissionError> {
    if order.lifecycle.status.is_frozen() {
        Err(CommissionStateError::WrongState {
            state: order.lifecycle.status,
            action: "changing order amounts",
            required: "a commission that is not CONFIRMED or PAID",
        }
        .into_error(transition, &order.name))
    } else {
        Ok(())
    }
}

/// Zero every computed amount; the next calculation recomputes.
pub(crate) fn clear_computed(order: &mut SaleOrder) {
    order.breakdown = order.breakdown.zeroed();
    order.dirty.take();
    order.invalidate_invoices();
}

#[cfg(test)]
mod tests {
    use commission_calc::{AllocationStatus, CommissionInputs};
    use commission_core::{Capability, CurrencyCode, ErrorKind, PartnerId, UserId};

    use super::*;
    use crate::order::{InvoiceStatus, OrderState};

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn clerk() -> Actor {
        Actor::new(UserId::new(), "Cleo")
    }

    fn order(untaxed: &str) -> NewOrder {
        NewOrder {
            name: "S00100".into(),
            state: OrderState::Sale,
            invoice_status: InvoiceStatus::ToInvoice,
            lines: vec![OrderLine::new("Unit", dec(untaxed), Decimal::ONE)],
            untaxed_total: dec(untaxed),
            amount_total: dec(untaxed),
            currency: CurrencyCode::new("AED").unwrap(),
            commission: CommissionInputs::default(),
        }
    }

    fn broker(rate: &str) -> SlotAssignment {
        SlotAssignment::percent(PartnerId::new(), CommissionType::UntaxedTotal, dec(rate))
    }

    #[test]
    fn slot_edit_recomputes_breakdown() {
        let engine = CommissionEngine::in_memory(EngineConfig::default());
        let id = engine.register_order(order("1000")).unwrap();
        let breakdown = engine
            .set_slot(id, BeneficiarySlot::Broker, broker("3"), &clerk())
            .unwrap();
        assert_eq!(breakdown.total_commission, dec("30"));
        assert_eq!(breakdown.company_share, dec("970"));
        assert_eq!(breakdown.allocation_status, AllocationStatus::Under);

        engine.set_untaxed(id, dec("2000"), dec("2000"), &clerk()).unwrap();
        assert_eq!(engine.breakdown(id).unwrap().total_commission, dec("60"));
    }

    #[test]
    fn hard_violation_rejects_the_edit() {
        let engine = CommissionEngine::in_memory(EngineConfig::default());
        let id = engine.register_order(order("1000")).unwrap();
        engine.set_slot(id, BeneficiarySlot::Broker, broker("3"), &clerk()).unwrap();
        let err = engine
            .set_slot(id, BeneficiarySlot::Broker, broker("120"), &clerk())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let stored = engine.order(id).unwrap();
        assert_eq!(stored.breakdown.total_commission, dec("30"));
    }

    #[test]
    fn confirm_assigns_sequence_once() {
        let engine = CommissionEngine::in_memory(EngineConfig::default());
        let id = engine.register_order(order("1000")).unwrap();
        engine.set_slot(id, BeneficiarySlot::Broker, broker("3"), &clerk()).unwrap();

        let err = engine.confirm(id, &clerk()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Precondition);

        engine.calculate(id, &clerk()).unwrap();
        let first = engine.confirm(id, &clerk()).unwrap();
        assert_eq!(first, "COMM00001");

        engine.reset(id, &clerk(), "rework").unwrap();
        engine.calculate(id, &clerk()).unwrap();
        assert_eq!(engine.confirm(id, &clerk()).unwrap(), first);
    }

    #[test]
    fn confirmed_bundle_is_frozen() {
        let engine = CommissionEngine::in_memory(EngineConfig::default());
        let id = engine.register_order(order("1000")).unwrap();
        engine.set_slot(id, BeneficiarySlot::Broker, broker("3"), &clerk()).unwrap();
        engine.calculate(id, &clerk()).unwrap();
        engine.confirm(id, &clerk()).unwrap();

        let err = engine
            .set_slot(id, BeneficiarySlot::Broker, broker("4"), &clerk())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Precondition);
        assert!(engine.set_untaxed(id, dec("10"), dec("10"), &clerk()).is_err());
        assert_eq!(engine.order(id).unwrap().untaxed_total, dec("1000"));
    }

    #[test]
    fn reset_zeroes_and_returns_to_draft() {
        let engine = CommissionEngine::in_memory(EngineConfig::default());
        let id = engine.register_order(order("1000")).unwrap();
        engine.set_slot(id, BeneficiarySlot::Broker, broker("3"), &clerk()).unwrap();
        engine.calculate(id, &clerk()).unwrap();

        let report = engine.reset(id, &clerk(), "start over").unwrap();
        assert_eq!(report.cancelled_count(), 0);
        let stored = engine.order(id).unwrap();
        assert_eq!(stored.lifecycle.status, CommissionStatus::Draft);
        assert!(stored.breakdown.is_zero());
        assert!(stored.lifecycle.sequence.is_none());
    }

    #[test]
    fn reject_needs_admin() {
        let engine = CommissionEngine::in_memory(EngineConfig::default());
        let id = engine.register_order(order("1000")).unwrap();
        engine.set_slot(id, BeneficiarySlot::Broker, broker("3"), &clerk()).unwrap();
        engine.calculate(id, &clerk()).unwrap();

        let err = engine.reject(id, &clerk(), "wrong partner").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permission);

        let admin = Actor::new(UserId::new(), "Ada").with_capability(Capability::Admin);
        engine.reject(id, &admin, "wrong partner").unwrap();
        assert_eq!(engine.order(id).unwrap().lifecycle.status, CommissionStatus::Cancelled);
    }

    #[test]
    fn every_transition_is_audited() {
        let log = Arc::new(InMemoryAuditLog::new());
        let engine = CommissionEngine::new(
            EngineConfig::default(),
            HostServices {
                audit: log.clone(),
                ..HostServices::default()
            },
        );
        let id = engine.register_order(order("1000")).unwrap();
        engine.set_slot(id, BeneficiarySlot::Broker, broker("3"), &clerk()).unwrap();
        engine.calculate(id, &clerk()).unwrap();
        engine.confirm(id, &clerk()).unwrap();
        assert!(engine.reject(id, &clerk(), "no").is_err());

        let entries = log.for_object("S00100");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].transition, "confirm");
    }

    #[test]
    fn order_edits_recompute_without_audit_entries() {
        let log = Arc::new(InMemoryAuditLog::new());
        let engine = CommissionEngine::new(
            EngineConfig::default(),
            HostServices {
                audit: log.clone(),
                ..HostServices::default()
            },
        );
        let id = engine.register_order(order("1000")).unwrap();
        engine.set_slot(id, BeneficiarySlot::Broker, broker("3"), &clerk()).unwrap();
        engine
            .set_lines(
                id,
                vec![OrderLine::new("Unit", dec("1500"), Decimal::ONE)],
                dec("1500"),
                dec("1575"),
                &clerk(),
            )
            .unwrap();
        assert_eq!(engine.breakdown(id).unwrap().total_commission, dec("45"));
        engine.set_untaxed(id, dec("500"), dec("525"), &clerk()).unwrap();
        assert_eq!(engine.breakdown(id).unwrap().total_commission, dec("15"));
        assert!(log.for_object("S00100").is_empty());
    }

    #[test]
    fn extreme_rate_is_rejected_without_panicking() {
        let engine = CommissionEngine::in_memory(EngineConfig::default());
        let mut new = order("1000");
        new.commission = CommissionInputs::default().with_slot(
            BeneficiarySlot::Broker,
            SlotAssignment::percent(PartnerId::new(), CommissionType::UntaxedTotal, Decimal::MAX),
        );
        let err = engine.register_order(new).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.conditions().iter().any(|c| c.starts_with("AMOUNT_OVERFLOW")));

        let id = engine.register_order(order("1000")).unwrap();
        let edit = SlotAssignment::percent(PartnerId::new(), CommissionType::UntaxedTotal, Decimal::MAX);
        let err = engine
            .set_slot(id, BeneficiarySlot::Broker, edit, &clerk())
            .unwrap_err();
        assert!(err.conditions().iter().any(|c| c.starts_with("RATE_OUT_OF_RANGE")));
        assert!(engine.breakdown(id).unwrap().slot(BeneficiarySlot::Broker).is_none());
    }

    #[test]
    fn unknown_order_is_not_found() {
        let engine = CommissionEngine::in_memory(EngineConfig::default());
        let err = engine.calculate(SaleOrderId::new(), &clerk()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
