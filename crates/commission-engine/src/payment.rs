//! # Payout Generation
//!
//! CONFIRMED → PAID. Every prerequisite is checked against freshly read
//! invoices; failures are stored on the order as its blocked reason and
//! reported together. When nothing blocks, one payout is materialised per
//! beneficiary and the commission is marked paid.
//!
//! A bulk run is all-or-nothing: one blocked order aborts the whole batch
//! and no payout is kept for any of them.

use commission_core::{Actor, CommissionError, PayoutId, SaleOrderId};
use commission_payout::{materialise, PayoutDocument, PayoutOrigin};
use parking_lot::MutexGuard;

use crate::engine::CommissionEngine;
use crate::order::{InvoiceSummary, SaleOrder};
use crate::prerequisite::{pay_blockers, PayBlocker};

impl CommissionEngine {
    /// Generate the payouts of one confirmed order.
    pub fn pay(&self, id: SaleOrderId, actor: &Actor) -> Result<Vec<PayoutDocument>, CommissionError> {
        self.pay_orders(&[id], actor, "commission pay", false)
    }

    /// Generate the payouts of several confirmed orders at once.
    ///
    /// Each failure is reported as `"<order>: <reason>"`.
    pub fn pay_many(&self, ids: &[SaleOrderId], actor: &Actor) -> Result<Vec<PayoutDocument>, CommissionError> {
        self.pay_orders(ids, actor, "commission pay_many", true)
    }

    /// What currently prevents paying order `id`. Does not change state.
    pub fn pay_readiness(&self, id: SaleOrderId) -> Result<Vec<PayBlocker>, CommissionError> {
        self.transact(id, |order| {
            let invoices = self.invoice_summary_in(order)?;
            let live = self.payouts.live_for_origin(order.id).len();
            Ok(pay_blockers(order, &invoices, live, &self.config))
        })
    }

    /// The posted invoice summary of order `id`, read from the host when
    /// the memo is stale.
    pub fn invoice_summary(&self, id: SaleOrderId) -> Result<InvoiceSummary, CommissionError> {
        self.transact(id, |order| self.invoice_summary_in(order))
    }

    fn invoice_summary_in(&self, order: &mut SaleOrder) -> Result<InvoiceSummary, CommissionError> {
        match order.cached_invoices() {
            Some(summary) => Ok(summary.clone()),
            None => self.refresh_invoices(order),
        }
    }

    /// Reread the posted invoices of `order` and memoise them.
    pub(crate) fn refresh_invoices(&self, order: &mut SaleOrder) -> Result<InvoiceSummary, CommissionError> {
        let posted = self
            .invoices
            .posted_customer_invoices(order.id)
            .map_err(|err| CommissionError::upstream(format!("invoice lookup for {}", order.name), err))?;
        let summary = InvoiceSummary::from_posted(&posted);
        order.invoices = Some(summary.clone());
        Ok(summary)
    }

    fn pay_orders(
        &self,
        ids: &[SaleOrderId],
        actor: &Actor,
        transition: &'static str,
        bulk: bool,
    ) -> Result<Vec<PayoutDocument>, CommissionError> {
        let mut ids = ids.to_vec();
        ids.sort();
        ids.dedup();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let cells = ids
            .iter()
            .map(|id| self.cell(*id))
            .collect::<Result<Vec<_>, _>>()?;
        // Ascending id order.
        let mut guards: Vec<MutexGuard<'_, SaleOrder>> = cells.iter().map(|c| c.lock()).collect();

        // ── Prerequisites ───────────────────────────────────────────
        let mut failures = Vec::new();
        for guard in guards.iter_mut() {
            let order = &mut **guard;
            if let Err(err) = order.lifecycle.check_payable(&order.name) {
                if !bulk {
                    return Err(err);
                }
                failures.push(format!("{}: {}", order.name, err.conditions().join("; ")));
                continue;
            }
            let invoices = self.refresh_invoices(order)?;
            let live = self.payouts.live_for_origin(order.id).len();
            let blockers = pay_blockers(order, &invoices, live, &self.config);
            if blockers.is_empty() {
                order.lifecycle.blocked_reason = None;
                continue;
            }
            let lines: Vec<String> = blockers.iter().map(ToString::to_string).collect();
            order.lifecycle.blocked_reason = Some(lines.join("\n"));
            tracing::warn!(order = %order.name, blockers = lines.len(), "payout generation blocked");
            if bulk {
                failures.extend(lines.into_iter().map(|line| format!("{}: {line}", order.name)));
            } else {
                failures.extend(lines);
            }
        }
        if !failures.is_empty() {
            let object = if bulk {
                format!("{} orders", guards.len())
            } else {
                guards[0].name.clone()
            };
            return Err(CommissionError::validation(transition, object, failures));
        }

        // ── Materialise ─────────────────────────────────────────────
        let product = self.products.ensure(&self.config.commission_service_name);
        let mut drafts: Vec<SaleOrder> = guards.iter().map(|g| (**g).clone()).collect();
        let documents: Vec<PayoutDocument> = drafts
            .iter()
            .flat_map(|order| {
                let origin = PayoutOrigin {
                    order: order.id,
                    name: order.name.clone(),
                    currency: order.currency.clone(),
                };
                materialise(&origin, &order.breakdown, &product)
            })
            .collect();
        let emitted: Vec<PayoutId> = documents.iter().map(|d| d.id).collect();
        self.payouts.insert_batch(documents.clone())?;

        let marked = drafts.iter_mut().try_for_each(|order| {
            let record = order.lifecycle.pay(actor, &order.name)?;
            self.audit_commission(order, "pay", &record, actor)
        });
        if let Err(err) = marked {
            self.payouts.retract_batch(&emitted);
            tracing::error!(transition, error = %err, "payout generation rolled back");
            return Err(err);
        }

        for (guard, draft) in guards.iter_mut().zip(drafts) {
            let count = documents.iter().filter(|d| d.origin_sale_order == draft.id).count();
            tracing::info!(
                order = %draft.name,
                actor = %actor,
                payouts = count,
                total = %draft.breakdown.total_commission,
                "commission paid"
            );
            **guard = draft;
        }
        Ok(documents)
    }
}
