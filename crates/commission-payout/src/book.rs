//! # Payout Book
//!
//! In-memory store of payout documents backed by `DashMap`. Every
//! read-validate-update runs under the entry's write lock, so concurrent
//! transitions on one payout serialise.
//!
//! ## Cascades
//!
//! When the origin order is cancelled or reset, each of its live payouts is
//! handled by state:
//!
//! | state              | effect                                        |
//! |--------------------|-----------------------------------------------|
//! | `DRAFT`            | cancelled                                     |
//! | `SENT`, `APPROVED` | cancelled, with a note naming the cause       |
//! | `DONE`             | retained and reported for manual handling     |
//!
//! On a reset the payouts cancelled by the cascade are also removed from the
//! book, so a following `pay` starts from a clean slate.

use std::collections::HashSet;

use commission_core::money::round_currency;
use commission_core::{
    Actor, AuditEntry, AuditObject, AuditSink, CommissionError, CurrencyCode, PartnerId, PayoutId,
    SaleOrderId,
};
use commission_state::{PayoutState, TransitionRecord};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::document::PayoutDocument;

/// Why a cascade runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeCause {
    OriginCancelled,
    OriginReset,
    CommissionReset,
}

impl CascadeCause {
    /// Note appended to payouts cancelled past `DRAFT`.
    pub fn note(&self) -> &'static str {
        match self {
            Self::OriginCancelled => "Cancelled due to origin order cancellation",
            Self::OriginReset => "Cancelled due to origin order reset to draft",
            Self::CommissionReset => "Cancelled due to commission reset",
        }
    }

    /// Whether cancelled payouts are removed afterwards.
    pub fn destroys(&self) -> bool {
        matches!(self, Self::OriginReset | Self::CommissionReset)
    }
}

/// A `DONE` payout a cascade left alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetainedPayout {
    pub id: PayoutId,
    pub name: String,
    pub beneficiary: PartnerId,
    pub total: Decimal,
}

/// Outcome of a cascade.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeReport {
    /// Payouts moved to `CANCEL`, with the transition applied to each.
    pub cancelled: Vec<(PayoutId, TransitionRecord<PayoutState>)>,
    /// Payouts removed from the book after cancelling.
    pub destroyed: Vec<PayoutId>,
    /// `DONE` payouts that need a manual cancel.
    pub retained_done: Vec<RetainedPayout>,
}

impl CascadeReport {
    pub fn cancelled_count(&self) -> usize {
        self.cancelled.len()
    }

    pub fn has_retained(&self) -> bool {
        !self.retained_done.is_empty()
    }
}

/// One payout on a partner statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementLine {
    pub payout: PayoutId,
    pub name: String,
    pub origin_name: String,
    pub state: PayoutState,
    pub currency: CurrencyCode,
    pub amount: Decimal,
}

/// Live payouts of one beneficiary across all orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerStatement {
    pub partner: PartnerId,
    pub lines: Vec<StatementLine>,
    /// Per-currency totals, in order of first appearance.
    pub totals: Vec<(CurrencyCode, Decimal)>,
}

/// Concurrent store of payout documents.
pub struct PayoutBook {
    payouts: DashMap<PayoutId, PayoutDocument>,
}

impl PayoutBook {
    pub fn new() -> Self {
        Self {
            payouts: DashMap::new(),
        }
    }

    /// Insert every document or none.
    ///
    /// Fails with an integrity error when an id is already present or
    /// repeated within the batch.
    pub fn insert_batch(&self, documents: Vec<PayoutDocument>) -> Result<(), CommissionError> {
        let mut seen = HashSet::with_capacity(documents.len());
        for doc in &documents {
            if !seen.insert(doc.id) || self.payouts.contains_key(&doc.id) {
                return Err(CommissionError::Integrity(format!(
                    "payout {} already exists",
                    doc.id
                )));
            }
        }
        let mut inserted = Vec::with_capacity(documents.len());
        for doc in documents {
            let id = doc.id;
            // A racing insert of the same id between the check and here
            // rolls back what this batch inserted.
            if self.payouts.insert(id, doc).is_some() {
                for done in inserted {
                    self.payouts.remove(&done);
                }
                return Err(CommissionError::Integrity(format!("payout {id} already exists")));
            }
            inserted.push(id);
        }
        Ok(())
    }

    /// Take back a batch inserted by [`Self::insert_batch`] whose enclosing
    /// operation failed afterwards.
    pub fn retract_batch(&self, ids: &[PayoutId]) {
        for id in ids {
            self.payouts.remove(id);
        }
    }

    pub fn get(&self, id: &PayoutId) -> Option<PayoutDocument> {
        self.payouts.get(id).map(|r| r.value().clone())
    }

    /// Every payout of `order`, ordered by name.
    pub fn for_origin(&self, order: SaleOrderId) -> Vec<PayoutDocument> {
        let mut docs: Vec<_> = self
            .payouts
            .iter()
            .filter(|r| r.origin_sale_order == order)
            .map(|r| r.value().clone())
            .collect();
        docs.sort_by(|a, b| a.name.cmp(&b.name));
        docs
    }

    /// Smart-link count: every payout referencing `order`.
    pub fn count_for_origin(&self, order: SaleOrderId) -> usize {
        self.payouts
            .iter()
            .filter(|r| r.origin_sale_order == order)
            .count()
    }

    /// Payouts of `order` not in `CANCEL`.
    pub fn live_for_origin(&self, order: SaleOrderId) -> Vec<PayoutDocument> {
        self.for_origin(order)
            .into_iter()
            .filter(PayoutDocument::is_live)
            .collect()
    }

    /// Whether `order` has a live payout past `DRAFT`.
    pub fn has_progressed_payout(&self, order: SaleOrderId) -> bool {
        self.payouts.iter().any(|r| {
            r.origin_sale_order == order && r.is_live() && r.state() != PayoutState::Draft
        })
    }

    /// Apply an ordinary transition to one payout.
    ///
    /// The audit entry is written before the change is stored; if the sink
    /// fails the payout is left as it was.
    pub fn transition(
        &self,
        id: PayoutId,
        to: PayoutState,
        actor: &Actor,
        reason: &str,
        audit: &dyn AuditSink,
    ) -> Result<(PayoutDocument, TransitionRecord<PayoutState>), CommissionError> {
        let mut entry = self
            .payouts
            .get_mut(&id)
            .ok_or_else(|| CommissionError::NotFound(id.to_string()))?;
        let mut doc = entry.value().clone();
        let record = doc.lifecycle.transition(to, actor, &doc.name, reason)?;
        audit.record(audit_entry(&doc, verb(to), &record, actor))?;
        tracing::info!(payout = %doc.name, from = %record.from_state, to = %record.to_state, actor = %actor, "payout transition");
        *entry.value_mut() = doc.clone();
        Ok((doc, record))
    }

    /// Cancel a `DONE` payout. Requires `MANAGER`.
    pub fn cancel_done_manually(
        &self,
        id: PayoutId,
        actor: &Actor,
        reason: &str,
        audit: &dyn AuditSink,
    ) -> Result<(PayoutDocument, TransitionRecord<PayoutState>), CommissionError> {
        let mut entry = self
            .payouts
            .get_mut(&id)
            .ok_or_else(|| CommissionError::NotFound(id.to_string()))?;
        let mut doc = entry.value().clone();
        let record = doc.lifecycle.cancel_done(actor, &doc.name, reason)?;
        doc.notes.push(format!("Manually cancelled by {}: {reason}", actor.name));
        audit.record(audit_entry(&doc, "manual_cancel", &record, actor))?;
        tracing::warn!(payout = %doc.name, actor = %actor, "done payout cancelled manually");
        *entry.value_mut() = doc.clone();
        Ok((doc, record))
    }

    /// Cancel the live payouts of `order` per the cascade rules.
    ///
    /// A payout whose audit entry cannot be written is left untouched and
    /// logged; the cascade carries on with the others.
    pub fn cascade_cancel(
        &self,
        order: SaleOrderId,
        cause: CascadeCause,
        actor: &Actor,
        audit: &dyn AuditSink,
    ) -> CascadeReport {
        let mut report = CascadeReport::default();
        let ids: Vec<PayoutId> = self
            .payouts
            .iter()
            .filter(|r| r.origin_sale_order == order)
            .map(|r| *r.key())
            .collect();

        for id in ids {
            let Some(mut entry) = self.payouts.get_mut(&id) else {
                continue;
            };
            let mut doc = entry.value().clone();
            let state = doc.state();
            if state == PayoutState::Done {
                tracing::warn!(payout = %doc.name, origin = %doc.origin_name, "done payout retained; manual cancel required");
                report.retained_done.push(RetainedPayout {
                    id,
                    name: doc.name.clone(),
                    beneficiary: doc.beneficiary,
                    total: doc.total(),
                });
                continue;
            }
            if !state.is_auto_cancellable() {
                continue;
            }
            let applied = doc
                .lifecycle
                .transition(PayoutState::Cancel, actor, &doc.name, cause.note())
                .and_then(|record| {
                    audit.record(audit_entry(&doc, "cascade_cancel", &record, actor).with_note(cause.note()))?;
                    Ok(record)
                });
            match applied {
                Ok(record) => {
                    if state != PayoutState::Draft {
                        doc.notes.push(cause.note().to_string());
                    }
                    *entry.value_mut() = doc;
                    report.cancelled.push((id, record));
                }
                Err(err) => {
                    tracing::warn!(payout = %doc.name, error = %err, "cascade could not cancel payout");
                }
            }
        }

        if cause.destroys() {
            for (id, _) in &report.cancelled {
                if self.payouts.remove(id).is_some() {
                    report.destroyed.push(*id);
                }
            }
        }
        report
    }

    /// Remove every `CANCEL` payout of `order`. Returns the removed ids.
    pub fn purge_cancelled(&self, order: SaleOrderId) -> Vec<PayoutId> {
        let ids: Vec<PayoutId> = self
            .payouts
            .iter()
            .filter(|r| r.origin_sale_order == order && !r.is_live())
            .map(|r| *r.key())
            .collect();
        ids.into_iter()
            .filter(|id| self.payouts.remove(id).is_some())
            .collect()
    }

    /// Live payouts addressed to `partner` across all orders.
    pub fn statement(&self, partner: PartnerId) -> PartnerStatement {
        let mut lines: Vec<StatementLine> = self
            .payouts
            .iter()
            .filter(|r| r.beneficiary == partner && r.is_live())
            .map(|r| StatementLine {
                payout: r.id,
                name: r.name.clone(),
                origin_name: r.origin_name.clone(),
                state: r.state(),
                currency: r.currency.clone(),
                amount: r.total(),
            })
            .collect();
        lines.sort_by(|a, b| a.name.cmp(&b.name));

        let mut totals: Vec<(CurrencyCode, Decimal)> = Vec::new();
        for line in &lines {
            match totals.iter_mut().find(|(c, _)| *c == line.currency) {
                Some((_, sum)) => *sum = round_currency(sum.saturating_add(line.amount)),
                None => totals.push((line.currency.clone(), line.amount)),
            }
        }
        PartnerStatement {
            partner,
            lines,
            totals,
        }
    }

    pub fn len(&self) -> usize {
        self.payouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payouts.is_empty()
    }
}

impl Default for PayoutBook {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PayoutBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayoutBook")
            .field("payouts_count", &self.payouts.len())
            .finish()
    }
}

fn audit_entry(
    doc: &PayoutDocument,
    transition: &str,
    record: &TransitionRecord<PayoutState>,
    actor: &Actor,
) -> AuditEntry {
    AuditEntry::new(AuditObject::Payout, &doc.name, transition, record.from_state, record.to_state, actor)
        .with_note(record.reason.clone())
        .with_timestamp(record.timestamp)
}

fn verb(to: PayoutState) -> &'static str {
    match to {
        PayoutState::Draft => "draft",
        PayoutState::Sent => "send",
        PayoutState::Approved => "approve",
        PayoutState::Done => "complete",
        PayoutState::Cancel => "cancel",
    }
}
