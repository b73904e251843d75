//! # Commission Calculator
//!
//! Maps each populated slot's `(type, rate, fixed)` to an amount and sums
//! the rounded amounts into the aggregates.
//!
//! ## Per-slot rule
//!
//! | type            | amount                      |
//! |-----------------|-----------------------------|
//! | `PRICE_UNIT`    | `round(rate / 100 × P)`     |
//! | `UNTAXED_TOTAL` | `round(rate / 100 × base)`  |
//! | `FIXED`         | `round(fixed)`              |
//!
//! `base` is `U` for external slots. For internal slots it is `U` under
//! [`InternalBaseMode::OrderTotal`] and `max(U - total_external, 0)` under
//! [`InternalBaseMode::CompanyShareAfterExternal`], which is why external
//! slots are always computed first.
//!
//! When a percentage slot carries a non-zero amount, the amount wins and
//! the effective rate is inferred as `amount / base × 100`. The inference
//! only flows from amount to rate and is never written back to the inputs,
//! so recalculation cannot oscillate.
//!
//! Arithmetic is checked. A slot whose amount does not fit in a `Decimal`
//! is published as zero and flagged, and overflowing aggregates saturate
//! and flag the breakdown; the validator turns either flag into a hard
//! violation.

use commission_core::money::{checked_sum, percent_of, percentage, round_currency};
use commission_core::{EngineConfig, InternalBaseMode};
use rust_decimal::Decimal;

use crate::breakdown::{AllocationStatus, CommissionBreakdown, RateSource, SlotAmount};
use crate::order::OrderSnapshot;
use crate::slot::{BeneficiarySlot, CommissionInputs, CommissionType, SlotAssignment, SlotSide};

/// The subset of [`EngineConfig`] the calculator reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalcSettings {
    pub internal_base_mode: InternalBaseMode,
    pub strict_single_order_line: bool,
    pub tolerance: Decimal,
    pub clamp_over_allocation: bool,
}

impl Default for CalcSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for CalcSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            internal_base_mode: config.internal_base_mode,
            strict_single_order_line: config.strict_single_order_line,
            tolerance: config.calc_tolerance,
            clamp_over_allocation: config.clamp_over_allocation,
        }
    }
}

/// Stateless commission calculator.
#[derive(Debug, Clone, Default)]
pub struct Calculator {
    settings: CalcSettings,
}

impl Calculator {
    pub fn new(settings: CalcSettings) -> Self {
        Self { settings }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(CalcSettings::from(config))
    }

    pub fn settings(&self) -> &CalcSettings {
        &self.settings
    }

    /// Compute the breakdown of `inputs` against `order`.
    ///
    /// Pure: equal arguments always produce equal breakdowns. Violations
    /// are not raised here; run the result through the validator.
    pub fn calculate(&self, order: &OrderSnapshot, inputs: &CommissionInputs) -> CommissionBreakdown {
        let untaxed = order.untaxed_base();
        let price_unit = order.price_unit_base(self.settings.strict_single_order_line);
        let base_overflowed = price_unit.is_none();
        let price_unit = price_unit.unwrap_or(Decimal::ZERO);

        let mut slots = Vec::with_capacity(inputs.slots.len());
        for (slot, assignment) in inputs.slots.iter().filter(|(s, _)| s.side() == SlotSide::External) {
            slots.push(self.compute_slot(*slot, assignment, inputs, untaxed, price_unit));
        }
        let total_external = slots
            .iter()
            .fold(Decimal::ZERO, |acc, s: &SlotAmount| acc.saturating_add(s.amount));

        let internal_base = match self.settings.internal_base_mode {
            InternalBaseMode::OrderTotal => untaxed,
            InternalBaseMode::CompanyShareAfterExternal => {
                round_currency(untaxed.saturating_sub(total_external).max(Decimal::ZERO))
            }
        };
        for (slot, assignment) in inputs.slots.iter().filter(|(s, _)| s.side() == SlotSide::Internal) {
            slots.push(self.compute_slot(*slot, assignment, inputs, internal_base, price_unit));
        }
        slots.sort_by_key(|s| s.slot);

        for entry in slots.iter().filter(|s| s.partner.is_none() && !s.amount.is_zero()) {
            tracing::warn!(
                order = %order.name,
                slot = %entry.slot,
                amount = %entry.amount,
                "slot has an amount but no partner; it will not be paid out"
            );
        }

        let mut breakdown = self.aggregate(slots, untaxed, price_unit, internal_base, order.lines.len());
        breakdown.overflowed |= base_overflowed;
        if breakdown.has_overflow() {
            tracing::warn!(order = %order.name, "commission amounts exceed the representable range");
        }
        if self.settings.clamp_over_allocation && breakdown.allocation_status == AllocationStatus::Over {
            clamp(&mut breakdown);
            tracing::warn!(
                order = %order.name,
                total = %breakdown.raw_total(),
                untaxed = %untaxed,
                "over-allocated commission clamped to the untaxed total"
            );
        }
        tracing::debug!(
            order = %order.name,
            total_external = %breakdown.total_external,
            total_internal = %breakdown.total_internal,
            status = %breakdown.allocation_status,
            "commission calculated"
        );
        breakdown
    }

    fn compute_slot(
        &self,
        slot: BeneficiarySlot,
        assignment: &SlotAssignment,
        inputs: &CommissionInputs,
        untaxed_base: Decimal,
        price_unit: Decimal,
    ) -> SlotAmount {
        let commission_type = inputs.effective_type(assignment);
        let base = match commission_type {
            CommissionType::PriceUnit => price_unit,
            CommissionType::UntaxedTotal => untaxed_base,
            CommissionType::Fixed => Decimal::ZERO,
        };
        let entered_amount = assignment.fixed_amount.filter(|a| !a.is_zero());

        let (rate, rate_source, amount, overflowed) = match (commission_type, entered_amount) {
            (CommissionType::Fixed, _) => (
                None,
                RateSource::NotApplicable,
                round_currency(assignment.fixed_amount.unwrap_or(Decimal::ZERO)),
                false,
            ),
            (_, Some(entered)) => {
                let amount = round_currency(entered);
                let rate = percentage(amount, base);
                let overflowed = rate.is_none() && !base.is_zero();
                (rate, RateSource::InferredFromAmount, amount, overflowed)
            }
            (_, None) => {
                let rate = assignment.rate.unwrap_or(Decimal::ZERO);
                match percent_of(rate, base) {
                    Some(amount) => (Some(rate), RateSource::Entered, round_currency(amount), false),
                    None => (Some(rate), RateSource::Entered, round_currency(Decimal::ZERO), true),
                }
            }
        };

        SlotAmount {
            slot,
            partner: assignment.partner,
            commission_type,
            base,
            rate,
            rate_source,
            amount,
            overflowed,
        }
    }

    fn aggregate(
        &self,
        slots: Vec<SlotAmount>,
        untaxed: Decimal,
        price_unit: Decimal,
        internal_base: Decimal,
        line_count: usize,
    ) -> CommissionBreakdown {
        let mut overflowed = false;
        let mut checked = |value: Option<Decimal>, saturated: Decimal| -> Decimal {
            value.map(round_currency).unwrap_or_else(|| {
                overflowed = true;
                saturated
            })
        };
        let side_sum = |side: SlotSide| {
            checked_sum(slots.iter().filter(|s| s.slot.side() == side).map(|s| s.amount))
        };
        let total_external = checked(side_sum(SlotSide::External), Decimal::MAX);
        let total_internal = checked(side_sum(SlotSide::Internal), Decimal::MAX);
        let total_commission = checked(total_external.checked_add(total_internal), Decimal::MAX);
        let company_share = checked(untaxed.checked_sub(total_commission), Decimal::MIN);
        let variance = checked(total_commission.checked_sub(untaxed), Decimal::MAX);

        CommissionBreakdown {
            slots,
            untaxed_total: untaxed,
            price_unit_base: price_unit,
            internal_base,
            line_count,
            total_external,
            total_internal,
            total_commission,
            company_share,
            net_company_share: company_share,
            commission_percentage: commission_percentage(total_commission, untaxed),
            allocation_status: AllocationStatus::classify(total_commission, untaxed, self.settings.tolerance),
            variance,
            clamped: false,
            overflowed,
        }
    }
}

/// `total / untaxed × 100` at currency precision; zero on a zero base.
fn commission_percentage(total: Decimal, untaxed: Decimal) -> Decimal {
    round_currency(percentage(total, untaxed).unwrap_or(Decimal::ZERO))
}

/// Publish `total = untaxed` and a zero company share. Slot amounts, the
/// allocation status and the variance keep describing the real allocation.
fn clamp(breakdown: &mut CommissionBreakdown) {
    let zero = round_currency(Decimal::ZERO);
    breakdown.total_commission = breakdown.untaxed_total;
    breakdown.company_share = zero;
    breakdown.net_company_share = zero;
    breakdown.commission_percentage =
        commission_percentage(breakdown.total_commission, breakdown.untaxed_total);
    breakdown.clamped = true;
}
