//! # Commission Breakdown
//!
//! The derived half of a commission bundle: one [`SlotAmount`] per populated
//! slot plus the aggregates. Every aggregate is a sum of already-rounded
//! slot amounts, so the published totals reconcile exactly with what is
//! displayed per slot.

use std::fmt;

use commission_core::PartnerId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::slot::{BeneficiarySlot, CommissionType, SlotSide};

/// Classification of total commission against the untaxed base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationStatus {
    /// `total < untaxed - ε`.
    #[default]
    Under,
    /// `|untaxed - total| ≤ ε`.
    Full,
    /// `total > untaxed + ε`.
    Over,
}

impl AllocationStatus {
    /// Classify `total` against `untaxed` under tolerance `epsilon`.
    pub fn classify(total: Decimal, untaxed: Decimal, epsilon: Decimal) -> Self {
        let diff = untaxed.saturating_sub(total);
        if diff.abs() <= epsilon {
            Self::Full
        } else if diff > epsilon {
            Self::Under
        } else {
            Self::Over
        }
    }
}

impl fmt::Display for AllocationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Under => "UNDER",
            Self::Full => "FULL",
            Self::Over => "OVER",
        })
    }
}

/// Where a slot's effective rate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RateSource {
    /// The rate was entered and the amount derived from it.
    Entered,
    /// An amount was entered on a percentage type; the rate was derived.
    InferredFromAmount,
    /// `FIXED` slots have no rate.
    NotApplicable,
}

/// The computed amount of one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotAmount {
    pub slot: BeneficiarySlot,
    pub partner: Option<PartnerId>,
    /// Effective type after applying the calculation method default.
    pub commission_type: CommissionType,
    /// The base the rate applies to (zero for `FIXED`).
    pub base: Decimal,
    /// Effective percentage. Unrounded when inferred.
    pub rate: Option<Decimal>,
    pub rate_source: RateSource,
    /// Rounded to currency precision. Zero when `overflowed`.
    pub amount: Decimal,
    /// The amount does not fit in a `Decimal`.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub overflowed: bool,
}

impl SlotAmount {
    /// Whether this slot yields a payout line.
    pub fn is_payable(&self) -> bool {
        self.partner.is_some() && self.amount > Decimal::ZERO
    }
}

/// Per-slot amounts and aggregates of one calculation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommissionBreakdown {
    /// Populated slots in canonical slot order.
    pub slots: Vec<SlotAmount>,
    /// `U`.
    pub untaxed_total: Decimal,
    /// `P`.
    pub price_unit_base: Decimal,
    /// Base used by internal `UNTAXED_TOTAL` slots.
    pub internal_base: Decimal,
    pub line_count: usize,
    pub total_external: Decimal,
    pub total_internal: Decimal,
    pub total_commission: Decimal,
    pub company_share: Decimal,
    pub net_company_share: Decimal,
    pub commission_percentage: Decimal,
    pub allocation_status: AllocationStatus,
    /// `total_commission - untaxed_total`; positive means over-allocated.
    pub variance: Decimal,
    /// The published totals were clamped to the untaxed total.
    pub clamped: bool,
    /// An aggregate did not fit in a `Decimal` and was saturated.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub overflowed: bool,
}

impl CommissionBreakdown {
    /// The computed amount of `slot`, zero when unpopulated.
    pub fn amount(&self, slot: BeneficiarySlot) -> Decimal {
        self.slot(slot).map(|s| s.amount).unwrap_or(Decimal::ZERO)
    }

    /// The computed entry of `slot`.
    pub fn slot(&self, slot: BeneficiarySlot) -> Option<&SlotAmount> {
        self.slots.iter().find(|s| s.slot == slot)
    }

    /// Slots with a partner and a positive amount, in canonical order.
    pub fn payable_slots(&self) -> impl Iterator<Item = &SlotAmount> {
        self.slots.iter().filter(|s| s.is_payable())
    }

    /// Whether at least one slot would yield a payout line.
    pub fn has_payable_beneficiary(&self) -> bool {
        self.payable_slots().next().is_some()
    }

    /// Sum of the slot amounts on one side, saturating.
    pub fn side_total(&self, side: SlotSide) -> Decimal {
        saturating_sum(self.slots.iter().filter(|s| s.slot.side() == side).map(|s| s.amount))
    }

    /// Sum of every slot amount, independent of any clamp. Saturating.
    pub fn raw_total(&self) -> Decimal {
        saturating_sum(self.slots.iter().map(|s| s.amount))
    }

    /// Whether any slot or aggregate left the representable range.
    pub fn has_overflow(&self) -> bool {
        self.overflowed || self.slots.iter().any(|s| s.overflowed)
    }

    /// The breakdown with every computed amount and aggregate zeroed.
    ///
    /// Slot entries keep their partner and type so the bundle still shows
    /// who is assigned; rates and bases are cleared.
    pub fn zeroed(&self) -> Self {
        let zero = commission_core::round_currency(Decimal::ZERO);
        Self {
            slots: self
                .slots
                .iter()
                .map(|s| SlotAmount {
                    base: zero,
                    rate: None,
                    rate_source: match s.commission_type {
                        CommissionType::Fixed => RateSource::NotApplicable,
                        _ => RateSource::Entered,
                    },
                    amount: zero,
                    overflowed: false,
                    ..s.clone()
                })
                .collect(),
            untaxed_total: self.untaxed_total,
            price_unit_base: self.price_unit_base,
            internal_base: zero,
            line_count: self.line_count,
            total_external: zero,
            total_internal: zero,
            total_commission: zero,
            company_share: zero,
            net_company_share: zero,
            commission_percentage: zero,
            allocation_status: AllocationStatus::default(),
            variance: zero,
            clamped: false,
            overflowed: false,
        }
    }

    /// Whether every computed amount is zero.
    pub fn is_zero(&self) -> bool {
        self.slots.iter().all(|s| s.amount.is_zero())
            && self.total_commission.is_zero()
            && self.company_share.is_zero()
    }
}

fn saturating_sum(values: impl Iterator<Item = Decimal>) -> Decimal {
    values.fold(Decimal::ZERO, |acc, value| acc.saturating_add(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn classify_full_within_tolerance() {
        let eps = dec("0.01");
        assert_eq!(AllocationStatus::classify(dec("99.99"), dec("100.00"), eps), AllocationStatus::Full);
        assert_eq!(AllocationStatus::classify(dec("100.01"), dec("100.00"), eps), AllocationStatus::Full);
        assert_eq!(AllocationStatus::classify(dec("99.98"), dec("100.00"), eps), AllocationStatus::Under);
        assert_eq!(AllocationStatus::classify(dec("100.02"), dec("100.00"), eps), AllocationStatus::Over);
    }

    #[test]
    fn zero_commission_on_zero_base_is_full() {
        assert_eq!(
            AllocationStatus::classify(Decimal::ZERO, Decimal::ZERO, dec("0.01")),
            AllocationStatus::Full
        );
    }

    #[test]
    fn payable_requires_partner_and_amount() {
        let mut entry = SlotAmount {
            slot: BeneficiarySlot::Broker,
            partner: None,
            commission_type: CommissionType::Fixed,
            base: Decimal::ZERO,
            rate: None,
            rate_source: RateSource::NotApplicable,
            amount: dec("10.00"),
            overflowed: false,
        };
        assert!(!entry.is_payable());
        entry.partner = Some(PartnerId::new());
        assert!(entry.is_payable());
        entry.amount = Decimal::ZERO;
        assert!(!entry.is_payable());
    }

    #[test]
    fn zeroed_keeps_assignments() {
        let partner = PartnerId::new();
        let breakdown = CommissionBreakdown {
            slots: vec![SlotAmount {
                slot: BeneficiarySlot::Manager,
                partner: Some(partner),
                commission_type: CommissionType::UntaxedTotal,
                base: dec("100.00"),
                rate: Some(dec("5")),
                rate_source: RateSource::Entered,
                amount: dec("5.00"),
                overflowed: false,
            }],
            untaxed_total: dec("100.00"),
            total_internal: dec("5.00"),
            total_commission: dec("5.00"),
            company_share: dec("95.00"),
            ..CommissionBreakdown::default()
        };
        let zeroed = breakdown.zeroed();
        assert!(zeroed.is_zero());
        assert_eq!(zeroed.slots[0].partner, Some(partner));
        assert_eq!(zeroed.amount(BeneficiarySlot::Manager), Decimal::ZERO);
        assert_eq!(zeroed.untaxed_total, dec("100.00"));
    }

    #[test]
    fn totals_saturate_instead_of_panicking() {
        let huge = |slot| SlotAmount {
            slot,
            partner: None,
            commission_type: CommissionType::Fixed,
            base: Decimal::ZERO,
            rate: None,
            rate_source: RateSource::NotApplicable,
            amount: Decimal::MAX,
            overflowed: false,
        };
        let breakdown = CommissionBreakdown {
            slots: vec![huge(BeneficiarySlot::Broker), huge(BeneficiarySlot::Referrer)],
            ..CommissionBreakdown::default()
        };
        assert_eq!(breakdown.raw_total(), Decimal::MAX);
        assert_eq!(
            AllocationStatus::classify(Decimal::MAX, Decimal::MIN, dec("0.01")),
            AllocationStatus::Over
        );
    }
}
