//! # Allocation Validator
//!
//! Enumerates every invariant a breakdown violates. Over-allocation is
//! special: it is reported as a violation but is deferrable, so `calc` may
//! publish an `OVER` bundle while `confirm` rejects it.

use std::fmt;

use commission_core::money::default_tolerance;
use commission_core::{CommissionError, EngineConfig};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::breakdown::{AllocationStatus, CommissionBreakdown};
use crate::slot::{BeneficiarySlot, CommissionType};

/// One violated invariant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    #[error("{slot}: rate {rate}% is outside [0, 100]")]
    RateOutOfRange { slot: BeneficiarySlot, rate: Decimal },

    #[error("{slot}: computed amount {amount:.2} is negative")]
    NegativeAmount { slot: BeneficiarySlot, amount: Decimal },

    #[error("total commission {total:.2} exceeds untaxed total {untaxed:.2} by {excess:.2}")]
    OverAllocation {
        total: Decimal,
        untaxed: Decimal,
        excess: Decimal,
    },

    #[error("untaxed total {untaxed:.2} is negative")]
    NegativeBase { untaxed: Decimal },

    #[error("order has {count} lines; only one is allowed")]
    MultipleOrderLines { count: usize },

    #[error("{slot}: computed amount exceeds the representable range")]
    SlotOverflow { slot: BeneficiarySlot },

    #[error("commission totals exceed the representable range")]
    TotalOverflow,
}

impl Violation {
    /// Stable upper-case code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RateOutOfRange { .. } => "RATE_OUT_OF_RANGE",
            Self::NegativeAmount { .. } => "NEGATIVE_AMOUNT",
            Self::OverAllocation { .. } => "OVER_ALLOCATION",
            Self::NegativeBase { .. } => "NEGATIVE_BASE",
            Self::MultipleOrderLines { .. } => "MULTIPLE_ORDER_LINES",
            Self::SlotOverflow { .. } | Self::TotalOverflow => "AMOUNT_OVERFLOW",
        }
    }

    /// `CODE: message`, as shown in rejection reasons.
    pub fn message(&self) -> String {
        format!("{}: {self}", self.code())
    }

    /// Whether the violation may be carried by a CALCULATED bundle.
    pub fn is_deferrable(&self) -> bool {
        matches!(self, Self::OverAllocation { .. })
    }
}

/// A non-empty set of violations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violations(pub Vec<Violation>);

impl Violations {
    pub fn iter(&self) -> impl Iterator<Item = &Violation> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains_code(&self, code: &str) -> bool {
        self.0.iter().any(|v| v.code() == code)
    }

    /// One message per violation.
    pub fn messages(&self) -> Vec<String> {
        self.0.iter().map(Violation::message).collect()
    }

    /// Wrap into a validation rejection of `transition` on `object`.
    pub fn into_error(self, transition: &str, object: &str) -> CommissionError {
        CommissionError::validation(transition, object, self.messages())
    }
}

impl fmt::Display for Violations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.messages().join("\n"))
    }
}

impl std::error::Error for Violations {}

/// Checks breakdowns against the allocation invariants.
#[derive(Debug, Clone)]
pub struct Validator {
    tolerance: Decimal,
    strict_single_order_line: bool,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(default_tolerance(), true)
    }
}

impl Validator {
    pub fn new(tolerance: Decimal, strict_single_order_line: bool) -> Self {
        Self {
            tolerance,
            strict_single_order_line,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.calc_tolerance, config.strict_single_order_line)
    }

    /// Every violation of `breakdown`, in a stable order.
    pub fn violations(&self, breakdown: &CommissionBreakdown) -> Vec<Violation> {
        let mut found = Vec::new();

        if breakdown.untaxed_total.is_sign_negative() && !breakdown.untaxed_total.is_zero() {
            found.push(Violation::NegativeBase {
                untaxed: breakdown.untaxed_total,
            });
        }
        if self.strict_single_order_line && breakdown.line_count > 1 {
            found.push(Violation::MultipleOrderLines {
                count: breakdown.line_count,
            });
        }
        for entry in &breakdown.slots {
            if entry.commission_type != CommissionType::Fixed {
                if let Some(rate) = entry.rate {
                    if rate < Decimal::ZERO || rate > Decimal::ONE_HUNDRED {
                        found.push(Violation::RateOutOfRange {
                            slot: entry.slot,
                            rate: rate.normalize(),
                        });
                    }
                }
            }
            if entry.overflowed {
                found.push(Violation::SlotOverflow { slot: entry.slot });
            }
            if entry.amount < Decimal::ZERO {
                found.push(Violation::NegativeAmount {
                    slot: entry.slot,
                    amount: entry.amount,
                });
            }
        }

        if breakdown.overflowed {
            found.push(Violation::TotalOverflow);
            return found;
        }

        // Measured on the real sum so a clamped bundle still reports it.
        let total = breakdown.raw_total();
        let excess = total.saturating_sub(breakdown.untaxed_total);
        if excess > self.tolerance {
            found.push(Violation::OverAllocation {
                total,
                untaxed: breakdown.untaxed_total,
                excess,
            });
        }
        found
    }

    /// Every invariant must hold.
    pub fn validate(&self, breakdown: &CommissionBreakdown) -> Result<(), Violations> {
        into_result(self.violations(breakdown))
    }

    /// Every invariant except the deferrable ones must hold.
    pub fn validate_hard(&self, breakdown: &CommissionBreakdown) -> Result<(), Violations> {
        into_result(
            self.violations(breakdown)
                .into_iter()
                .filter(|v| !v.is_deferrable())
                .collect(),
        )
    }

    /// Informational classification of the allocation.
    pub fn classify(&self, breakdown: &CommissionBreakdown) -> AllocationStatus {
        AllocationStatus::classify(breakdown.raw_total(), breakdown.untaxed_total, self.tolerance)
    }
}

fn into_result(found: Vec<Violation>) -> Result<(), Violations> {
    if found.is_empty() {
        Ok(())
    } else {
        Err(Violations(found))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator::{CalcSettings, Calculator};
    use crate::order::{OrderLine, OrderSnapshot};
    use crate::slot::{CommissionInputs, SlotAssignment};
    use commission_core::{CurrencyCode, ErrorKind, PartnerId};

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn snapshot(lines: usize, untaxed: &str) -> OrderSnapshot {
        OrderSnapshot {
            name: "S00009".into(),
            lines: (0..lines)
                .map(|i| OrderLine::new(format!("Line {i}"), dec(untaxed), Decimal::ONE))
                .collect(),
            untaxed_total: dec(untaxed),
            currency: CurrencyCode::new("AED").unwrap(),
        }
    }

    fn calc(order: &OrderSnapshot, inputs: &CommissionInputs) -> CommissionBreakdown {
        Calculator::default().calculate(order, inputs)
    }

    #[test]
    fn valid_allocation_passes() {
        let inputs = CommissionInputs::default().with_slot(
            BeneficiarySlot::Broker,
            SlotAssignment::percent(PartnerId::new(), CommissionType::UntaxedTotal, dec("100")),
        );
        let b = calc(&snapshot(1, "250.00"), &inputs);
        assert!(Validator::default().validate(&b).is_ok());
        assert_eq!(Validator::default().classify(&b), AllocationStatus::Full);
    }

    #[test]
    fn over_allocation_is_deferrable() {
        let inputs = CommissionInputs::default()
            .with_slot(
                BeneficiarySlot::Director,
                SlotAssignment::percent(PartnerId::new(), CommissionType::UntaxedTotal, dec("80")),
            )
            .with_slot(
                BeneficiarySlot::Manager,
                SlotAssignment::percent(PartnerId::new(), CommissionType::UntaxedTotal, dec("30")),
            );
        let b = calc(&snapshot(1, "100.00"), &inputs);
        let validator = Validator::default();
        assert!(validator.validate_hard(&b).is_ok());

        let violations = validator.validate(&b).unwrap_err();
        assert_eq!(violations.len(), 1);
        assert!(violations.contains_code("OVER_ALLOCATION"));
        assert_eq!(
            violations.messages()[0],
            "OVER_ALLOCATION: total commission 110.00 exceeds untaxed total 100.00 by 10.00"
        );
    }

    #[test]
    fn clamped_bundle_still_reports_over_allocation() {
        let calc = Calculator::new(CalcSettings {
            clamp_over_allocation: true,
            ..CalcSettings::default()
        });
        let inputs = CommissionInputs::default().with_slot(
            BeneficiarySlot::Broker,
            SlotAssignment::fixed(PartnerId::new(), dec("150")),
        );
        let b = calc.calculate(&snapshot(1, "100.00"), &inputs);
        assert!(b.clamped);
        assert!(Validator::default()
            .validate(&b)
            .unwrap_err()
            .contains_code("OVER_ALLOCATION"));
    }

    #[test]
    fn rate_bounds_apply_to_percentage_types_only() {
        let inputs = CommissionInputs::default()
            .with_slot(
                BeneficiarySlot::Agent1,
                SlotAssignment::percent(PartnerId::new(), CommissionType::PriceUnit, dec("101")),
            )
            .with_slot(
                BeneficiarySlot::Agent2,
                SlotAssignment::percent(PartnerId::new(), CommissionType::UntaxedTotal, dec("-1")),
            );
        let violations = Validator::default()
            .validate_hard(&calc(&snapshot(1, "1000.00"), &inputs))
            .unwrap_err();
        let codes: Vec<_> = violations.iter().map(Violation::code).collect();
        assert_eq!(
            codes,
            vec!["RATE_OUT_OF_RANGE", "RATE_OUT_OF_RANGE", "NEGATIVE_AMOUNT"]
        );
    }

    #[test]
    fn inferred_rate_above_hundred_is_out_of_range() {
        let inputs = CommissionInputs::default().with_slot(
            BeneficiarySlot::Cashback,
            SlotAssignment::amount_on(PartnerId::new(), CommissionType::UntaxedTotal, dec("150")),
        );
        let violations = Validator::default()
            .validate_hard(&calc(&snapshot(1, "100.00"), &inputs))
            .unwrap_err();
        assert!(violations.contains_code("RATE_OUT_OF_RANGE"));
    }

    #[test]
    fn negative_fixed_amount_is_rejected() {
        let inputs = CommissionInputs::default().with_slot(
            BeneficiarySlot::Manager,
            SlotAssignment::fixed(PartnerId::new(), dec("-5")),
        );
        let violations = Validator::default()
            .validate_hard(&calc(&snapshot(1, "100.00"), &inputs))
            .unwrap_err();
        assert_eq!(violations.messages(), vec!["NEGATIVE_AMOUNT: MANAGER: computed amount -5.00 is negative"]);
    }

    #[test]
    fn negative_base_is_rejected() {
        let b = calc(&snapshot(1, "-10.00"), &CommissionInputs::default());
        assert!(Validator::default()
            .validate_hard(&b)
            .unwrap_err()
            .contains_code("NEGATIVE_BASE"));
    }

    #[test]
    fn multiple_lines_only_in_strict_mode() {
        let b = calc(&snapshot(2, "100.00"), &CommissionInputs::default());
        assert!(Validator::new(dec("0.01"), true)
            .validate_hard(&b)
            .unwrap_err()
            .contains_code("MULTIPLE_ORDER_LINES"));
        assert!(Validator::new(dec("0.01"), false).validate_hard(&b).is_ok());
    }

    #[test]
    fn extreme_rate_is_a_hard_violation() {
        let inputs = CommissionInputs::default().with_slot(
            BeneficiarySlot::Broker,
            SlotAssignment::percent(PartnerId::new(), CommissionType::UntaxedTotal, Decimal::MAX),
        );
        let b = calc(&snapshot(1, "1000.00"), &inputs);
        let violations = Validator::default().validate_hard(&b).unwrap_err();
        assert!(violations.contains_code("RATE_OUT_OF_RANGE"));
        assert!(violations.contains_code("AMOUNT_OVERFLOW"));
    }

    #[test]
    fn overflowing_totals_are_a_hard_violation() {
        let inputs = CommissionInputs::default()
            .with_slot(BeneficiarySlot::Broker, SlotAssignment::fixed(PartnerId::new(), Decimal::MAX))
            .with_slot(BeneficiarySlot::Manager, SlotAssignment::fixed(PartnerId::new(), Decimal::MAX));
        let b = calc(&snapshot(1, "1000.00"), &inputs);
        assert!(b.overflowed);
        let violations = Validator::default().validate_hard(&b).unwrap_err();
        assert_eq!(violations.messages(), vec!["AMOUNT_OVERFLOW: commission totals exceed the representable range"]);
    }

    #[test]
    fn violations_convert_to_validation_error() {
        let err = Violations(vec![
            Violation::NegativeBase { untaxed: dec("-1") },
            Violation::MultipleOrderLines { count: 3 },
        ])
        .into_error("calc", "S00009");
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.conditions().len(), 2);
        assert!(err.to_string().contains("calc rejected for S00009"));
    }
}
