//! # Money — Decimal Currency Arithmetic
//!
//! All monetary values are `rust_decimal::Decimal`. No `f64` anywhere on the
//! computation path.
//!
//! Rounding is half away from zero to two places, and the result is always
//! rescaled to exactly two places so that equal amounts serialize to equal
//! strings (`30` and `30.000` both become `30.00`).

use std::fmt;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::CommissionError;

/// Decimal places of every currency handled by the engine.
pub const CURRENCY_DECIMALS: u32 = 2;

/// Default rounding tolerance ε (0.01 currency units).
pub fn default_tolerance() -> Decimal {
    Decimal::new(1, 2)
}

/// Round to currency precision, half away from zero, rescaled to 2 places.
pub fn round_currency(value: Decimal) -> Decimal {
    let mut rounded =
        value.round_dp_with_strategy(CURRENCY_DECIMALS, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(CURRENCY_DECIMALS);
    rounded
}

/// `rate` percent of `base`, unrounded. `None` when the product does not
/// fit in a `Decimal`.
pub fn percent_of(rate: Decimal, base: Decimal) -> Option<Decimal> {
    rate.checked_mul(base)?.checked_div(Decimal::ONE_HUNDRED)
}

/// What percentage `part` is of `base`. `None` when the base is zero or the
/// result does not fit in a `Decimal`.
pub fn percentage(part: Decimal, base: Decimal) -> Option<Decimal> {
    if base.is_zero() {
        return None;
    }
    part.checked_mul(Decimal::ONE_HUNDRED)?.checked_div(base)
}

/// Sum of `values`, or `None` on overflow.
pub fn checked_sum(values: impl IntoIterator<Item = Decimal>) -> Option<Decimal> {
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, value| acc.checked_add(value))
}

/// Whether `a` and `b` differ by at most `epsilon`.
pub fn within_tolerance(a: Decimal, b: Decimal, epsilon: Decimal) -> bool {
    a.checked_sub(b).is_some_and(|diff| diff.abs() <= epsilon)
}

/// Render an amount with exactly two decimals.
pub fn format_amount(value: Decimal) -> String {
    format!("{:.2}", round_currency(value))
}

/// ISO 4217 currency code (three uppercase ASCII letters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Validate and wrap a currency code.
    pub fn new(code: impl Into<String>) -> Result<Self, CommissionError> {
        let code = code.into();
        if code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase()) {
            Ok(Self(code))
        } else {
            Err(CommissionError::validation(
                "currency parse",
                code,
                vec!["currency code must be three uppercase letters".to_string()],
            ))
        }
    }

    /// The code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = CommissionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

impl FromStr for CurrencyCode {
    type Err = CommissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round_currency(dec("2.345")), dec("2.35"));
        assert_eq!(round_currency(dec("2.344")), dec("2.34"));
        assert_eq!(round_currency(dec("-2.345")), dec("-2.35"));
        assert_eq!(round_currency(dec("0.005")), dec("0.01"));
    }

    #[test]
    fn rescales_to_two_places() {
        assert_eq!(round_currency(dec("30")).to_string(), "30.00");
        assert_eq!(round_currency(dec("30.000")).to_string(), "30.00");
        assert_eq!(round_currency(dec("1.5")).to_string(), "1.50");
    }

    #[test]
    fn percent_of_untaxed() {
        assert_eq!(percent_of(dec("3.0"), dec("1000.00")).map(round_currency), Some(dec("30.00")));
        assert_eq!(percent_of(dec("2.0"), dec("500.00")).map(round_currency), Some(dec("10.00")));
    }

    #[test]
    fn percentage_of_zero_base_is_none() {
        assert_eq!(percentage(dec("10"), Decimal::ZERO), None);
        assert_eq!(percentage(dec("25"), dec("500")), Some(dec("5")));
    }

    #[test]
    fn overflow_yields_none() {
        assert_eq!(percent_of(Decimal::MAX, dec("1000")), None);
        assert_eq!(percentage(Decimal::MAX, dec("3")), None);
        assert_eq!(checked_sum([Decimal::MAX, Decimal::ONE]), None);
        assert_eq!(checked_sum([dec("1.50"), dec("2.25")]), Some(dec("3.75")));
        assert!(!within_tolerance(Decimal::MAX, Decimal::MIN, dec("0.01")));
    }

    #[test]
    fn tolerance_is_inclusive() {
        let eps = default_tolerance();
        assert!(within_tolerance(dec("100.00"), dec("100.01"), eps));
        assert!(!within_tolerance(dec("100.00"), dec("100.02"), eps));
    }

    #[test]
    fn format_amount_two_decimals() {
        assert_eq!(format_amount(dec("70")), "70.00");
        assert_eq!(format_amount(dec("0.125")), "0.13");
    }

    #[test]
    fn currency_code_validation() {
        assert!(CurrencyCode::new("AED").is_ok());
        assert!(CurrencyCode::new("aed").is_err());
        assert!(CurrencyCode::new("EURO").is_err());
        let parsed: CurrencyCode = serde_json::from_str("\"USD\"").unwrap();
        assert_eq!(parsed.as_str(), "USD");
        assert!(serde_json::from_str::<CurrencyCode>("\"us\"").is_err());
    }

    proptest! {
        #[test]
        fn rounding_is_idempotent(units in -10_000_000i64..10_000_000i64, scale in 0u32..6) {
            let value = Decimal::new(units, scale);
            let once = round_currency(value);
            prop_assert_eq!(round_currency(once), once);
            prop_assert_eq!(once.scale(), CURRENCY_DECIMALS);
        }

        #[test]
        fn rounding_error_is_at_most_half_a_cent(units in -10_000_000i64..10_000_000i64, scale in 0u32..6) {
            let value = Decimal::new(units, scale);
            prop_assert!((round_currency(value) - value).abs() <= Decimal::new(5, 3));
        }
    }
}
