//! # Order Snapshot
//!
//! The commission-relevant view of a sale order. Taxes are attached by the
//! host; the snapshot only carries the untaxed total they were computed on.

use commission_core::money::{checked_sum, round_currency};
use commission_core::CurrencyCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    #[serde(default)]
    pub description: String,
    pub price_unit: Decimal,
    #[serde(default = "one")]
    pub quantity: Decimal,
}

fn one() -> Decimal {
    Decimal::ONE
}

impl OrderLine {
    /// A line with the given unit price and quantity.
    pub fn new(description: impl Into<String>, price_unit: Decimal, quantity: Decimal) -> Self {
        Self {
            description: description.into(),
            price_unit,
            quantity,
        }
    }

    /// `price_unit × quantity`, unrounded. `None` on overflow.
    pub fn subtotal(&self) -> Option<Decimal> {
        self.price_unit.checked_mul(self.quantity)
    }
}

/// Order data the calculator reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    /// Display reference of the order (e.g. `S00042`).
    pub name: String,
    pub lines: Vec<OrderLine>,
    pub untaxed_total: Decimal,
    pub currency: CurrencyCode,
}

impl OrderSnapshot {
    /// The price-unit base `P`.
    ///
    /// Strict single-line mode uses the first line's unit price; otherwise
    /// the sum of `price_unit × quantity` over all lines. Rounded to
    /// currency precision either way. `None` when the line subtotals do
    /// not fit in a `Decimal`.
    pub fn price_unit_base(&self, strict_single_line: bool) -> Option<Decimal> {
        let raw = if strict_single_line {
            self.lines
                .first()
                .map(|line| line.price_unit)
                .unwrap_or(Decimal::ZERO)
        } else {
            checked_sum(
                self.lines
                    .iter()
                    .map(OrderLine::subtotal)
                    .collect::<Option<Vec<_>>>()?,
            )?
        };
        Some(round_currency(raw))
    }

    /// The untaxed base `U`, rounded to currency precision.
    pub fn untaxed_base(&self) -> Decimal {
        round_currency(self.untaxed_total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn snapshot(lines: Vec<OrderLine>, untaxed: &str) -> OrderSnapshot {
        OrderSnapshot {
            name: "S00001".into(),
            lines,
            untaxed_total: dec(untaxed),
            currency: CurrencyCode::new("AED").unwrap(),
        }
    }

    #[test]
    fn strict_mode_uses_first_unit_price() {
        let order = snapshot(
            vec![OrderLine::new("Unit 12A", dec("500.00"), dec("2"))],
            "1000.00",
        );
        assert_eq!(order.price_unit_base(true), Some(dec("500.00")));
    }

    #[test]
    fn relaxed_mode_sums_line_subtotals() {
        let order = snapshot(
            vec![
                OrderLine::new("Unit 12A", dec("500.00"), dec("2")),
                OrderLine::new("Parking", dec("25.50"), dec("1")),
            ],
            "1025.50",
        );
        assert_eq!(order.price_unit_base(false), Some(dec("1025.50")));
        assert_eq!(order.price_unit_base(true), Some(dec("500.00")));
    }

    #[test]
    fn no_lines_means_zero_base() {
        let order = snapshot(vec![], "0");
        assert_eq!(order.price_unit_base(true), Some(Decimal::ZERO));
        assert_eq!(order.price_unit_base(false), Some(Decimal::ZERO));
    }

    #[test]
    fn quantity_defaults_to_one() {
        let line: OrderLine = serde_json::from_str(r#"{"price_unit": "99.99"}"#).unwrap();
        assert_eq!(line.quantity, Decimal::ONE);
        assert_eq!(line.subtotal(), Some(dec("99.99")));
    }

    #[test]
    fn overflowing_subtotal_has_no_base() {
        let order = snapshot(vec![OrderLine::new("Tower", Decimal::MAX, dec("2"))], "1");
        assert_eq!(order.price_unit_base(false), None);
        assert_eq!(order.price_unit_base(true), Some(Decimal::MAX));
    }
}
