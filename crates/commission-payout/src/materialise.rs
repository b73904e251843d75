//! # Materialiser
//!
//! Groups payable slots by beneficiary. Documents come out in the order in
//! which their beneficiary first appears in canonical slot order, and each
//! document's lines keep that order too, so the output is deterministic for
//! a given breakdown.

use commission_calc::{CommissionBreakdown, SlotAmount};
use commission_core::{CurrencyCode, PartnerId, PayoutId, SaleOrderId, Timestamp};
use commission_state::PayoutLifecycle;
use rust_decimal::Decimal;

use crate::document::{PayoutDocument, PayoutLine};
use crate::product::CommissionServiceProduct;

/// The origin order fields copied onto each payout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutOrigin {
    pub order: SaleOrderId,
    pub name: String,
    pub currency: CurrencyCode,
}

/// One payout document per distinct beneficiary with a positive amount.
///
/// Slots without a partner or with a zero amount are skipped. An empty
/// result means nothing is payable.
pub fn materialise(
    origin: &PayoutOrigin,
    breakdown: &CommissionBreakdown,
    product: &CommissionServiceProduct,
) -> Vec<PayoutDocument> {
    let mut groups: Vec<(PartnerId, Vec<&SlotAmount>)> = Vec::new();
    for entry in breakdown.payable_slots() {
        let Some(partner) = entry.partner else {
            continue;
        };
        match groups.iter_mut().find(|(p, _)| *p == partner) {
            Some((_, slots)) => slots.push(entry),
            None => groups.push((partner, vec![entry])),
        }
    }

    let created_at = Timestamp::now();
    groups
        .into_iter()
        .enumerate()
        .map(|(index, (beneficiary, slots))| {
            let lines: Vec<PayoutLine> = slots
                .iter()
                .map(|entry| PayoutLine {
                    slot: entry.slot,
                    description: format!("{} Commission for {}", entry.slot.label(), origin.name),
                    quantity: Decimal::ONE,
                    unit_price: entry.amount,
                    product: product.id,
                })
                .collect();
            let commission_type_label = match lines.as_slice() {
                [only] => Some(only.slot.label().to_string()),
                _ => None,
            };
            PayoutDocument {
                id: PayoutId::new(),
                name: format!("PAY/{}/{:02}", origin.name, index + 1),
                beneficiary,
                origin_sale_order: origin.order,
                origin_name: origin.name.clone(),
                currency: origin.currency.clone(),
                lines,
                commission_type_label,
                lifecycle: PayoutLifecycle::new(),
                notes: Vec::new(),
                created_at,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use commission_calc::{
        BeneficiarySlot, Calculator, CommissionInputs, OrderLine, OrderSnapshot, SlotAssignment,
    };
    use commission_state::PayoutState;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn origin() -> PayoutOrigin {
        PayoutOrigin {
            order: SaleOrderId::new(),
            name: "S00042".into(),
            currency: CurrencyCode::new("AED").unwrap(),
        }
    }

    fn product() -> CommissionServiceProduct {
        crate::product::CommissionServiceRegistry::new().ensure("Commission Service")
    }

    fn breakdown(inputs: &CommissionInputs) -> CommissionBreakdown {
        let order = OrderSnapshot {
            name: "S00042".into(),
            lines: vec![OrderLine::new("Unit", dec("1000.00"), Decimal::ONE)],
            untaxed_total: dec("1000.00"),
            currency: CurrencyCode::new("AED").unwrap(),
        };
        Calculator::default().calculate(&order, inputs)
    }

    #[test]
    fn one_document_per_beneficiary() {
        let x = PartnerId::new();
        let y = PartnerId::new();
        let inputs = CommissionInputs::default()
            .with_slot(BeneficiarySlot::Agent1, SlotAssignment::fixed(x, dec("50")))
            .with_slot(BeneficiarySlot::Manager, SlotAssignment::fixed(x, dec("20")))
            .with_slot(BeneficiarySlot::Director, SlotAssignment::fixed(y, dec("10")));
        let docs = materialise(&origin(), &breakdown(&inputs), &product());
        assert_eq!(docs.len(), 2);

        let for_x = &docs[0];
        assert_eq!(for_x.beneficiary, x);
        assert_eq!(for_x.lines.len(), 2);
        assert_eq!(for_x.total(), dec("70.00"));
        assert_eq!(for_x.lines[0].description, "Agent 1 Commission for S00042");
        assert_eq!(for_x.lines[1].description, "Manager Commission for S00042");
        assert_eq!(for_x.commission_type_label, None);

        let for_y = &docs[1];
        assert_eq!(for_y.beneficiary, y);
        assert_eq!(for_y.lines.len(), 1);
        assert_eq!(for_y.total(), dec("10.00"));
        assert_eq!(for_y.commission_type_label.as_deref(), Some("Director"));
        assert_eq!(for_y.state(), PayoutState::Draft);
    }

    #[test]
    fn lines_reference_service_product_and_order_currency() {
        let product = product();
        let inputs = CommissionInputs::default()
            .with_slot(BeneficiarySlot::Broker, SlotAssignment::fixed(PartnerId::new(), dec("5")));
        let docs = materialise(&origin(), &breakdown(&inputs), &product);
        assert_eq!(docs[0].lines[0].product, product.id);
        assert_eq!(docs[0].lines[0].quantity, Decimal::ONE);
        assert_eq!(docs[0].currency.as_str(), "AED");
        assert_eq!(docs[0].name, "PAY/S00042/01");
    }

    #[test]
    fn unpayable_slots_are_skipped() {
        let inputs = CommissionInputs::default()
            .with_slot(
                BeneficiarySlot::Broker,
                SlotAssignment {
                    fixed_amount: Some(dec("5")),
                    commission_type: Some(commission_calc::CommissionType::Fixed),
                    ..SlotAssignment::default()
                },
            )
            .with_slot(BeneficiarySlot::Cashback, SlotAssignment::fixed(PartnerId::new(), dec("0")));
        assert!(materialise(&origin(), &breakdown(&inputs), &product()).is_empty());
    }
}
