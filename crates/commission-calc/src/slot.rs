//! # Beneficiary Slots
//!
//! A slot is a fixed role into which a partner may be placed on an order.
//! Each populated slot yields at most one commission line.
//!
//! ```text
//! External: BROKER  REFERRER  CASHBACK  OTHER_EXTERNAL
//! Internal: AGENT_1 AGENT_2   MANAGER   DIRECTOR
//! Legacy:   CONSULTANT SENIOR_MANAGER MANAGEMENT SECOND_AGENT   (internal)
//! ```
//!
//! Legacy names are accepted as aliases on input (`REFERRAL` for
//! `REFERRER`, `CXO` and `MANAGEMENT/CXO` for `MANAGEMENT`) but every slot
//! is stored under exactly one canonical name.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use commission_core::PartnerId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which subtotal a slot contributes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotSide {
    External,
    Internal,
}

/// A beneficiary role on a sale order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BeneficiarySlot {
    #[serde(rename = "BROKER")]
    Broker,
    #[serde(rename = "REFERRER", alias = "REFERRAL")]
    Referrer,
    #[serde(rename = "CASHBACK")]
    Cashback,
    #[serde(rename = "OTHER_EXTERNAL")]
    OtherExternal,
    #[serde(rename = "AGENT_1")]
    Agent1,
    #[serde(rename = "AGENT_2")]
    Agent2,
    #[serde(rename = "MANAGER")]
    Manager,
    #[serde(rename = "DIRECTOR")]
    Director,
    #[serde(rename = "CONSULTANT")]
    Consultant,
    #[serde(rename = "SENIOR_MANAGER")]
    SeniorManager,
    #[serde(rename = "MANAGEMENT", alias = "CXO", alias = "MANAGEMENT/CXO")]
    Management,
    #[serde(rename = "SECOND_AGENT")]
    SecondAgent,
}

impl BeneficiarySlot {
    /// Every slot in canonical order: externals, internals, legacy quad.
    pub const ALL: [BeneficiarySlot; 12] = [
        Self::Broker,
        Self::Referrer,
        Self::Cashback,
        Self::OtherExternal,
        Self::Agent1,
        Self::Agent2,
        Self::Manager,
        Self::Director,
        Self::Consultant,
        Self::SeniorManager,
        Self::Management,
        Self::SecondAgent,
    ];

    /// The side this slot's amount is summed into.
    pub fn side(&self) -> SlotSide {
        match self {
            Self::Broker | Self::Referrer | Self::Cashback | Self::OtherExternal => {
                SlotSide::External
            }
            _ => SlotSide::Internal,
        }
    }

    /// Whether the slot belongs to the legacy quad.
    pub fn is_legacy(&self) -> bool {
        matches!(
            self,
            Self::Consultant | Self::SeniorManager | Self::Management | Self::SecondAgent
        )
    }

    /// Canonical upper-case code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Broker => "BROKER",
            Self::Referrer => "REFERRER",
            Self::Cashback => "CASHBACK",
            Self::OtherExternal => "OTHER_EXTERNAL",
            Self::Agent1 => "AGENT_1",
            Self::Agent2 => "AGENT_2",
            Self::Manager => "MANAGER",
            Self::Director => "DIRECTOR",
            Self::Consultant => "CONSULTANT",
            Self::SeniorManager => "SENIOR_MANAGER",
            Self::Management => "MANAGEMENT",
            Self::SecondAgent => "SECOND_AGENT",
        }
    }

    /// Human-readable role label used on payout lines.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Broker => "Broker",
            Self::Referrer => "Referrer",
            Self::Cashback => "Cashback",
            Self::OtherExternal => "Other External",
            Self::Agent1 => "Agent 1",
            Self::Agent2 => "Agent 2",
            Self::Manager => "Manager",
            Self::Director => "Director",
            Self::Consultant => "Consultant",
            Self::SeniorManager => "Senior Manager",
            Self::Management => "Management/CXO",
            Self::SecondAgent => "Second Agent",
        }
    }
}

impl fmt::Display for BeneficiarySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for BeneficiarySlot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "REFERRAL" => return Ok(Self::Referrer),
            "CXO" | "MANAGEMENT/CXO" => return Ok(Self::Management),
            "AGENT1" => return Ok(Self::Agent1),
            "AGENT2" => return Ok(Self::Agent2),
            _ => {}
        }
        Self::ALL
            .iter()
            .copied()
            .find(|slot| slot.code() == normalized)
            .ok_or_else(|| format!("unknown beneficiary slot: {s}"))
    }
}

/// How a slot's amount is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommissionType {
    /// Percentage of the price-unit base.
    PriceUnit,
    /// Percentage of the untaxed total.
    #[default]
    UntaxedTotal,
    /// A fixed amount.
    Fixed,
}

impl fmt::Display for CommissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PriceUnit => "PRICE_UNIT",
            Self::UntaxedTotal => "UNTAXED_TOTAL",
            Self::Fixed => "FIXED",
        })
    }
}

/// What was entered for one slot on an order.
///
/// When both a rate and an amount are present on a percentage type, the
/// amount wins and the rate is inferred from it. The inference is written
/// to the computed [`crate::SlotAmount`], never back into the assignment,
/// so a second calculation sees the same inputs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotAssignment {
    pub partner: Option<PartnerId>,
    /// `None` falls back to the bundle's calculation method default.
    pub commission_type: Option<CommissionType>,
    /// Percentage in `[0, 100]`.
    pub rate: Option<Decimal>,
    /// Fixed amount, or an amount from which the rate is inferred.
    pub fixed_amount: Option<Decimal>,
}

impl SlotAssignment {
    /// A percentage commission.
    pub fn percent(partner: PartnerId, commission_type: CommissionType, rate: Decimal) -> Self {
        Self {
            partner: Some(partner),
            commission_type: Some(commission_type),
            rate: Some(rate),
            fixed_amount: None,
        }
    }

    /// A fixed-amount commission.
    pub fn fixed(partner: PartnerId, amount: Decimal) -> Self {
        Self {
            partner: Some(partner),
            commission_type: Some(CommissionType::Fixed),
            rate: None,
            fixed_amount: Some(amount),
        }
    }

    /// An amount entered against a percentage type; the rate is inferred.
    pub fn amount_on(partner: PartnerId, commission_type: CommissionType, amount: Decimal) -> Self {
        Self {
            partner: Some(partner),
            commission_type: Some(commission_type),
            rate: None,
            fixed_amount: Some(amount),
        }
    }

    /// Whether anything was entered.
    pub fn is_empty(&self) -> bool {
        self.partner.is_none() && self.rate.is_none() && self.fixed_amount.is_none()
    }
}

/// The commission inputs of a sale order: the default method and the
/// populated slots.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommissionInputs {
    pub calculation_method_default: CommissionType,
    pub slots: BTreeMap<BeneficiarySlot, SlotAssignment>,
}

impl CommissionInputs {
    /// Inputs with the given default method and no slots.
    pub fn with_default(method: CommissionType) -> Self {
        Self {
            calculation_method_default: method,
            slots: BTreeMap::new(),
        }
    }

    /// Builder-style slot assignment.
    pub fn with_slot(mut self, slot: BeneficiarySlot, assignment: SlotAssignment) -> Self {
        self.set(slot, assignment);
        self
    }

    /// Populate a slot; an empty assignment clears it.
    pub fn set(&mut self, slot: BeneficiarySlot, assignment: SlotAssignment) {
        if assignment.is_empty() {
            self.slots.remove(&slot);
        } else {
            self.slots.insert(slot, assignment);
        }
    }

    /// Remove a slot.
    pub fn clear(&mut self, slot: BeneficiarySlot) -> Option<SlotAssignment> {
        self.slots.remove(&slot)
    }

    /// The assignment of a slot, if populated.
    pub fn get(&self, slot: BeneficiarySlot) -> Option<&SlotAssignment> {
        self.slots.get(&slot)
    }

    /// The partner placed in a slot.
    pub fn partner(&self, slot: BeneficiarySlot) -> Option<PartnerId> {
        self.get(slot).and_then(|a| a.partner)
    }

    /// Read-only alias: the legacy CXO role is the `MANAGEMENT` slot.
    pub fn cxo_partner(&self) -> Option<PartnerId> {
        self.partner(BeneficiarySlot::Management)
    }

    /// The effective type of a slot's assignment.
    pub fn effective_type(&self, assignment: &SlotAssignment) -> CommissionType {
        assignment
            .commission_type
            .unwrap_or(self.calculation_method_default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sides_partition_slots() {
        let external: Vec<_> = BeneficiarySlot::ALL
            .iter()
            .filter(|s| s.side() == SlotSide::External)
            .collect();
        assert_eq!(external.len(), 4);
        assert!(BeneficiarySlot::ALL
            .iter()
            .filter(|s| s.is_legacy())
            .all(|s| s.side() == SlotSide::Internal));
    }

    #[test]
    fn aliases_parse_to_canonical_slots() {
        assert_eq!("REFERRAL".parse::<BeneficiarySlot>(), Ok(BeneficiarySlot::Referrer));
        assert_eq!("cxo".parse::<BeneficiarySlot>(), Ok(BeneficiarySlot::Management));
        assert_eq!("agent-1".parse::<BeneficiarySlot>(), Ok(BeneficiarySlot::Agent1));
        assert_eq!("Senior Manager".parse::<BeneficiarySlot>(), Ok(BeneficiarySlot::SeniorManager));
        assert!("janitor".parse::<BeneficiarySlot>().is_err());
    }

    #[test]
    fn serde_accepts_aliases() {
        let slot: BeneficiarySlot = serde_json::from_str("\"REFERRAL\"").unwrap();
        assert_eq!(slot, BeneficiarySlot::Referrer);
        let slot: BeneficiarySlot = serde_json::from_str("\"CXO\"").unwrap();
        assert_eq!(slot, BeneficiarySlot::Management);
        assert_eq!(
            serde_json::to_string(&BeneficiarySlot::Agent1).unwrap(),
            "\"AGENT_1\""
        );
    }

    #[test]
    fn empty_assignment_clears_slot() {
        let partner = PartnerId::new();
        let mut inputs = CommissionInputs::default().with_slot(
            BeneficiarySlot::Broker,
            SlotAssignment::fixed(partner, Decimal::TEN),
        );
        assert_eq!(inputs.partner(BeneficiarySlot::Broker), Some(partner));
        inputs.set(BeneficiarySlot::Broker, SlotAssignment::default());
        assert!(inputs.get(BeneficiarySlot::Broker).is_none());
    }

    #[test]
    fn cxo_alias_projects_management() {
        let partner = PartnerId::new();
        let inputs = CommissionInputs::default().with_slot(
            BeneficiarySlot::Management,
            SlotAssignment::fixed(partner, Decimal::ONE),
        );
        assert_eq!(inputs.cxo_partner(), Some(partner));
    }

    #[test]
    fn effective_type_falls_back_to_default() {
        let inputs = CommissionInputs::with_default(CommissionType::PriceUnit);
        let assignment = SlotAssignment {
            partner: Some(PartnerId::new()),
            rate: Some(Decimal::ONE),
            ..SlotAssignment::default()
        };
        assert_eq!(inputs.effective_type(&assignment), CommissionType::PriceUnit);
    }
}
