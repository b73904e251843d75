//! # Breakdown Dependencies
//!
//! The inputs a [`crate::CommissionBreakdown`] is derived from, declared in
//! one place. Writers mark what they touched; readers recompute whenever
//! anything is dirty.

use std::collections::BTreeSet;
use std::fmt;

use crate::slot::BeneficiarySlot;

/// One input of the calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CommissionDependency {
    /// Price or quantity of any order line, or the line set itself.
    OrderLines,
    UntaxedTotal,
    /// Partner, type, rate or fixed amount of one slot.
    Slot(BeneficiarySlot),
    CalculationMethodDefault,
}

impl fmt::Display for CommissionDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OrderLines => f.write_str("order_lines"),
            Self::UntaxedTotal => f.write_str("untaxed_total"),
            Self::Slot(slot) => write!(f, "slot:{slot}"),
            Self::CalculationMethodDefault => f.write_str("calculation_method_default"),
        }
    }
}

/// The set of inputs changed since the last calculation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirtyTracker {
    dirty: BTreeSet<CommissionDependency>,
}

impl DirtyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a change to `dependency`.
    pub fn mark(&mut self, dependency: CommissionDependency) {
        self.dirty.insert(dependency);
    }

    /// Record changes to several dependencies.
    pub fn mark_all(&mut self, dependencies: impl IntoIterator<Item = CommissionDependency>) {
        self.dirty.extend(dependencies);
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub fn contains(&self, dependency: CommissionDependency) -> bool {
        self.dirty.contains(&dependency)
    }

    /// Drain the dirty set, returning what changed.
    pub fn take(&mut self) -> Vec<CommissionDependency> {
        std::mem::take(&mut self.dirty).into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_drains_in_stable_order() {
        let mut tracker = DirtyTracker::new();
        assert!(!tracker.is_dirty());
        tracker.mark(CommissionDependency::UntaxedTotal);
        tracker.mark(CommissionDependency::Slot(BeneficiarySlot::Manager));
        tracker.mark(CommissionDependency::OrderLines);
        tracker.mark(CommissionDependency::UntaxedTotal);
        assert!(tracker.contains(CommissionDependency::OrderLines));

        let changed = tracker.take();
        assert_eq!(
            changed,
            vec![
                CommissionDependency::OrderLines,
                CommissionDependency::UntaxedTotal,
                CommissionDependency::Slot(BeneficiarySlot::Manager),
            ]
        );
        assert!(!tracker.is_dirty());
    }

    #[test]
    fn display_names_the_input() {
        assert_eq!(
            CommissionDependency::Slot(BeneficiarySlot::Agent1).to_string(),
            "slot:AGENT_1"
        );
        assert_eq!(
            CommissionDependency::CalculationMethodDefault.to_string(),
            "calculation_method_default"
        );
    }
}
