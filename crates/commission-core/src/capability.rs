//! # Capabilities and Actors
//!
//! Transitions are gated on capability sets rather than named security
//! groups. An [`Actor`] carries the capabilities it holds; the engine checks
//! them with [`Actor::require`] before applying a gated transition.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CommissionError;
use crate::identity::UserId;

/// A capability that gates one or more transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Capability {
    /// Moves a voucher from review to approval.
    Reviewer,
    /// Authorises an approved voucher.
    Approver,
    /// Marks an authorised voucher paid.
    Authorizer,
    /// Cancels, resets and sends back vouchers; manually cancels done payouts.
    Manager,
    /// Rejects commissions.
    Admin,
}

impl Capability {
    /// Every capability.
    pub const ALL: [Capability; 5] = [
        Capability::Reviewer,
        Capability::Approver,
        Capability::Authorizer,
        Capability::Manager,
        Capability::Admin,
    ];

    /// Canonical upper-case name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Reviewer => "REVIEWER",
            Self::Approver => "APPROVER",
            Self::Authorizer => "AUTHORIZER",
            Self::Manager => "MANAGER",
            Self::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The user on whose behalf an operation runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Stable user identity.
    pub user: UserId,
    /// Display name recorded in audit entries.
    pub name: String,
    capabilities: BTreeSet<Capability>,
}

impl Actor {
    /// An actor with no capabilities.
    pub fn new(user: UserId, name: impl Into<String>) -> Self {
        Self {
            user,
            name: name.into(),
            capabilities: BTreeSet::new(),
        }
    }

    /// Builder-style capability grant.
    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    /// Builder-style grant of several capabilities.
    pub fn with_capabilities(mut self, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        self.capabilities.extend(capabilities);
        self
    }

    /// The engine itself, used for event-driven transitions. Holds every
    /// capability.
    pub fn system() -> Self {
        Self::new(UserId::system(), "system").with_capabilities(Capability::ALL)
    }

    /// Whether the actor holds `capability`.
    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// The capabilities held, in canonical order.
    pub fn capabilities(&self) -> impl Iterator<Item = Capability> + '_ {
        self.capabilities.iter().copied()
    }

    /// Fail with a permission error unless the actor holds `capability`.
    pub fn require(
        &self,
        capability: Capability,
        transition: &str,
        object: &str,
    ) -> Result<(), CommissionError> {
        if self.has(capability) {
            Ok(())
        } else {
            Err(CommissionError::permission(
                transition,
                object,
                format!("{} lacks capability {capability}", self.name),
            ))
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn require_passes_with_capability() {
        let actor = Actor::new(UserId::new(), "rita").with_capability(Capability::Reviewer);
        assert!(actor.require(Capability::Reviewer, "voucher approve", "PV00001").is_ok());
    }

    #[test]
    fn require_fails_without_capability() {
        let actor = Actor::new(UserId::new(), "rita");
        let err = actor
            .require(Capability::Approver, "voucher authorise", "PV00001")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permission);
        assert!(err.to_string().contains("rita lacks capability APPROVER"));
    }

    #[test]
    fn system_actor_holds_everything() {
        let system = Actor::system();
        assert!(system.user.is_system());
        for cap in Capability::ALL {
            assert!(system.has(cap));
        }
    }

    #[test]
    fn capabilities_iterate_in_order() {
        let actor = Actor::new(UserId::new(), "m")
            .with_capabilities([Capability::Manager, Capability::Reviewer]);
        let caps: Vec<_> = actor.capabilities().collect();
        assert_eq!(caps, vec![Capability::Reviewer, Capability::Manager]);
    }
}
