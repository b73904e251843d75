//! # Domain Identity Newtypes
//!
//! Newtype wrappers for every identifier the engine handles. These prevent
//! accidental identifier confusion — you cannot pass a `PayoutId` where a
//! `SaleOrderId` is expected.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Access the inner UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }
    };
}

uuid_identifier!(
    /// A sale order carrying a commission bundle.
    SaleOrderId,
    "order"
);
uuid_identifier!(
    /// A partner from the host's master data (customer, broker, employee).
    PartnerId,
    "partner"
);
uuid_identifier!(
    /// A user acting on the engine.
    UserId,
    "user"
);
uuid_identifier!(
    /// A payout document emitted for one beneficiary.
    PayoutId,
    "payout"
);
uuid_identifier!(
    /// A payment voucher.
    VoucherId,
    "voucher"
);
uuid_identifier!(
    /// A customer invoice in the host ledger.
    InvoiceId,
    "invoice"
);
uuid_identifier!(
    /// A product in the host catalogue.
    ProductId,
    "product"
);
uuid_identifier!(
    /// A payment journal in the host ledger.
    JournalId,
    "journal"
);

impl UserId {
    /// The reserved identity of engine-initiated transitions.
    pub fn system() -> Self {
        Self(Uuid::nil())
    }

    /// Whether this is the reserved system identity.
    pub fn is_system(&self) -> bool {
        self.0.is_nil()
    }
}
