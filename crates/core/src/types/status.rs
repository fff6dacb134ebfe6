//! Status enums for carts and discount codes.

use serde::{Deserialize, Serialize};

/// Lifecycle of a buyer cart.
///
/// ```text
/// draft ──checkout──▶ approved ──order──▶ converted
///   │
///   └──stale──▶ abandoned
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "b2b.cart_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum CartStatus {
    #[default]
    Draft,
    Approved,
    Converted,
    Abandoned,
}

impl CartStatus {
    /// Whether line items may still be added, changed or removed.
    #[must_use]
    pub const fn is_editable(self) -> bool {
        matches!(self, Self::Draft)
    }

    /// Whether a checkout may be (re)created for a cart in this status.
    ///
    /// Approved carts can be checked out again, which mints a fresh code.
    #[must_use]
    pub const fn can_checkout(self) -> bool {
        matches!(self, Self::Draft | Self::Approved)
    }

    /// Whether `self -> next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Draft | Self::Approved, Self::Approved)
                | (Self::Approved, Self::Converted)
                | (Self::Draft, Self::Abandoned)
        )
    }
}

impl std::fmt::Display for CartStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Approved => write!(f, "approved"),
            Self::Converted => write!(f, "converted"),
            Self::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// Whether a locally minted discount code made it to Shopify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "b2b.discount_sync_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum DiscountSyncStatus {
    /// Row written, remote call not finished yet.
    #[default]
    Pending,
    /// Price rule and discount code exist in Shopify.
    Synced,
    /// Remote creation failed; Shopify will not honour the code.
    Failed,
}
