//! Checkout reconciliation: how far Shopify's list total is above the
//! resolved B2B total.

use rust_decimal::Decimal;

use crate::types::{ShopifyVariantId, round_money};

/// A cart line with both of its prices resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconciledLine {
    pub variant_id: ShopifyVariantId,
    pub quantity: u32,
    /// What Shopify's checkout charges per unit today.
    pub list_price: Decimal,
    /// Authoritative B2B unit price.
    pub unit_price: Decimal,
}

/// Totals for a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    /// Σ list price × quantity.
    pub shopify_total: Decimal,
    /// Σ B2B unit price × quantity.
    pub subtotal: Decimal,
}

impl Reconciliation {
    /// Amount a one-time discount code must take off, or `None` when the B2B
    /// total is not below Shopify's. Never negative: a B2B price above list
    /// is not turned into a surcharge.
    #[must_use]
    pub fn discount_amount(&self) -> Option<Decimal> {
        let delta = round_money(self.shopify_total - self.subtotal);
        (delta > Decimal::ZERO).then_some(delta)
    }
}

/// Sum both sides of the cart.
#[must_use]
pub fn reconcile(lines: &[ReconciledLine]) -> Reconciliation {
    let (shopify_total, subtotal) = lines.iter().fold(
        (Decimal::ZERO, Decimal::ZERO),
        |(list, b2b), line| {
            let qty = Decimal::from(line.quantity);
            (list + line.list_price * qty, b2b + line.unit_price * qty)
        },
    );

    Reconciliation {
        shopify_total: round_money(shopify_total),
        subtotal: round_money(subtotal),
    }
}
