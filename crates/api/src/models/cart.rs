//! Buyer carts.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use tierline_core::{
    CartId, CartItemId, CartStatus, CompanyId, CompanyUserId, MerchantId, ShopifyOrderId,
    ShopifyVariantId,
};

/// A B2B cart. Items can only change while the cart is a draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub id: CartId,
    pub merchant_id: MerchantId,
    pub company_id: CompanyId,
    pub created_by_user_id: Option<CompanyUserId>,
    pub status: CartStatus,
    pub checkout_url: Option<String>,
    pub shopify_order_id: Option<ShopifyOrderId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A cart line with the prices seen when it was last changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub id: CartItemId,
    pub cart_id: CartId,
    pub variant_id: ShopifyVariantId,
    pub quantity: u32,
    /// Storefront price snapshot.
    pub list_price: Decimal,
    /// Resolved B2B price snapshot.
    pub unit_price: Decimal,
}

/// A cart together with its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartWithItems {
    #[serde(flatten)]
    pub cart: Cart,
    pub items: Vec<CartItem>,
}

impl CartWithItems {
    /// Σ snapshot unit price × quantity.
    #[must_use]
    pub fn snapshot_subtotal(&self) -> Decimal {
        self.items
            .iter()
            .map(|item| item.unit_price * Decimal::from(item.quantity))
            .sum()
    }

    /// Σ snapshot list price × quantity.
    #[must_use]
    pub fn snapshot_list_total(&self) -> Decimal {
        self.items
            .iter()
            .map(|item| item.list_price * Decimal::from(item.quantity))
            .sum()
    }
}
