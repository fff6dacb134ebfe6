//! One-time discount codes minted at checkout.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use tierline_core::{CartId, CompanyId, DiscountCodeId, DiscountSyncStatus, MerchantId};

/// A discount code bridging Shopify's list total down to the B2B total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountCode {
    pub id: DiscountCodeId,
    pub code: String,
    pub merchant_id: MerchantId,
    pub company_id: CompanyId,
    pub cart_id: CartId,
    /// Always positive.
    pub discount_amount: Decimal,
    pub shopify_price_rule_id: Option<i64>,
    pub shopify_discount_id: Option<i64>,
    pub sync_status: DiscountSyncStatus,
    pub sync_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to insert a new code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDiscountCode {
    pub code: String,
    pub merchant_id: MerchantId,
    pub company_id: CompanyId,
    pub cart_id: CartId,
    pub discount_amount: Decimal,
}
