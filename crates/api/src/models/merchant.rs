//! Merchant (tenant) model.

use secrecy::SecretString;

use tierline_core::{CurrencyCode, MerchantId};

/// A Shopify shop using Tierline.
///
/// Carries the shop's API tokens, so `Debug` is implemented manually.
#[derive(Clone)]
pub struct Merchant {
    pub id: MerchantId,
    /// `acme.myshopify.com`
    pub shop_domain: String,
    /// Admin API access token (price rules, catalog reads).
    pub admin_access_token: SecretString,
    /// Storefront API private token (cart creation).
    pub storefront_access_token: SecretString,
    pub currency_code: CurrencyCode,
    pub is_active: bool,
}

impl std::fmt::Debug for Merchant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Merchant")
            .field("id", &self.id)
            .field("shop_domain", &self.shop_domain)
            .field("admin_access_token", &"[REDACTED]")
            .field("storefront_access_token", &"[REDACTED]")
            .field("currency_code", &self.currency_code)
            .field("is_active", &self.is_active)
            .finish()
    }
}
