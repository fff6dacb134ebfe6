//! Postgres implementation of the service store traits.

use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::future::Cache;
use sqlx::PgPool;
use tracing::debug;

use tierline_core::pricing::PricingRule;
use tierline_core::{
    CartId, CompanyId, CompanyUserId, DiscountCodeId, MerchantId, ShopifyOrderId,
    ShopifyVariantId,
};

use super::carts::ItemSnapshot;
use super::{
    CartRepository, CatalogRepository, CompanyRepository, DiscountCodeRepository,
    MerchantRepository, PricingRuleRepository, RepositoryError,
};
use crate::models::{
    Cart, CartWithItems, CatalogVariant, Company, CompanyUser, DiscountCode, Merchant,
    NewDiscountCode,
};
use crate::services::{CartStore, CheckoutStore, PricingStore};
use crate::shopify::CreatedDiscount;

/// Repositories over one pool, plus a short-lived merchant cache.
///
/// Merchants (and their tokens) are read on every checkout but change
/// rarely, so they are cached for five minutes.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    merchants: Cache<MerchantId, Merchant>,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        let merchants = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();

        Self { pool, merchants }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl PricingStore for PgStore {
    async fn company(
        &self,
        merchant_id: MerchantId,
        company_id: CompanyId,
    ) -> Result<Option<Company>, RepositoryError> {
        CompanyRepository::new(&self.pool)
            .get(merchant_id, company_id)
            .await
    }

    async fn active_rules(
        &self,
        merchant_id: MerchantId,
        now: DateTime<Utc>,
    ) -> Result<Vec<PricingRule>, RepositoryError> {
        PricingRuleRepository::new(&self.pool)
            .list_active(merchant_id, now)
            .await
    }

    async fn variants(
        &self,
        merchant_id: MerchantId,
        variant_ids: &[ShopifyVariantId],
    ) -> Result<Vec<CatalogVariant>, RepositoryError> {
        CatalogRepository::new(&self.pool)
            .get_variants(merchant_id, variant_ids)
            .await
    }
}

impl CartStore for PgStore {
    async fn cart(
        &self,
        merchant_id: MerchantId,
        cart_id: CartId,
    ) -> Result<Option<CartWithItems>, RepositoryError> {
        CartRepository::new(&self.pool)
            .get_with_items(merchant_id, cart_id)
            .await
    }

    async fn create_cart(
        &self,
        merchant_id: MerchantId,
        company_id: CompanyId,
        created_by: Option<CompanyUserId>,
    ) -> Result<Cart, RepositoryError> {
        CartRepository::new(&self.pool)
            .create(merchant_id, company_id, created_by)
            .await
    }

    async fn company_user(
        &self,
        company_id: CompanyId,
        user_id: CompanyUserId,
    ) -> Result<Option<CompanyUser>, RepositoryError> {
        CompanyRepository::new(&self.pool)
            .get_user(company_id, user_id)
            .await
    }

    async fn upsert_item(&self, cart_id: CartId, item: ItemSnapshot) -> Result<(), RepositoryError> {
        CartRepository::new(&self.pool)
            .upsert_item(cart_id, &item)
            .await
    }

    async fn remove_item(
        &self,
        cart_id: CartId,
        variant_id: ShopifyVariantId,
    ) -> Result<(), RepositoryError> {
        CartRepository::new(&self.pool)
            .remove_item(cart_id, variant_id)
            .await
    }

    async fn find_discount_code(
        &self,
        merchant_id: MerchantId,
        code: &str,
    ) -> Result<Option<DiscountCode>, RepositoryError> {
        DiscountCodeRepository::new(&self.pool)
            .find_by_code(merchant_id, code)
            .await
    }

    async fn convert_cart(
        &self,
        merchant_id: MerchantId,
        cart_id: CartId,
        order_id: ShopifyOrderId,
    ) -> Result<bool, RepositoryError> {
        CartRepository::new(&self.pool)
            .convert(merchant_id, cart_id, order_id)
            .await
    }

    async fn mark_abandoned_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        CartRepository::new(&self.pool)
            .mark_abandoned_before(cutoff)
            .await
    }
}

impl CheckoutStore for PgStore {
    async fn merchant(&self, merchant_id: MerchantId) -> Result<Option<Merchant>, RepositoryError> {
        if let Some(merchant) = self.merchants.get(&merchant_id).await {
            debug!(merchant_id = %merchant_id, "Cache hit for merchant");
            return Ok(Some(merchant));
        }

        let merchant = MerchantRepository::new(&self.pool)
            .get_by_id(merchant_id)
            .await?;
        if let Some(merchant) = &merchant {
            self.merchants.insert(merchant_id, merchant.clone()).await;
        }
        Ok(merchant)
    }

    async fn insert_discount_code(
        &self,
        new: &NewDiscountCode,
    ) -> Result<DiscountCode, RepositoryError> {
        DiscountCodeRepository::new(&self.pool).create(new).await
    }

    async fn mark_discount_synced(
        &self,
        id: DiscountCodeId,
        remote: CreatedDiscount,
    ) -> Result<(), RepositoryError> {
        DiscountCodeRepository::new(&self.pool)
            .mark_synced(id, remote.price_rule_id, remote.discount_code_id)
            .await
    }

    async fn mark_discount_failed(
        &self,
        id: DiscountCodeId,
        error: &str,
        orphaned_price_rule_id: Option<i64>,
    ) -> Result<(), RepositoryError> {
        DiscountCodeRepository::new(&self.pool)
            .mark_failed(id, error, orphaned_price_rule_id)
            .await
    }

    async fn delete_discount_code(&self, id: DiscountCodeId) -> Result<(), RepositoryError> {
        DiscountCodeRepository::new(&self.pool).delete(id).await
    }

    async fn approve_cart(&self, cart_id: CartId, checkout_url: &str) -> Result<(), RepositoryError> {
        CartRepository::new(&self.pool)
            .approve(cart_id, checkout_url)
            .await
    }
}
