//! In-memory store and gateway for service tests.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use secrecy::SecretString;

use tierline_core::pricing::{PricingRule, RuleDiscount, RuleScope, RuleTarget};
use tierline_core::{
    CartId, CartItemId, CartStatus, CompanyId, CompanyUserId, CurrencyCode, DiscountCodeId,
    DiscountSyncStatus, MerchantId, PricingRuleId, ShopifyCollectionId, ShopifyOrderId,
    ShopifyProductId, ShopifyVariantId,
};

use super::carts::CartStore;
use super::checkout::{CheckoutGateway, CheckoutStore};
use super::pricing::PricingStore;
use crate::db::RepositoryError;
use crate::db::carts::ItemSnapshot;
use crate::models::{
    Cart, CartItem, CartWithItems, CatalogVariant, Company, CompanyUser, DiscountCode, Merchant,
    NewDiscountCode,
};
use crate::shopify::{CartRequest, CreatedDiscount, FixedDiscount, ShopifyError};

#[allow(clippy::unwrap_used)]
pub fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

/// A rule for the store's merchant (the id is overwritten by `with_rule`).
pub fn rule(
    target: RuleTarget,
    scope: RuleScope,
    discount: RuleDiscount,
    priority: i32,
) -> PricingRule {
    PricingRule {
        id: PricingRuleId::generate(),
        merchant_id: MerchantId::generate(),
        name: format!("rule p{priority}"),
        target,
        scope,
        discount,
        min_cart_amount: None,
        priority,
        is_active: true,
        valid_from: None,
        valid_until: None,
        created_at: Utc::now() - TimeDelta::days(1),
    }
}

#[derive(Default)]
struct State {
    companies: Vec<Company>,
    users: Vec<CompanyUser>,
    variants: Vec<CatalogVariant>,
    rules: Vec<PricingRule>,
    carts: HashMap<CartId, CartWithItems>,
    codes: Vec<DiscountCode>,
    failing_code_inserts: usize,
}

/// One merchant with one active company.
pub struct FakeStore {
    pub merchant_id: MerchantId,
    pub company_id: CompanyId,
    merchant: Merchant,
    state: Mutex<State>,
}

#[allow(clippy::unwrap_used)]
impl FakeStore {
    pub const SHOP: &'static str = "acme.myshopify.com";

    pub fn new() -> Self {
        let merchant_id = MerchantId::generate();
        let company_id = CompanyId::generate();

        let state = State {
            companies: vec![Company {
                id: company_id,
                merchant_id,
                name: "Acme Wholesale".to_string(),
                company_group: Some("gold".to_string()),
                is_active: true,
            }],
            ..State::default()
        };

        Self {
            merchant_id,
            company_id,
            merchant: Merchant {
                id: merchant_id,
                shop_domain: Self::SHOP.to_string(),
                admin_access_token: SecretString::from("shpat_test"),
                storefront_access_token: SecretString::from("shpst_test"),
                currency_code: CurrencyCode::USD,
                is_active: true,
            },
            state: Mutex::new(state),
        }
    }

    pub fn with_variant(self, id: i64, price: &str, tags: &[&str], collections: &[i64]) -> Self {
        self.state.lock().unwrap().variants.push(CatalogVariant {
            merchant_id: self.merchant_id,
            variant_id: ShopifyVariantId::new(id),
            product_id: ShopifyProductId::new(id * 100),
            title: format!("Variant {id}"),
            sku: None,
            price: dec(price),
            tags: tags.iter().map(ToString::to_string).collect(),
            collection_ids: collections.iter().copied().map(ShopifyCollectionId::new).collect(),
            updated_at: Utc::now(),
        });
        self
    }

    pub fn with_rule(self, mut rule: PricingRule) -> Self {
        rule.merchant_id = self.merchant_id;
        self.state.lock().unwrap().rules.push(rule);
        self
    }

    /// Insert a draft cart with `(variant, qty, list, unit)` lines.
    pub fn draft_cart(&self, items: &[(i64, u32, &str, &str)]) -> CartId {
        let cart_id = CartId::generate();
        let now = Utc::now();
        let cart = CartWithItems {
            cart: Cart {
                id: cart_id,
                merchant_id: self.merchant_id,
                company_id: self.company_id,
                created_by_user_id: None,
                status: CartStatus::Draft,
                checkout_url: None,
                shopify_order_id: None,
                created_at: now,
                updated_at: now,
            },
            items: items
                .iter()
                .map(|&(variant, quantity, list, unit)| CartItem {
                    id: CartItemId::generate(),
                    cart_id,
                    variant_id: ShopifyVariantId::new(variant),
                    quantity,
                    list_price: dec(list),
                    unit_price: dec(unit),
                })
                .collect(),
        };
        self.state.lock().unwrap().carts.insert(cart_id, cart);
        cart_id
    }

    pub fn set_status(&self, cart_id: CartId, status: CartStatus) {
        let mut state = self.state.lock().unwrap();
        state.carts.get_mut(&cart_id).unwrap().cart.status = status;
    }

    pub fn set_updated_at(&self, cart_id: CartId, at: DateTime<Utc>) {
        let mut state = self.state.lock().unwrap();
        state.carts.get_mut(&cart_id).unwrap().cart.updated_at = at;
    }

    pub fn cart_snapshot(&self, cart_id: CartId) -> Cart {
        self.state.lock().unwrap().carts[&cart_id].cart.clone()
    }

    pub fn discount_codes(&self) -> Vec<DiscountCode> {
        self.state.lock().unwrap().codes.clone()
    }

    pub fn seed_discount_code(&self, code: &str, cart_id: CartId, amount: Decimal) {
        let discount = DiscountCode {
            id: DiscountCodeId::generate(),
            code: code.to_string(),
            merchant_id: self.merchant_id,
            company_id: self.company_id,
            cart_id,
            discount_amount: amount,
            shopify_price_rule_id: Some(1),
            shopify_discount_id: Some(2),
            sync_status: DiscountSyncStatus::Synced,
            sync_error: None,
            created_at: Utc::now(),
        };
        self.state.lock().unwrap().codes.push(discount);
    }

    pub fn seed_user(&self, email: &str) -> CompanyUserId {
        let id = CompanyUserId::generate();
        self.state.lock().unwrap().users.push(CompanyUser {
            id,
            company_id: self.company_id,
            email: email.to_string(),
            first_name: None,
            last_name: None,
        });
        id
    }

    /// Make the next `n` code inserts fail with a unique-constraint conflict.
    pub fn fail_next_code_inserts(&self, n: usize) {
        self.state.lock().unwrap().failing_code_inserts = n;
    }

    fn with_code<F: FnOnce(&mut DiscountCode)>(&self, id: DiscountCodeId, f: F) {
        let mut state = self.state.lock().unwrap();
        if let Some(code) = state.codes.iter_mut().find(|c| c.id == id) {
            f(code);
        }
    }
}

#[allow(clippy::unwrap_used)]
impl PricingStore for FakeStore {
    async fn company(
        &self,
        merchant_id: MerchantId,
        company_id: CompanyId,
    ) -> Result<Option<Company>, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .companies
            .iter()
            .find(|c| c.merchant_id == merchant_id && c.id == company_id)
            .cloned())
    }

    async fn active_rules(
        &self,
        merchant_id: MerchantId,
        _now: DateTime<Utc>,
    ) -> Result<Vec<PricingRule>, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .rules
            .iter()
            .filter(|r| r.merchant_id == merchant_id && r.is_active)
            .cloned()
            .collect())
    }

    async fn variants(
        &self,
        merchant_id: MerchantId,
        variant_ids: &[ShopifyVariantId],
    ) -> Result<Vec<CatalogVariant>, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .variants
            .iter()
            .filter(|v| v.merchant_id == merchant_id && variant_ids.contains(&v.variant_id))
            .cloned()
            .collect())
    }
}

#[allow(clippy::unwrap_used)]
impl CartStore for FakeStore {
    async fn cart(
        &self,
        merchant_id: MerchantId,
        cart_id: CartId,
    ) -> Result<Option<CartWithItems>, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .carts
            .get(&cart_id)
            .filter(|c| c.cart.merchant_id == merchant_id)
            .cloned())
    }

    async fn create_cart(
        &self,
        merchant_id: MerchantId,
        company_id: CompanyId,
        created_by: Option<CompanyUserId>,
    ) -> Result<Cart, RepositoryError> {
        let now = Utc::now();
        let cart = Cart {
            id: CartId::generate(),
            merchant_id,
            company_id,
            created_by_user_id: created_by,
            status: CartStatus::Draft,
            checkout_url: None,
            shopify_order_id: None,
            created_at: now,
            updated_at: now,
        };
        self.state.lock().unwrap().carts.insert(
            cart.id,
            CartWithItems {
                cart: cart.clone(),
                items: Vec::new(),
            },
        );
        Ok(cart)
    }

    async fn company_user(
        &self,
        company_id: CompanyId,
        user_id: CompanyUserId,
    ) -> Result<Option<CompanyUser>, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .users
            .iter()
            .find(|u| u.company_id == company_id && u.id == user_id)
            .cloned())
    }

    async fn upsert_item(&self, cart_id: CartId, item: ItemSnapshot) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().unwrap();
        let cart = state.carts.get_mut(&cart_id).ok_or(RepositoryError::NotFound)?;
        if !cart.cart.status.is_editable() {
            return Err(RepositoryError::Conflict("not a draft".to_string()));
        }

        if let Some(existing) = cart.items.iter_mut().find(|i| i.variant_id == item.variant_id) {
            existing.quantity = item.quantity;
            existing.list_price = item.list_price;
            existing.unit_price = item.unit_price;
        } else {
            cart.items.push(CartItem {
                id: CartItemId::generate(),
                cart_id,
                variant_id: item.variant_id,
                quantity: item.quantity,
                list_price: item.list_price,
                unit_price: item.unit_price,
            });
        }
        cart.cart.updated_at = Utc::now();
        Ok(())
    }

    async fn remove_item(
        &self,
        cart_id: CartId,
        variant_id: ShopifyVariantId,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().unwrap();
        let cart = state.carts.get_mut(&cart_id).ok_or(RepositoryError::NotFound)?;
        cart.items.retain(|i| i.variant_id != variant_id);
        cart.cart.updated_at = Utc::now();
        Ok(())
    }

    async fn find_discount_code(
        &self,
        merchant_id: MerchantId,
        code: &str,
    ) -> Result<Option<DiscountCode>, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .codes
            .iter()
            .find(|c| c.merchant_id == merchant_id && c.code.eq_ignore_ascii_case(code))
            .cloned())
    }

    async fn convert_cart(
        &self,
        merchant_id: MerchantId,
        cart_id: CartId,
        order_id: ShopifyOrderId,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        match state.carts.get_mut(&cart_id) {
            Some(cart)
                if cart.cart.merchant_id == merchant_id
                    && cart.cart.status == CartStatus::Approved =>
            {
                cart.cart.status = CartStatus::Converted;
                cart.cart.shopify_order_id = Some(order_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_abandoned_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        let mut count = 0;
        for cart in state.carts.values_mut() {
            if cart.cart.status == CartStatus::Draft
                && cart.cart.updated_at < cutoff
                && cart.cart.shopify_order_id.is_none()
            {
                cart.cart.status = CartStatus::Abandoned;
                count += 1;
            }
        }
        Ok(count)
    }
}

#[allow(clippy::unwrap_used)]
impl CheckoutStore for FakeStore {
    async fn merchant(&self, merchant_id: MerchantId) -> Result<Option<Merchant>, RepositoryError> {
        Ok((merchant_id == self.merchant_id).then(|| self.merchant.clone()))
    }

    async fn insert_discount_code(
        &self,
        new: &NewDiscountCode,
    ) -> Result<DiscountCode, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_code_inserts > 0 {
            state.failing_code_inserts -= 1;
            return Err(RepositoryError::Conflict("discount code already exists".to_string()));
        }
        if state.codes.iter().any(|c| c.code == new.code) {
            return Err(RepositoryError::Conflict("discount code already exists".to_string()));
        }

        let code = DiscountCode {
            id: DiscountCodeId::generate(),
            code: new.code.clone(),
            merchant_id: new.merchant_id,
            company_id: new.company_id,
            cart_id: new.cart_id,
            discount_amount: new.discount_amount,
            shopify_price_rule_id: None,
            shopify_discount_id: None,
            sync_status: DiscountSyncStatus::Pending,
            sync_error: None,
            created_at: Utc::now(),
        };
        state.codes.push(code.clone());
        Ok(code)
    }

    async fn mark_discount_synced(
        &self,
        id: DiscountCodeId,
        remote: CreatedDiscount,
    ) -> Result<(), RepositoryError> {
        self.with_code(id, |code| {
            code.sync_status = DiscountSyncStatus::Synced;
            code.shopify_price_rule_id = Some(remote.price_rule_id);
            code.shopify_discount_id = Some(remote.discount_code_id);
        });
        Ok(())
    }

    async fn mark_discount_failed(
        &self,
        id: DiscountCodeId,
        error: &str,
        orphaned_price_rule_id: Option<i64>,
    ) -> Result<(), RepositoryError> {
        self.with_code(id, |code| {
            code.sync_status = DiscountSyncStatus::Failed;
            code.sync_error = Some(error.to_string());
            code.shopify_price_rule_id = orphaned_price_rule_id;
        });
        Ok(())
    }

    async fn delete_discount_code(&self, id: DiscountCodeId) -> Result<(), RepositoryError> {
        self.state.lock().unwrap().codes.retain(|c| c.id != id);
        Ok(())
    }

    async fn approve_cart(&self, cart_id: CartId, checkout_url: &str) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().unwrap();
        let cart = state.carts.get_mut(&cart_id).ok_or(RepositoryError::NotFound)?;
        cart.cart.status = CartStatus::Approved;
        cart.cart.checkout_url = Some(checkout_url.to_string());
        Ok(())
    }
}

/// Records calls and optionally fails them.
#[derive(Default)]
pub struct FakeGateway {
    pub fail_discount: bool,
    /// With `fail_discount`, the price rule the failure leaves behind.
    pub orphaned_price_rule: Option<i64>,
    pub fail_cart: bool,
    pub(crate) discounts: Mutex<Vec<FixedDiscount>>,
    pub(crate) carts: Mutex<Vec<CartRequest>>,
}

#[allow(clippy::unwrap_used)]
impl FakeGateway {
    pub fn discount_calls(&self) -> usize {
        self.discounts.lock().unwrap().len()
    }

    pub fn cart_requests(&self) -> Vec<CartRequest> {
        self.carts.lock().unwrap().clone()
    }
}

#[allow(clippy::unwrap_used)]
impl CheckoutGateway for FakeGateway {
    async fn create_discount(
        &self,
        _merchant: &Merchant,
        discount: &FixedDiscount,
    ) -> Result<CreatedDiscount, ShopifyError> {
        self.discounts.lock().unwrap().push(discount.clone());
        if self.fail_discount {
            let rejected = ShopifyError::UserError("Code has already been taken".to_string());
            return Err(match self.orphaned_price_rule {
                Some(price_rule_id) => ShopifyError::OrphanedPriceRule {
                    price_rule_id,
                    source: Box::new(rejected),
                },
                None => rejected,
            });
        }
        Ok(CreatedDiscount {
            price_rule_id: 507_328_175,
            discount_code_id: 1_054_381_139,
        })
    }

    async fn create_cart(&self, merchant: &Merchant, cart: &CartRequest) -> Result<String, ShopifyError> {
        self.carts.lock().unwrap().push(cart.clone());
        if self.fail_cart {
            return Err(ShopifyError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(format!("https://{}/cart/c/{}", merchant.shop_domain, cart.cart_id))
    }
}
