//! Cart lifecycle: drafts, line edits with price snapshots, abandonment and
//! conversion from Shopify orders.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;
use tracing::instrument;

use tierline_core::pricing::LineRequest;
use tierline_core::{
    CartId, CartStatus, CompanyId, CompanyUserId, MerchantId, ShopifyOrderId, ShopifyVariantId,
};

use super::pricing::{PricingError, PricingService, PricingStore};
use crate::db::RepositoryError;
use crate::db::carts::ItemSnapshot;
use crate::models::{Cart, CartWithItems, CompanyUser, DiscountCode};

/// Cart reads and writes.
pub trait CartStore: PricingStore {
    /// A cart with items, scoped to its merchant.
    fn cart(
        &self,
        merchant_id: MerchantId,
        cart_id: CartId,
    ) -> impl Future<Output = Result<Option<CartWithItems>, RepositoryError>> + Send;

    fn create_cart(
        &self,
        merchant_id: MerchantId,
        company_id: CompanyId,
        created_by: Option<CompanyUserId>,
    ) -> impl Future<Output = Result<Cart, RepositoryError>> + Send;

    fn company_user(
        &self,
        company_id: CompanyId,
        user_id: CompanyUserId,
    ) -> impl Future<Output = Result<Option<CompanyUser>, RepositoryError>> + Send;

    /// Insert or replace a line. Fails with `Conflict` unless the cart is a draft.
    fn upsert_item(
        &self,
        cart_id: CartId,
        item: ItemSnapshot,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    fn remove_item(
        &self,
        cart_id: CartId,
        variant_id: ShopifyVariantId,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    fn find_discount_code(
        &self,
        merchant_id: MerchantId,
        code: &str,
    ) -> impl Future<Output = Result<Option<DiscountCode>, RepositoryError>> + Send;

    /// Move an approved cart to converted; `false` if it was not approved.
    fn convert_cart(
        &self,
        merchant_id: MerchantId,
        cart_id: CartId,
        order_id: ShopifyOrderId,
    ) -> impl Future<Output = Result<bool, RepositoryError>> + Send;

    fn mark_abandoned_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64, RepositoryError>> + Send;
}

/// Errors from cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Pricing(#[from] PricingError),

    #[error("cart {0} not found")]
    CartNotFound(CartId),

    #[error("user {0} does not belong to the company")]
    UnknownUser(CompanyUserId),

    #[error("cart {cart_id} is {status} and can no longer be edited")]
    NotEditable { cart_id: CartId, status: CartStatus },

    #[error("variant {0} is not in the catalog")]
    UnknownVariant(ShopifyVariantId),

    #[error("quantity {0} is too large")]
    QuantityTooLarge(u32),
}

/// The parts of a Shopify order that can tie it back to a cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderNotification {
    pub order_id: ShopifyOrderId,
    /// Discount codes applied to the order.
    pub discount_codes: Vec<String>,
    /// Value of the `b2b_cart_id` note attribute, if present.
    pub cart_attribute: Option<String>,
}

/// What an incoming order did to our carts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionOutcome {
    Converted(CartId),
    /// The cart exists but was not awaiting an order (already converted, or
    /// never checked out).
    NotApproved(CartId),
    /// Not one of ours.
    NotB2b,
}

/// Cart operations for one store.
pub struct CartService<'a, S> {
    store: &'a S,
}

impl<'a, S: CartStore> CartService<'a, S> {
    #[must_use]
    pub const fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Start a draft cart for an active company.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Pricing(CompanyNotFound)` for unknown companies and
    /// `CartError::UnknownUser` if `created_by` is not a user of the company.
    #[instrument(skip(self), fields(merchant_id = %merchant_id, company_id = %company_id))]
    pub async fn create_cart(
        &self,
        merchant_id: MerchantId,
        company_id: CompanyId,
        created_by: Option<CompanyUserId>,
    ) -> Result<CartWithItems, CartError> {
        PricingService::new(self.store)
            .company(merchant_id, company_id)
            .await?;

        if let Some(user_id) = created_by
            && self.store.company_user(company_id, user_id).await?.is_none()
        {
            return Err(CartError::UnknownUser(user_id));
        }

        let cart = self
            .store
            .create_cart(merchant_id, company_id, created_by)
            .await?;
        tracing::info!(cart_id = %cart.id, "Created draft cart");

        Ok(CartWithItems {
            cart,
            items: Vec::new(),
        })
    }

    /// Get a cart with its items.
    ///
    /// # Errors
    ///
    /// Returns `CartError::CartNotFound` if the cart does not belong to the merchant.
    pub async fn get_cart(
        &self,
        merchant_id: MerchantId,
        cart_id: CartId,
    ) -> Result<CartWithItems, CartError> {
        self.store
            .cart(merchant_id, cart_id)
            .await?
            .ok_or(CartError::CartNotFound(cart_id))
    }

    /// Set the quantity of a variant in a draft cart; zero removes the line.
    ///
    /// The line's list and B2B prices are snapshotted now, with min-cart rules
    /// evaluated against the cart's list total after the change. Checkout
    /// re-resolves everything, so snapshots are informational.
    ///
    /// # Errors
    ///
    /// Returns `CartError::NotEditable` unless the cart is a draft and
    /// `CartError::UnknownVariant` if the variant is not in the catalog mirror,
    /// and `CartError::QuantityTooLarge` past what a cart line can store.
    #[instrument(skip(self, now), fields(merchant_id = %merchant_id, cart_id = %cart_id, variant_id = %variant_id))]
    pub async fn set_item(
        &self,
        merchant_id: MerchantId,
        cart_id: CartId,
        variant_id: ShopifyVariantId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<CartWithItems, CartError> {
        if i32::try_from(quantity).is_err() {
            return Err(CartError::QuantityTooLarge(quantity));
        }

        let current = self.get_cart(merchant_id, cart_id).await?;
        if !current.cart.status.is_editable() {
            return Err(CartError::NotEditable {
                cart_id,
                status: current.cart.status,
            });
        }

        if quantity == 0 {
            self.store.remove_item(cart_id, variant_id).await?;
            return self.get_cart(merchant_id, cart_id).await;
        }

        let pricing = PricingService::new(self.store);
        let company = pricing
            .company(merchant_id, current.cart.company_id)
            .await?
            .pricing_context();

        let line = LineRequest::new(variant_id, quantity);
        let mut lines: Vec<LineRequest> = current
            .items
            .iter()
            .filter(|item| item.variant_id != variant_id)
            .map(|item| LineRequest {
                variant_id: item.variant_id,
                quantity: item.quantity,
                fallback_list_price: Some(item.list_price),
            })
            .collect();
        lines.push(line);

        let variant_ids: Vec<ShopifyVariantId> = lines.iter().map(|l| l.variant_id).collect();
        let snapshot = pricing.snapshot(merchant_id, &variant_ids, now).await?;
        if !snapshot.knows(variant_id) {
            return Err(CartError::UnknownVariant(variant_id));
        }

        let cart_total = snapshot.list_total(&lines);
        let Some(price) = snapshot
            .price_all(Some(&company), &[line], Some(cart_total))
            .into_iter()
            .next()
        else {
            return Err(CartError::UnknownVariant(variant_id));
        };

        self.store
            .upsert_item(
                cart_id,
                ItemSnapshot {
                    variant_id,
                    quantity,
                    list_price: price.list_price,
                    unit_price: price.discounted_price,
                },
            )
            .await?;

        self.get_cart(merchant_id, cart_id).await
    }

    /// Mark drafts untouched for `older_than` as abandoned.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if the update fails.
    pub async fn sweep_abandoned(
        &self,
        now: DateTime<Utc>,
        older_than: Duration,
    ) -> Result<u64, CartError> {
        let Some(cutoff) = TimeDelta::from_std(older_than)
            .ok()
            .and_then(|delta| now.checked_sub_signed(delta))
        else {
            return Ok(0);
        };

        let abandoned = self.store.mark_abandoned_before(cutoff).await?;
        if abandoned > 0 {
            tracing::info!(abandoned, cutoff = %cutoff, "Marked stale draft carts as abandoned");
        }
        Ok(abandoned)
    }

    /// Tie a Shopify order back to an approved cart and mark it converted.
    ///
    /// The `b2b_cart_id` cart attribute wins; otherwise any of the order's
    /// discount codes minted by us identifies the cart.
    ///
    /// # Errors
    ///
    /// Returns `CartError::Repository` if a lookup or the update fails.
    #[instrument(skip(self, order), fields(merchant_id = %merchant_id, order_id = %order.order_id))]
    pub async fn convert_from_order(
        &self,
        merchant_id: MerchantId,
        order: &OrderNotification,
    ) -> Result<ConversionOutcome, CartError> {
        let Some(cart_id) = self.cart_for_order(merchant_id, order).await? else {
            return Ok(ConversionOutcome::NotB2b);
        };

        if self
            .store
            .convert_cart(merchant_id, cart_id, order.order_id)
            .await?
        {
            tracing::info!(cart_id = %cart_id, "Cart converted by Shopify order");
            Ok(ConversionOutcome::Converted(cart_id))
        } else {
            tracing::warn!(cart_id = %cart_id, "Order references a cart that is not approved");
            Ok(ConversionOutcome::NotApproved(cart_id))
        }
    }

    async fn cart_for_order(
        &self,
        merchant_id: MerchantId,
        order: &OrderNotification,
    ) -> Result<Option<CartId>, RepositoryError> {
        if let Some(cart_id) = order
            .cart_attribute
            .as_deref()
            .and_then(|value| value.trim().parse::<CartId>().ok())
        {
            return Ok(Some(cart_id));
        }

        for code in &order.discount_codes {
            if let Some(discount) = self.store.find_discount_code(merchant_id, code).await? {
                return Ok(Some(discount.cart_id));
            }
        }

        Ok(None)
    }
}
