//! Checkout reconciliation.
//!
//! Shopify's checkout only knows storefront list prices. At checkout we
//! re-resolve every cart line to its B2B price, and when the B2B total is
//! below Shopify's we mint a single-use fixed-amount discount code for the
//! difference and attach it to the checkout.
//!
//! Shopify failures never fail the checkout: a rejected discount code is
//! handled per [`DiscountSyncFailurePolicy`], and a failed storefront cart
//! falls back to a cart permalink.

use std::future::Future;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use tierline_core::pricing::{LineRequest, ReconciledLine, reconcile};
use tierline_core::{
    CartId, CartStatus, CompanyUserId, DiscountCodeId, MerchantId, Price, ShopifyVariantId,
};

use super::carts::CartStore;
use super::discount_codes::generate_code;
use super::pricing::{PricingError, PricingService};
use crate::config::{CheckoutConfig, DiscountSyncFailurePolicy};
use crate::db::RepositoryError;
use crate::models::{CartWithItems, DiscountCode, Merchant, NewDiscountCode};
use crate::shopify::permalink::cart_permalink;
use crate::shopify::{CartLine, CartRequest, CreatedDiscount, FixedDiscount, ShopifyError};

/// Attempts at finding an unused code before giving up.
const CODE_ATTEMPTS: usize = 3;

/// Writes checkout needs on top of cart access.
pub trait CheckoutStore: CartStore {
    fn merchant(
        &self,
        merchant_id: MerchantId,
    ) -> impl Future<Output = Result<Option<Merchant>, RepositoryError>> + Send;

    /// Insert a `pending` code. Fails with `Conflict` if the code is taken.
    fn insert_discount_code(
        &self,
        new: &NewDiscountCode,
    ) -> impl Future<Output = Result<DiscountCode, RepositoryError>> + Send;

    fn mark_discount_synced(
        &self,
        id: DiscountCodeId,
        remote: CreatedDiscount,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Mark a code `failed`, recording any price rule left behind in Shopify.
    fn mark_discount_failed(
        &self,
        id: DiscountCodeId,
        error: &str,
        orphaned_price_rule_id: Option<i64>,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    fn delete_discount_code(
        &self,
        id: DiscountCodeId,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Store the checkout URL and move the cart to `approved`.
    fn approve_cart(
        &self,
        cart_id: CartId,
        checkout_url: &str,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;
}

/// Shopify calls made during checkout.
pub trait CheckoutGateway: Send + Sync {
    /// Create the price rule and discount code in Shopify.
    fn create_discount(
        &self,
        merchant: &Merchant,
        discount: &FixedDiscount,
    ) -> impl Future<Output = Result<CreatedDiscount, ShopifyError>> + Send;

    /// Create a storefront cart and return its checkout URL.
    fn create_cart(
        &self,
        merchant: &Merchant,
        cart: &CartRequest,
    ) -> impl Future<Output = Result<String, ShopifyError>> + Send;
}

/// Errors that fail a checkout.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("cart {0} not found")]
    CartNotFound(CartId),

    #[error("merchant {0} not found")]
    MerchantNotFound(MerchantId),

    #[error(transparent)]
    Pricing(#[from] PricingError),

    #[error("cart {0} has no items")]
    EmptyCart(CartId),

    #[error("cart {cart_id} is {status} and cannot be checked out")]
    InvalidStatus { cart_id: CartId, status: CartStatus },
}

/// Input for [`CheckoutReconciler::create_checkout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub merchant_id: MerchantId,
    pub cart_id: CartId,
    /// Buyer whose email is attached to the Shopify cart.
    pub user_id: Option<CompanyUserId>,
}

/// Outcome of a checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResult {
    pub checkout_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_code: Option<String>,
    /// What the buyer pays: Shopify's list total minus `savings`.
    pub total: Decimal,
    /// Amount taken off by the attached discount code.
    pub savings: Decimal,
}

/// Re-prices carts and provisions checkout discount codes.
pub struct CheckoutReconciler<'a, S, G> {
    store: &'a S,
    gateway: &'a G,
    config: &'a CheckoutConfig,
}

impl<'a, S: CheckoutStore, G: CheckoutGateway> CheckoutReconciler<'a, S, G> {
    #[must_use]
    pub const fn new(store: &'a S, gateway: &'a G, config: &'a CheckoutConfig) -> Self {
        Self {
            store,
            gateway,
            config,
        }
    }

    /// Create a checkout for a cart.
    ///
    /// # Errors
    ///
    /// Fails when the cart, merchant or company is missing, the cart is
    /// empty or already settled, or the database fails. Shopify errors are
    /// logged and degraded around, never returned.
    #[instrument(skip(self, request, now), fields(merchant_id = %request.merchant_id, cart_id = %request.cart_id))]
    pub async fn create_checkout(
        &self,
        request: CheckoutRequest,
        now: DateTime<Utc>,
    ) -> Result<CheckoutResult, CheckoutError> {
        let CheckoutRequest {
            merchant_id,
            cart_id,
            user_id,
        } = request;

        let cart = self
            .store
            .cart(merchant_id, cart_id)
            .await?
            .ok_or(CheckoutError::CartNotFound(cart_id))?;
        let merchant = self
            .store
            .merchant(merchant_id)
            .await?
            .filter(|m| m.is_active)
            .ok_or(CheckoutError::MerchantNotFound(merchant_id))?;

        if !cart.cart.status.can_checkout() {
            return Err(CheckoutError::InvalidStatus {
                cart_id,
                status: cart.cart.status,
            });
        }
        if cart.items.is_empty() {
            return Err(CheckoutError::EmptyCart(cart_id));
        }

        let pricing = PricingService::new(self.store);
        let company = pricing.company(merchant_id, cart.cart.company_id).await?;

        let lines = line_requests(&cart);
        let variant_ids: Vec<ShopifyVariantId> = lines.iter().map(|l| l.variant_id).collect();
        let snapshot = pricing.snapshot(merchant_id, &variant_ids, now).await?;

        // Min-cart rules are evaluated against what Shopify will charge.
        let shopify_total = snapshot.list_total(&lines);
        let prices = snapshot.price_all(
            Some(&company.pricing_context()),
            &lines,
            Some(shopify_total),
        );

        let reconciliation = reconcile(
            &lines
                .iter()
                .zip(&prices)
                .map(|(line, price)| ReconciledLine {
                    variant_id: line.variant_id,
                    quantity: line.quantity,
                    list_price: price.list_price,
                    unit_price: price.discounted_price,
                })
                .collect::<Vec<_>>(),
        );

        tracing::info!(
            shopify_total = %reconciliation.shopify_total,
            subtotal = %reconciliation.subtotal,
            "Reconciled cart against Shopify list prices"
        );

        let discount = match reconciliation.discount_amount() {
            Some(amount) => {
                self.provision_discount(&merchant, &cart, amount, now)
                    .await?
            }
            None => None,
        };

        let buyer_email = match user_id {
            Some(user_id) => self
                .store
                .company_user(company.id, user_id)
                .await?
                .map(|user| user.email),
            None => None,
        };

        let cart_lines: Vec<CartLine> = cart
            .items
            .iter()
            .map(|item| CartLine {
                variant_id: item.variant_id,
                quantity: item.quantity,
            })
            .collect();
        let code = discount.as_ref().map(|d| d.code.clone());

        let checkout_url = match self
            .gateway
            .create_cart(
                &merchant,
                &CartRequest {
                    cart_id,
                    lines: cart_lines.clone(),
                    discount_code: code.clone(),
                    buyer_email,
                },
            )
            .await
        {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(error = %e, "Storefront cart creation failed, using cart permalink");
                cart_permalink(&merchant.shop_domain, &cart_lines, code.as_deref())
            }
        };

        self.store.approve_cart(cart_id, &checkout_url).await?;

        let savings = discount
            .as_ref()
            .map_or(Decimal::ZERO, |d| d.discount_amount);

        Ok(CheckoutResult {
            checkout_url,
            discount_code: code,
            total: reconciliation.shopify_total - savings,
            savings,
        })
    }

    /// Mint a code locally, then in Shopify. Returns the code to attach, if any.
    async fn provision_discount(
        &self,
        merchant: &Merchant,
        cart: &CartWithItems,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Option<DiscountCode>, CheckoutError> {
        let discount = self.insert_unique_code(cart, amount).await?;

        let remote = self
            .gateway
            .create_discount(
                merchant,
                &FixedDiscount {
                    code: discount.code.clone(),
                    amount: Price::new(amount, merchant.currency_code),
                    starts_at: now,
                },
            )
            .await;

        match remote {
            Ok(created) => {
                self.store.mark_discount_synced(discount.id, created).await?;
                Ok(Some(discount))
            }
            Err(e) => {
                let message = e.to_string();
                let orphaned_price_rule_id = e.orphaned_price_rule();
                tracing::warn!(
                    error = %message,
                    code = %discount.code,
                    orphaned_price_rule_id,
                    policy = ?self.config.sync_failure_policy,
                    "Shopify rejected checkout discount code"
                );
                self.store
                    .mark_discount_failed(discount.id, &message, orphaned_price_rule_id)
                    .await?;

                match self.config.sync_failure_policy {
                    DiscountSyncFailurePolicy::Keep => Ok(Some(discount)),
                    // The failed row is the only record of a leftover price rule
                    DiscountSyncFailurePolicy::Discard if orphaned_price_rule_id.is_some() => {
                        Ok(None)
                    }
                    DiscountSyncFailurePolicy::Discard => {
                        self.store.delete_discount_code(discount.id).await?;
                        Ok(None)
                    }
                }
            }
        }
    }

    async fn insert_unique_code(
        &self,
        cart: &CartWithItems,
        amount: Decimal,
    ) -> Result<DiscountCode, CheckoutError> {
        let mut attempt = 1;
        loop {
            let new = NewDiscountCode {
                code: generate_code(&self.config.code_prefix),
                merchant_id: cart.cart.merchant_id,
                company_id: cart.cart.company_id,
                cart_id: cart.cart.id,
                discount_amount: amount,
            };

            match self.store.insert_discount_code(&new).await {
                Err(RepositoryError::Conflict(_)) if attempt < CODE_ATTEMPTS => {
                    tracing::debug!(attempt, "Discount code collision, regenerating");
                    attempt += 1;
                }
                result => return result.map_err(CheckoutError::from),
            }
        }
    }
}

/// One pricing line per cart item, carrying the list price snapshot as fallback.
fn line_requests(cart: &CartWithItems) -> Vec<LineRequest> {
    cart.items
        .iter()
        .map(|item| LineRequest {
            variant_id: item.variant_id,
            quantity: item.quantity,
            fallback_list_price: Some(item.list_price),
        })
        .collect()
}
