//! [`CheckoutGateway`] backed by the real Shopify APIs.

use crate::models::Merchant;
use crate::services::CheckoutGateway;

use super::{CartRequest, CreatedDiscount, FixedDiscount, ShopifyClients, ShopifyError};

impl CheckoutGateway for ShopifyClients {
    async fn create_discount(
        &self,
        merchant: &Merchant,
        discount: &FixedDiscount,
    ) -> Result<CreatedDiscount, ShopifyError> {
        self.admin(merchant).create_fixed_discount(discount).await
    }

    /// Create the cart, then attach the buyer email if one is known.
    ///
    /// A failed buyer identity update keeps the anonymous cart's checkout URL.
    async fn create_cart(
        &self,
        merchant: &Merchant,
        cart: &CartRequest,
    ) -> Result<String, ShopifyError> {
        let storefront = self.storefront(merchant);
        let created = storefront.create_cart(cart).await?;

        let Some(email) = cart.buyer_email.as_deref() else {
            return Ok(created.checkout_url);
        };

        match storefront.update_buyer_identity(&created.id, email).await {
            Ok(updated) => Ok(updated.checkout_url),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    cart_id = %cart.cart_id,
                    "Failed to attach buyer identity, using anonymous checkout"
                );
                Ok(created.checkout_url)
            }
        }
    }
}
