//! Shopify Storefront GraphQL client.
//!
//! Creates carts (and so checkout URLs) on behalf of a merchant using the
//! merchant's private storefront token.

use graphql_client::{QueryBody, Response};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use tierline_core::{CartId, ShopifyVariantId};

use super::{GraphQLError, GraphQLErrorLocation, ShopifyError, read_body, snippet};
use crate::models::Merchant;

/// Cart attribute carrying the Tierline cart id, echoed back on orders as a
/// note attribute.
pub const CART_ATTRIBUTE_KEY: &str = "b2b_cart_id";

const CART_CREATE: &str = r"
mutation CreateB2bCart($input: CartInput!) {
  cartCreate(input: $input) {
    cart { id checkoutUrl }
    userErrors { field message }
  }
}
";

const CART_BUYER_IDENTITY_UPDATE: &str = r"
mutation UpdateB2bBuyerIdentity($cartId: ID!, $buyerIdentity: CartBuyerIdentityInput!) {
  cartBuyerIdentityUpdate(cartId: $cartId, buyerIdentity: $buyerIdentity) {
    cart { id checkoutUrl }
    userErrors { field message }
  }
}
";

// =============================================================================
// Types
// =============================================================================

/// One line of a storefront cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartLine {
    pub variant_id: ShopifyVariantId,
    pub quantity: u32,
}

/// Everything needed to build a storefront cart for a B2B checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartRequest {
    pub cart_id: CartId,
    pub lines: Vec<CartLine>,
    pub discount_code: Option<String>,
    pub buyer_email: Option<String>,
}

/// A cart created in Shopify.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedCart {
    pub id: String,
    pub checkout_url: String,
}

#[derive(Debug, Serialize)]
struct CartCreateVariables {
    input: CartInput,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CartInput {
    lines: Vec<CartLineInput>,
    discount_codes: Vec<String>,
    attributes: Vec<AttributeInput>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CartLineInput {
    merchandise_id: String,
    quantity: u32,
}

#[derive(Debug, Serialize)]
struct AttributeInput {
    key: &'static str,
    value: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BuyerIdentityVariables<'a> {
    cart_id: &'a str,
    buyer_identity: BuyerIdentityInput<'a>,
}

#[derive(Debug, Serialize)]
struct BuyerIdentityInput<'a> {
    email: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CartCreateData {
    cart_create: Option<CartPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuyerIdentityData {
    cart_buyer_identity_update: Option<CartPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CartPayload {
    cart: Option<CreatedCart>,
    #[serde(default)]
    user_errors: Vec<UserError>,
}

#[derive(Debug, Deserialize)]
struct UserError {
    message: String,
}

impl CartPayload {
    fn into_cart(self) -> Result<CreatedCart, ShopifyError> {
        if !self.user_errors.is_empty() {
            let message = self
                .user_errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ShopifyError::UserError(message));
        }
        self.cart
            .ok_or_else(|| ShopifyError::UserError("no cart returned".to_string()))
    }
}

impl CartRequest {
    fn to_input(&self) -> CartInput {
        CartInput {
            lines: self
                .lines
                .iter()
                .map(|line| CartLineInput {
                    merchandise_id: line.variant_id.gid(),
                    quantity: line.quantity,
                })
                .collect(),
            discount_codes: self.discount_code.iter().cloned().collect(),
            attributes: vec![AttributeInput {
                key: CART_ATTRIBUTE_KEY,
                value: self.cart_id.to_string(),
            }],
        }
    }
}

// =============================================================================
// StorefrontClient
// =============================================================================

/// Storefront GraphQL client bound to one merchant.
pub struct StorefrontClient<'a> {
    http: &'a reqwest::Client,
    merchant: &'a Merchant,
    endpoint: String,
}

impl<'a> StorefrontClient<'a> {
    pub(super) fn new(http: &'a reqwest::Client, merchant: &'a Merchant, api_version: &str) -> Self {
        Self {
            http,
            merchant,
            endpoint: format!(
                "https://{}/api/{api_version}/graphql.json",
                merchant.shop_domain
            ),
        }
    }

    /// Execute a GraphQL operation.
    async fn execute<V, R>(
        &self,
        query: &'static str,
        operation_name: &'static str,
        variables: V,
    ) -> Result<R, ShopifyError>
    where
        V: Serialize + Send,
        R: DeserializeOwned,
    {
        let body = QueryBody {
            variables,
            query,
            operation_name,
        };

        let response = self
            .http
            .post(&self.endpoint)
            // Private access tokens use a different header than public tokens
            .header(
                "Shopify-Storefront-Private-Token",
                self.merchant.storefront_access_token.expose_secret(),
            )
            .json(&body)
            .send()
            .await?;

        let response_text = read_body(response).await?;

        let response: Response<R> = serde_json::from_str(&response_text).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %snippet(&response_text, 500),
                "Failed to parse Shopify GraphQL response"
            );
            ShopifyError::Parse(e)
        })?;

        if let Some(errors) = response.errors
            && !errors.is_empty()
        {
            tracing::debug!(errors = ?errors, "GraphQL errors in response");

            return Err(ShopifyError::GraphQL(
                errors
                    .into_iter()
                    .map(|e| GraphQLError {
                        message: e.message,
                        locations: e.locations.map_or_else(Vec::new, |locs| {
                            locs.into_iter()
                                .map(|l| GraphQLErrorLocation {
                                    line: i64::from(l.line),
                                    column: i64::from(l.column),
                                })
                                .collect()
                        }),
                        path: e.path.map_or_else(Vec::new, |p| {
                            p.into_iter()
                                .map(|fragment| match fragment {
                                    graphql_client::PathFragment::Key(s) => {
                                        serde_json::Value::String(s)
                                    }
                                    graphql_client::PathFragment::Index(i) => {
                                        serde_json::Value::Number(i.into())
                                    }
                                })
                                .collect()
                        }),
                    })
                    .collect(),
            ));
        }

        response.data.ok_or_else(|| {
            ShopifyError::GraphQL(vec![GraphQLError {
                message: "No data in response".to_string(),
                locations: vec![],
                path: vec![],
            }])
        })
    }

    /// Create a cart with the given lines, discount code and cart attribute.
    ///
    /// # Errors
    ///
    /// Returns `ShopifyError` if the request fails or Shopify reports user errors.
    #[instrument(skip(self, request), fields(shop = %self.merchant.shop_domain, cart_id = %request.cart_id))]
    pub async fn create_cart(&self, request: &CartRequest) -> Result<CreatedCart, ShopifyError> {
        let data: CartCreateData = self
            .execute(
                CART_CREATE,
                "CreateB2bCart",
                CartCreateVariables {
                    input: request.to_input(),
                },
            )
            .await?;

        data.cart_create
            .ok_or_else(|| ShopifyError::UserError("cartCreate returned nothing".to_string()))?
            .into_cart()
    }

    /// Attach a buyer email to an existing cart.
    ///
    /// # Errors
    ///
    /// Returns `ShopifyError` if the request fails or Shopify reports user errors.
    #[instrument(skip(self, email), fields(shop = %self.merchant.shop_domain))]
    pub async fn update_buyer_identity(
        &self,
        cart_gid: &str,
        email: &str,
    ) -> Result<CreatedCart, ShopifyError> {
        let data: BuyerIdentityData = self
            .execute(
                CART_BUYER_IDENTITY_UPDATE,
                "UpdateB2bBuyerIdentity",
                BuyerIdentityVariables {
                    cart_id: cart_gid,
                    buyer_identity: BuyerIdentityInput { email },
                },
            )
            .await?;

        data.cart_buyer_identity_update
            .ok_or_else(|| {
                ShopifyError::UserError("cartBuyerIdentityUpdate returned nothing".to_string())
            })?
            .into_cart()
    }
}
