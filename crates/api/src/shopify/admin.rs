//! Shopify Admin REST API client.
//!
//! Only the handful of endpoints the B2B flow needs:
//!
//! - `POST price_rules.json` + `POST price_rules/{id}/discount_codes.json`
//!   to mint a one-time fixed-amount checkout code, and
//!   `DELETE price_rules/{id}.json` to clean up when the second call fails
//! - `GET products.json` / `GET collects.json` to refresh the catalog mirror

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use url::Url;

use tierline_core::{Price, ShopifyCollectionId, ShopifyProductId, ShopifyVariantId};

use super::{ShopifyError, read_body, snippet};
use crate::models::Merchant;

/// Page size for catalog listing (Shopify's maximum).
pub const PAGE_LIMIT: usize = 250;

const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";

// =============================================================================
// Request / Response Types
// =============================================================================

/// A single-use, whole-order fixed-amount discount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedDiscount {
    pub code: String,
    pub amount: Price,
    pub starts_at: DateTime<Utc>,
}

/// Shopify ids of a created discount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatedDiscount {
    pub price_rule_id: i64,
    pub discount_code_id: i64,
}

#[derive(Debug, Serialize)]
struct PriceRuleEnvelope<'a> {
    price_rule: PriceRuleInput<'a>,
}

#[derive(Debug, Serialize)]
struct PriceRuleInput<'a> {
    title: &'a str,
    value_type: &'static str,
    value: String,
    customer_selection: &'static str,
    target_type: &'static str,
    target_selection: &'static str,
    allocation_method: &'static str,
    usage_limit: u32,
    once_per_customer: bool,
    starts_at: DateTime<Utc>,
}

impl<'a> PriceRuleInput<'a> {
    fn fixed_amount(discount: &'a FixedDiscount) -> Self {
        Self {
            title: &discount.code,
            value_type: "fixed_amount",
            // Shopify expects the reduction as a negative amount
            value: format!("-{}", discount.amount.to_shopify_string()),
            customer_selection: "all",
            target_type: "line_item",
            target_selection: "all",
            allocation_method: "across",
            usage_limit: 1,
            once_per_customer: true,
            starts_at: discount.starts_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct DiscountCodeEnvelope<'a> {
    discount_code: DiscountCodeInput<'a>,
}

#[derive(Debug, Serialize)]
struct DiscountCodeInput<'a> {
    code: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreatedPriceRule {
    price_rule: IdOnly,
}

#[derive(Debug, Deserialize)]
struct CreatedDiscountCode {
    discount_code: IdOnly,
}

#[derive(Debug, Deserialize)]
struct IdOnly {
    id: i64,
}

/// A product as returned by `products.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct RestProduct {
    pub id: ShopifyProductId,
    pub title: String,
    /// Comma-separated tag list.
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub variants: Vec<RestVariant>,
}

/// A variant nested in [`RestProduct`].
#[derive(Debug, Clone, Deserialize)]
pub struct RestVariant {
    pub id: ShopifyVariantId,
    pub title: String,
    #[serde(default)]
    pub sku: Option<String>,
    pub price: Decimal,
}

/// A product-to-collection membership from `collects.json`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RestCollect {
    pub id: i64,
    pub product_id: ShopifyProductId,
    pub collection_id: ShopifyCollectionId,
}

#[derive(Debug, Deserialize)]
struct ProductsPage {
    products: Vec<RestProduct>,
}

#[derive(Debug, Deserialize)]
struct CollectsPage {
    collects: Vec<RestCollect>,
}

// =============================================================================
// AdminClient
// =============================================================================

/// Admin REST client bound to one merchant's shop and token.
pub struct AdminClient<'a> {
    http: &'a reqwest::Client,
    merchant: &'a Merchant,
    api_version: &'a str,
}

impl<'a> AdminClient<'a> {
    pub(super) const fn new(
        http: &'a reqwest::Client,
        merchant: &'a Merchant,
        api_version: &'a str,
    ) -> Self {
        Self {
            http,
            merchant,
            api_version,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, ShopifyError> {
        let raw = format!(
            "https://{}/admin/api/{}/{path}",
            self.merchant.shop_domain, self.api_version
        );
        Url::parse(&raw).map_err(|e| ShopifyError::UserError(format!("invalid shop URL: {e}")))
    }

    async fn get<R: DeserializeOwned>(&self, url: Url) -> Result<R, ShopifyError> {
        let response = self
            .http
            .get(url)
            .header(
                ACCESS_TOKEN_HEADER,
                self.merchant.admin_access_token.expose_secret(),
            )
            .header("Accept", "application/json")
            .send()
            .await?;

        parse(&read_body(response).await?)
    }

    async fn post<B: Serialize + Sync, R: DeserializeOwned>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<R, ShopifyError> {
        let response = self
            .http
            .post(url)
            .header(
                ACCESS_TOKEN_HEADER,
                self.merchant.admin_access_token.expose_secret(),
            )
            .json(body)
            .send()
            .await?;

        parse(&read_body(response).await?)
    }

    /// Delete a price rule and any codes under it.
    ///
    /// # Errors
    ///
    /// Returns `ShopifyError` if the request fails.
    #[instrument(skip(self), fields(shop = %self.merchant.shop_domain))]
    pub async fn delete_price_rule(&self, price_rule_id: i64) -> Result<(), ShopifyError> {
        let response = self
            .http
            .delete(self.endpoint(&format!("price_rules/{price_rule_id}.json"))?)
            .header(
                ACCESS_TOKEN_HEADER,
                self.merchant.admin_access_token.expose_secret(),
            )
            .send()
            .await?;

        read_body(response).await?;
        Ok(())
    }

    /// Create a single-use price rule and its discount code.
    ///
    /// When the code cannot be created the price rule is deleted again.
    ///
    /// # Errors
    ///
    /// Returns `ShopifyError` if either call fails, or
    /// `ShopifyError::OrphanedPriceRule` if the rule could not be deleted
    /// after the code was rejected.
    #[instrument(skip(self, discount), fields(shop = %self.merchant.shop_domain, code = %discount.code))]
    pub async fn create_fixed_discount(
        &self,
        discount: &FixedDiscount,
    ) -> Result<CreatedDiscount, ShopifyError> {
        let rule: CreatedPriceRule = self
            .post(
                self.endpoint("price_rules.json")?,
                &PriceRuleEnvelope {
                    price_rule: PriceRuleInput::fixed_amount(discount),
                },
            )
            .await?;

        let price_rule_id = rule.price_rule.id;
        let code: CreatedDiscountCode = match self
            .post(
                self.endpoint(&format!("price_rules/{price_rule_id}/discount_codes.json"))?,
                &DiscountCodeEnvelope {
                    discount_code: DiscountCodeInput {
                        code: &discount.code,
                    },
                },
            )
            .await
        {
            Ok(code) => code,
            Err(e) => return Err(self.discard_price_rule(price_rule_id, e).await),
        };

        tracing::info!(
            price_rule_id,
            discount_code_id = code.discount_code.id,
            "Created Shopify discount code"
        );

        Ok(CreatedDiscount {
            price_rule_id,
            discount_code_id: code.discount_code.id,
        })
    }

    /// Delete a price rule whose code was rejected; `cause` is the rejection.
    async fn discard_price_rule(&self, price_rule_id: i64, cause: ShopifyError) -> ShopifyError {
        match self.delete_price_rule(price_rule_id).await {
            Ok(()) => cause,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    price_rule_id,
                    "Failed to delete price rule after its discount code was rejected"
                );
                ShopifyError::OrphanedPriceRule {
                    price_rule_id,
                    source: Box::new(cause),
                }
            }
        }
    }

    /// One page of products with an id above `since_id`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `ShopifyError` if the request fails.
    #[instrument(skip(self), fields(shop = %self.merchant.shop_domain))]
    pub async fn list_products(&self, since_id: Option<i64>) -> Result<Vec<RestProduct>, ShopifyError> {
        let mut url = self.endpoint("products.json")?;
        page_query(&mut url, since_id, Some("id,title,tags,variants"));
        let page: ProductsPage = self.get(url).await?;
        Ok(page.products)
    }

    /// One page of collection memberships with an id above `since_id`.
    ///
    /// # Errors
    ///
    /// Returns `ShopifyError` if the request fails.
    #[instrument(skip(self), fields(shop = %self.merchant.shop_domain))]
    pub async fn list_collects(&self, since_id: Option<i64>) -> Result<Vec<RestCollect>, ShopifyError> {
        let mut url = self.endpoint("collects.json")?;
        page_query(&mut url, since_id, None);
        let page: CollectsPage = self.get(url).await?;
        Ok(page.collects)
    }
}

fn page_query(url: &mut Url, since_id: Option<i64>, fields: Option<&str>) {
    let mut query = url.query_pairs_mut();
    query.append_pair("limit", &PAGE_LIMIT.to_string());
    if let Some(since_id) = since_id {
        query.append_pair("since_id", &since_id.to_string());
    }
    if let Some(fields) = fields {
        query.append_pair("fields", fields);
    }
}

fn parse<R: DeserializeOwned>(body: &str) -> Result<R, ShopifyError> {
    serde_json::from_str(body).map_err(|e| {
        tracing::error!(
            error = %e,
            body = %snippet(body, 500),
            "Failed to parse Shopify REST response"
        );
        ShopifyError::Parse(e)
    })
}
