//! Shopify API clients.
//!
//! Merchants bring their own tokens, so clients are cheap per-merchant views
//! over one shared `reqwest::Client`:
//!
//! - [`AdminClient`] - Admin REST API (price rules, discount codes, catalog reads)
//! - [`StorefrontClient`] - Storefront GraphQL API (cart creation)
//!
//! GraphQL requests use `graphql_client`'s request/response envelopes with
//! `reqwest` 0.13 for HTTP.

mod admin;
pub mod gateway;
pub mod permalink;
mod storefront;

use std::time::Duration;

use thiserror::Error;

pub use admin::{
    AdminClient, CreatedDiscount, FixedDiscount, PAGE_LIMIT, RestCollect, RestProduct, RestVariant,
};
pub use storefront::{CART_ATTRIBUTE_KEY, CartLine, CartRequest, CreatedCart, StorefrontClient};

use crate::config::ShopifyConfig;
use crate::models::Merchant;

/// Errors that can occur when talking to Shopify.
#[derive(Debug, Error)]
pub enum ShopifyError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// GraphQL query returned errors.
    #[error("GraphQL errors: {}", format_graphql_errors(.0))]
    GraphQL(Vec<GraphQLError>),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Non-success HTTP status not covered by a more specific variant.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Rate limited by Shopify.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Authentication/authorization failed.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// User error from a mutation or a 422 response (e.g., invalid input).
    #[error("User error: {0}")]
    UserError(String),

    /// A price rule was created but its discount code was not, and the rule
    /// could not be deleted again.
    #[error("price rule {price_rule_id} left without a code: {source}")]
    OrphanedPriceRule {
        price_rule_id: i64,
        source: Box<ShopifyError>,
    },
}

impl ShopifyError {
    /// Id of a price rule that still exists in Shopify after this failure.
    #[must_use]
    pub const fn orphaned_price_rule(&self) -> Option<i64> {
        match self {
            Self::OrphanedPriceRule { price_rule_id, .. } => Some(*price_rule_id),
            _ => None,
        }
    }
}

/// A GraphQL error returned by the Shopify Storefront API.
#[derive(Debug, Clone)]
pub struct GraphQLError {
    /// Error message.
    pub message: String,
    /// Source locations in the query.
    pub locations: Vec<GraphQLErrorLocation>,
    /// Path to the error in the response.
    pub path: Vec<serde_json::Value>,
}

/// Location in a GraphQL query where an error occurred.
#[derive(Debug, Clone)]
pub struct GraphQLErrorLocation {
    /// Line number (1-indexed).
    pub line: i64,
    /// Column number (1-indexed).
    pub column: i64,
}

fn format_graphql_errors(errors: &[GraphQLError]) -> String {
    errors
        .iter()
        .map(|e| e.message.clone())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Truncate a response body for logs and error messages.
fn snippet(body: &str, max: usize) -> String {
    body.chars().take(max).collect()
}

/// Turn a non-success response into a [`ShopifyError`], or return its body.
async fn read_body(response: reqwest::Response) -> Result<String, ShopifyError> {
    let status = response.status();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(1);
        return Err(ShopifyError::RateLimited(retry_after));
    }

    let body = response.text().await?;

    if status.is_success() {
        return Ok(body);
    }

    tracing::error!(
        status = %status,
        body = %snippet(&body, 500),
        "Shopify API returned non-success status"
    );

    match status {
        reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
            Err(ShopifyError::Unauthorized(snippet(&body, 200)))
        }
        reqwest::StatusCode::UNPROCESSABLE_ENTITY => {
            Err(ShopifyError::UserError(snippet(&body, 200)))
        }
        _ => Err(ShopifyError::Status {
            status: status.as_u16(),
            body: snippet(&body, 200),
        }),
    }
}

/// Shared HTTP client and API settings for every merchant.
#[derive(Clone)]
pub struct ShopifyClients {
    http: reqwest::Client,
    api_version: String,
}

impl ShopifyClients {
    /// Build the shared HTTP client.
    ///
    /// # Errors
    ///
    /// Returns `ShopifyError::Http` if the TLS backend cannot be initialised.
    pub fn new(config: &ShopifyConfig) -> Result<Self, ShopifyError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            api_version: config.api_version.clone(),
        })
    }

    /// Admin REST client for `merchant`.
    #[must_use]
    pub fn admin<'a>(&'a self, merchant: &'a Merchant) -> AdminClient<'a> {
        AdminClient::new(&self.http, merchant, &self.api_version)
    }

    /// Storefront GraphQL client for `merchant`.
    #[must_use]
    pub fn storefront<'a>(&'a self, merchant: &'a Merchant) -> StorefrontClient<'a> {
        StorefrontClient::new(&self.http, merchant, &self.api_version)
    }
}
