//! Shopify webhooks.
//!
//! Shopify signs each delivery with a base64 HMAC-SHA256 of the raw body,
//! keyed by the app's webhook secret. The body must be verified before it
//! is parsed.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use tierline_core::{CartId, ShopifyOrderId};

use crate::db::MerchantRepository;
use crate::error::AppError;
use crate::services::{CartService, ConversionOutcome, OrderNotification};
use crate::shopify::CART_ATTRIBUTE_KEY;
use crate::state::AppState;

pub const HMAC_HEADER: &str = "x-shopify-hmac-sha256";
pub const SHOP_DOMAIN_HEADER: &str = "x-shopify-shop-domain";

type HmacSha256 = Hmac<Sha256>;

/// Errors specific to webhook intake.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("missing {0} header")]
    MissingHeader(&'static str),

    #[error("invalid webhook signature")]
    InvalidSignature,

    #[error("unknown shop {0}")]
    UnknownShop(String),

    #[error("invalid order payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl From<WebhookError> for AppError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::MissingHeader(_) | WebhookError::InvalidSignature => {
                Self::Unauthorized(err.to_string())
            }
            WebhookError::UnknownShop(_) => Self::NotFound(err.to_string()),
            WebhookError::Payload(_) => Self::BadRequest(err.to_string()),
        }
    }
}

/// Check a Shopify webhook signature in constant time.
#[must_use]
pub fn verify_signature(secret: &[u8], body: &[u8], signature: &str) -> bool {
    let Ok(expected) = BASE64.decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// The fields of an `orders/create` payload we use.
#[derive(Debug, Deserialize)]
struct OrderPayload {
    id: i64,
    #[serde(default)]
    discount_codes: Vec<OrderDiscountCode>,
    #[serde(default)]
    note_attributes: Vec<NoteAttribute>,
}

#[derive(Debug, Deserialize)]
struct OrderDiscountCode {
    code: String,
}

#[derive(Debug, Deserialize)]
struct NoteAttribute {
    name: String,
    #[serde(default)]
    value: Option<String>,
}

impl From<OrderPayload> for OrderNotification {
    fn from(order: OrderPayload) -> Self {
        let cart_attribute = order
            .note_attributes
            .into_iter()
            .find(|attr| attr.name == CART_ATTRIBUTE_KEY)
            .and_then(|attr| attr.value);

        Self {
            order_id: ShopifyOrderId::new(order.id),
            discount_codes: order.discount_codes.into_iter().map(|d| d.code).collect(),
            cart_attribute,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookAck {
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    cart_id: Option<CartId>,
}

impl From<ConversionOutcome> for WebhookAck {
    fn from(outcome: ConversionOutcome) -> Self {
        match outcome {
            ConversionOutcome::Converted(cart_id) => Self {
                outcome: "converted",
                cart_id: Some(cart_id),
            },
            ConversionOutcome::NotApproved(cart_id) => Self {
                outcome: "not_approved",
                cart_id: Some(cart_id),
            },
            ConversionOutcome::NotB2b => Self {
                outcome: "ignored",
                cart_id: None,
            },
        }
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, WebhookError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or(WebhookError::MissingHeader(name))
}

/// `POST /webhooks/shopify/orders-create`
pub async fn orders_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let signature = header(&headers, HMAC_HEADER)?;
    let secret = state.config().shopify.webhook_secret.expose_secret();
    if !verify_signature(secret.as_bytes(), &body, signature) {
        tracing::warn!("Rejected webhook with invalid signature");
        return Err(WebhookError::InvalidSignature.into());
    }

    let shop = header(&headers, SHOP_DOMAIN_HEADER)?;
    let merchant = MerchantRepository::new(state.pool())
        .get_by_shop_domain(shop)
        .await?
        .ok_or_else(|| WebhookError::UnknownShop(shop.to_string()))?;

    let order: OrderPayload = serde_json::from_slice(&body).map_err(WebhookError::from)?;
    let outcome = CartService::new(state.store())
        .convert_from_order(merchant.id, &order.into())
        .await?;

    Ok((StatusCode::OK, Json(WebhookAck::from(outcome))).into_response())
}
