//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                          - Liveness
//! GET  /health/ready                    - Readiness (database)
//!
//! # Pricing (X-Merchant-Id required)
//! POST /pricing/calculate               - Resolve B2B prices for variants
//! GET  /pricing/rules                   - List rules (?activeOnly=true)
//! POST /pricing/rules                   - Create a rule
//! POST /pricing/rules/{id}/deactivate   - Soft-deactivate a rule
//!
//! # Carts (X-Merchant-Id required)
//! POST /carts                           - Create a draft cart
//! GET  /carts/{id}                      - Cart with items
//! PUT  /carts/{id}/items                - Set a line's quantity (0 removes)
//!
//! # Checkout (X-Merchant-Id required)
//! POST /checkout/create                 - Reconcile and create a Shopify checkout
//!
//! # Webhooks (HMAC signed)
//! POST /webhooks/shopify/orders-create  - Convert carts from Shopify orders
//! ```

pub mod carts;
pub mod checkout;
pub mod health;
pub mod pricing;
pub mod rules;
pub mod webhooks;

use axum::{
    Router,
    routing::{get, post, put},
};

use crate::state::AppState;

/// Build the full route tree.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .route("/pricing/calculate", post(pricing::calculate))
        .route("/pricing/rules", get(rules::list).post(rules::create))
        .route("/pricing/rules/{id}/deactivate", post(rules::deactivate))
        .route("/carts", post(carts::create))
        .route("/carts/{id}", get(carts::show))
        .route("/carts/{id}/items", put(carts::set_item))
        .route("/checkout/create", post(checkout::create))
        .route(
            "/webhooks/shopify/orders-create",
            post(webhooks::orders_create),
        )
}
