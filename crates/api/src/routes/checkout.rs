//! Checkout creation.

use axum::{Json, extract::State};
use chrono::Utc;
use serde::Deserialize;

use tierline_core::{CartId, CompanyUserId};

use crate::error::AppError;
use crate::middleware::Tenant;
use crate::services::{CheckoutReconciler, CheckoutRequest, CheckoutResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutBody {
    pub cart_id: CartId,
    #[serde(default)]
    pub user_id: Option<CompanyUserId>,
}

/// `POST /checkout/create`
///
/// Shopify failures degrade (no code synced, permalink instead of a
/// storefront cart) rather than failing the request.
pub async fn create(
    State(state): State<AppState>,
    tenant: Tenant,
    Json(body): Json<CreateCheckoutBody>,
) -> Result<Json<CheckoutResult>, AppError> {
    let result = CheckoutReconciler::new(state.store(), state.shopify(), &state.config().checkout)
        .create_checkout(
            CheckoutRequest {
                merchant_id: tenant.merchant_id(),
                cart_id: body.cart_id,
                user_id: body.user_id,
            },
            Utc::now(),
        )
        .await?;

    Ok(Json(result))
}
