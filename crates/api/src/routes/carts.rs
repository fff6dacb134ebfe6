//! Cart endpoints.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::Deserialize;

use tierline_core::{CartId, CompanyId, CompanyUserId, ShopifyVariantId};

use crate::error::AppError;
use crate::middleware::Tenant;
use crate::models::CartWithItems;
use crate::services::CartService;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCartBody {
    #[serde(default)]
    pub company_id: Option<CompanyId>,
    #[serde(default)]
    pub user_id: Option<CompanyUserId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetItemBody {
    pub variant_id: String,
    pub quantity: u32,
}

/// `POST /carts`
pub async fn create(
    State(state): State<AppState>,
    tenant: Tenant,
    Json(body): Json<CreateCartBody>,
) -> Result<(StatusCode, Json<CartWithItems>), AppError> {
    let company_id = tenant
        .company_or(body.company_id)
        .ok_or_else(|| AppError::BadRequest("companyId is required".to_string()))?;

    let cart = CartService::new(state.store())
        .create_cart(tenant.merchant_id(), company_id, body.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(cart)))
}

/// `GET /carts/{id}`
pub async fn show(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(cart_id): Path<CartId>,
) -> Result<Json<CartWithItems>, AppError> {
    let cart = CartService::new(state.store())
        .get_cart(tenant.merchant_id(), cart_id)
        .await?;
    Ok(Json(cart))
}

/// `PUT /carts/{id}/items`
pub async fn set_item(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(cart_id): Path<CartId>,
    Json(body): Json<SetItemBody>,
) -> Result<Json<CartWithItems>, AppError> {
    let variant_id = ShopifyVariantId::parse(&body.variant_id)
        .ok_or_else(|| AppError::BadRequest(format!("invalid variant id `{}`", body.variant_id)))?;

    let cart = CartService::new(state.store())
        .set_item(
            tenant.merchant_id(),
            cart_id,
            variant_id,
            body.quantity,
            Utc::now(),
        )
        .await?;
    Ok(Json(cart))
}
