//! Batch price calculation.

use std::collections::HashMap;

use axum::{Json, extract::State};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;

use tierline_core::pricing::{LineRequest, PriceResult};
use tierline_core::{CompanyId, ShopifyVariantId};

use crate::error::AppError;
use crate::middleware::Tenant;
use crate::services::{PriceRequest, PricingService};
use crate::state::AppState;

/// A variant id as a client sends it: the number we return in `variantId`,
/// or a string holding a number or a `gid://shopify/ProductVariant/...` id.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RawVariantId {
    Number(i64),
    Text(String),
}

impl RawVariantId {
    fn parse(&self) -> Option<ShopifyVariantId> {
        match self {
            Self::Number(id) => Some(ShopifyVariantId::new(*id)),
            Self::Text(raw) => ShopifyVariantId::parse(raw),
        }
    }

    /// The id as it appears as a `quantities` key.
    fn key(&self) -> String {
        match self {
            Self::Number(id) => id.to_string(),
            Self::Text(raw) => raw.clone(),
        }
    }
}

/// `POST /pricing/calculate` body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatePricesBody {
    pub variant_ids: Vec<RawVariantId>,
    #[serde(default)]
    pub company_id: Option<CompanyId>,
    /// Quantity per variant id as sent in `variantIds` (numbers as their
    /// decimal string, since JSON keys are strings); missing means 1.
    #[serde(default)]
    pub quantities: HashMap<String, u32>,
    #[serde(default)]
    pub cart_total: Option<Decimal>,
}

impl CalculatePricesBody {
    /// Turn the body into pricing lines, in request order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` for an unparseable variant id or a
    /// negative cart total.
    pub fn lines(&self) -> Result<Vec<LineRequest>, AppError> {
        if self.cart_total.is_some_and(|total| total.is_sign_negative()) {
            return Err(AppError::BadRequest("cartTotal cannot be negative".to_string()));
        }

        self.variant_ids
            .iter()
            .map(|raw| {
                let key = raw.key();
                let variant_id = raw
                    .parse()
                    .ok_or_else(|| AppError::BadRequest(format!("invalid variant id `{key}`")))?;
                let quantity = self
                    .quantities
                    .get(&key)
                    .or_else(|| self.quantities.get(&variant_id.to_string()))
                    .copied()
                    .filter(|q| *q > 0)
                    .unwrap_or(1);

                Ok(LineRequest::new(variant_id, quantity))
            })
            .collect()
    }
}

/// Resolve B2B prices for the tenant's company (body wins over header).
///
/// Without a company only rules targeting every company apply.
pub async fn calculate(
    State(state): State<AppState>,
    tenant: Tenant,
    Json(body): Json<CalculatePricesBody>,
) -> Result<Json<Vec<PriceResult>>, AppError> {
    let request = PriceRequest {
        company_id: tenant.company_or(body.company_id),
        lines: body.lines()?,
        cart_total: body.cart_total,
    };

    let prices = PricingService::new(state.store())
        .calculate_prices(tenant.merchant_id(), &request, Utc::now())
        .await?;

    Ok(Json(prices))
}
