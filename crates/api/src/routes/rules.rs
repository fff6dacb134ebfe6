//! Pricing rule administration.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::Deserialize;

use tierline_core::PricingRuleId;
use tierline_core::pricing::{PricingRule, RuleDraft};

use crate::db::{PricingRuleRepository, RepositoryError};
use crate::error::AppError;
use crate::middleware::Tenant;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRulesQuery {
    #[serde(default)]
    pub active_only: bool,
}

/// `GET /pricing/rules`
pub async fn list(
    State(state): State<AppState>,
    tenant: Tenant,
    Query(query): Query<ListRulesQuery>,
) -> Result<Json<Vec<PricingRule>>, AppError> {
    let rules = PricingRuleRepository::new(state.pool())
        .list(tenant.merchant_id(), query.active_only)
        .await?;
    Ok(Json(rules))
}

/// `POST /pricing/rules`
pub async fn create(
    State(state): State<AppState>,
    tenant: Tenant,
    Json(draft): Json<RuleDraft>,
) -> Result<(StatusCode, Json<PricingRule>), AppError> {
    draft.validate()?;

    let rule = draft.into_rule(PricingRuleId::generate(), tenant.merchant_id(), Utc::now());
    PricingRuleRepository::new(state.pool())
        .create(&rule)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => {
                AppError::BadRequest("target company does not belong to this merchant".to_string())
            }
            other => other.into(),
        })?;

    tracing::info!(
        rule_id = %rule.id,
        merchant_id = %rule.merchant_id,
        priority = rule.priority,
        "Created pricing rule"
    );
    Ok((StatusCode::CREATED, Json(rule)))
}

/// `POST /pricing/rules/{id}/deactivate`
pub async fn deactivate(
    State(state): State<AppState>,
    tenant: Tenant,
    Path(id): Path<PricingRuleId>,
) -> Result<Json<PricingRule>, AppError> {
    let rule = PricingRuleRepository::new(state.pool())
        .deactivate(tenant.merchant_id(), id)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => AppError::NotFound(format!("pricing rule {id}")),
            other => other.into(),
        })?;

    tracing::info!(rule_id = %id, "Deactivated pricing rule");
    Ok(Json(rule))
}
