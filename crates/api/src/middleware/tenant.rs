//! Tenant resolution.
//!
//! Every business route runs on behalf of one merchant, named by the
//! `X-Merchant-Id` header. The buyer's company may come from
//! `X-Company-Id` or from the request body; handlers decide which wins.

use axum::{extract::FromRequestParts, http::request::Parts};

use tierline_core::{CompanyId, MerchantId};

use crate::error::AppError;
use crate::models::Merchant;
use crate::services::CheckoutStore;
use crate::state::AppState;

pub const MERCHANT_HEADER: &str = "x-merchant-id";
pub const COMPANY_HEADER: &str = "x-company-id";

/// The active merchant for a request, plus the company header if sent.
#[derive(Debug, Clone)]
pub struct Tenant {
    pub merchant: Merchant,
    pub company_id: Option<CompanyId>,
}

impl Tenant {
    #[must_use]
    pub const fn merchant_id(&self) -> MerchantId {
        self.merchant.id
    }

    /// The body's company if given, otherwise the header's.
    #[must_use]
    pub fn company_or(&self, body: Option<CompanyId>) -> Option<CompanyId> {
        body.or(self.company_id)
    }
}

/// Parse an optional id header. Present but malformed is an error.
fn header_id<T: std::str::FromStr>(parts: &Parts, name: &str) -> Result<Option<T>, AppError> {
    let Some(value) = parts.headers.get(name) else {
        return Ok(None);
    };

    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .map(Some)
        .ok_or_else(|| AppError::BadRequest(format!("invalid {name} header")))
}

impl FromRequestParts<AppState> for Tenant {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let merchant_id: MerchantId = header_id(parts, MERCHANT_HEADER)?
            .ok_or_else(|| AppError::Unauthorized(format!("missing {MERCHANT_HEADER} header")))?;
        let company_id = header_id(parts, COMPANY_HEADER)?;

        let merchant = state
            .store()
            .merchant(merchant_id)
            .await?
            .filter(|m| m.is_active)
            .ok_or_else(|| AppError::Unauthorized(format!("unknown merchant {merchant_id}")))?;

        tracing::Span::current().record("merchant_id", tracing::field::display(merchant_id));
        sentry::configure_scope(|scope| {
            scope.set_tag("merchant_id", merchant_id);
        });

        Ok(Self {
            merchant,
            company_id,
        })
    }
}
