//! Pricing resolution against the stored rules and catalog mirror.
//!
//! Loads the candidate rules and variant facts once per request, then hands
//! them to [`PricingResolver`], which does the actual rule selection without
//! any I/O.

use std::collections::HashMap;
use std::future::Future;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::instrument;

use tierline_core::pricing::{
    CompanyContext, LineRequest, PriceResult, PricingContext, PricingResolver, PricingRule,
    VariantFacts,
};
use tierline_core::{CompanyId, MerchantId, ShopifyVariantId, round_money};

use crate::db::RepositoryError;
use crate::models::{CatalogVariant, Company};

/// Reads the pricing resolver needs.
pub trait PricingStore: Send + Sync {
    /// A company of the merchant.
    fn company(
        &self,
        merchant_id: MerchantId,
        company_id: CompanyId,
    ) -> impl Future<Output = Result<Option<Company>, RepositoryError>> + Send;

    /// Active rules whose validity window contains `now`.
    fn active_rules(
        &self,
        merchant_id: MerchantId,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<PricingRule>, RepositoryError>> + Send;

    /// Mirrored variants among `variant_ids`; unknown ids are simply absent.
    fn variants(
        &self,
        merchant_id: MerchantId,
        variant_ids: &[ShopifyVariantId],
    ) -> impl Future<Output = Result<Vec<CatalogVariant>, RepositoryError>> + Send;
}

/// Errors from price calculation.
#[derive(Debug, Error)]
pub enum PricingError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("company {0} not found")]
    CompanyNotFound(CompanyId),
}

/// A batch price request for one merchant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceRequest {
    /// `None` prices for an anonymous buyer (only `all`-target rules apply).
    pub company_id: Option<CompanyId>,
    pub lines: Vec<LineRequest>,
    /// Enables rules with a minimum cart amount.
    pub cart_total: Option<Decimal>,
}

/// Rules and catalog facts loaded for one request.
#[derive(Debug, Clone)]
pub struct PricingSnapshot {
    rules: Vec<PricingRule>,
    variants: HashMap<ShopifyVariantId, VariantFacts>,
    now: DateTime<Utc>,
}

impl PricingSnapshot {
    #[must_use]
    pub fn new(rules: Vec<PricingRule>, variants: &[CatalogVariant], now: DateTime<Utc>) -> Self {
        Self {
            rules,
            variants: variants
                .iter()
                .map(|v| (v.variant_id, v.facts()))
                .collect(),
            now,
        }
    }

    /// Whether the catalog mirror knows this variant.
    #[must_use]
    pub fn knows(&self, variant_id: ShopifyVariantId) -> bool {
        self.variants.contains_key(&variant_id)
    }

    /// Current list price of a line, falling back to its snapshot (then zero).
    #[must_use]
    pub fn list_price(&self, line: &LineRequest) -> Decimal {
        let price = self.variants.get(&line.variant_id).map_or_else(
            || line.fallback_list_price.unwrap_or(Decimal::ZERO),
            |v| v.list_price,
        );
        round_money(price)
    }

    /// Σ list price × quantity.
    #[must_use]
    pub fn list_total(&self, lines: &[LineRequest]) -> Decimal {
        round_money(
            lines
                .iter()
                .map(|line| self.list_price(line) * Decimal::from(line.quantity))
                .sum(),
        )
    }

    /// Resolve every line, preserving order (and duplicates).
    #[must_use]
    pub fn price_all(
        &self,
        company: Option<&CompanyContext>,
        lines: &[LineRequest],
        cart_total: Option<Decimal>,
    ) -> Vec<PriceResult> {
        let resolver = PricingResolver::new(
            &self.rules,
            PricingContext {
                company,
                cart_total,
                now: self.now,
            },
        );

        lines
            .iter()
            .map(|line| resolver.price(line, self.variants.get(&line.variant_id)))
            .collect()
    }
}

/// Pricing entry point used by routes, carts and checkout.
pub struct PricingService<'a, S> {
    store: &'a S,
}

impl<'a, S: PricingStore> PricingService<'a, S> {
    #[must_use]
    pub const fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Load rules and the variants referenced by `variant_ids`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if either read fails.
    pub async fn snapshot(
        &self,
        merchant_id: MerchantId,
        variant_ids: &[ShopifyVariantId],
        now: DateTime<Utc>,
    ) -> Result<PricingSnapshot, RepositoryError> {
        let mut unique = variant_ids.to_vec();
        unique.sort_unstable();
        unique.dedup();

        let rules = self.store.active_rules(merchant_id, now).await?;
        let variants = self.store.variants(merchant_id, &unique).await?;

        Ok(PricingSnapshot::new(rules, &variants, now))
    }

    /// Look up an active company and turn it into a pricing context.
    ///
    /// # Errors
    ///
    /// Returns `PricingError::CompanyNotFound` for unknown or inactive companies.
    pub async fn company(
        &self,
        merchant_id: MerchantId,
        company_id: CompanyId,
    ) -> Result<Company, PricingError> {
        self.store
            .company(merchant_id, company_id)
            .await?
            .filter(|c| c.is_active)
            .ok_or(PricingError::CompanyNotFound(company_id))
    }

    /// Resolve B2B prices for a batch of variants.
    ///
    /// The result has one entry per requested line, in request order.
    /// Variants missing from the catalog are reported at list price zero with
    /// no discount rather than failing the batch.
    ///
    /// # Errors
    ///
    /// Returns `PricingError::CompanyNotFound` if `company_id` is not an
    /// active company of the merchant.
    #[instrument(skip(self, request), fields(merchant_id = %merchant_id, lines = request.lines.len()))]
    pub async fn calculate_prices(
        &self,
        merchant_id: MerchantId,
        request: &PriceRequest,
        now: DateTime<Utc>,
    ) -> Result<Vec<PriceResult>, PricingError> {
        let company = match request.company_id {
            Some(id) => Some(self.company(merchant_id, id).await?.pricing_context()),
            None => None,
        };

        let variant_ids: Vec<ShopifyVariantId> =
            request.lines.iter().map(|line| line.variant_id).collect();
        let snapshot = self.snapshot(merchant_id, &variant_ids, now).await?;

        Ok(snapshot.price_all(company.as_ref(), &request.lines, request.cart_total))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use tierline_core::pricing::{QtyBreak, RuleDiscount, RuleScope, RuleTarget};

    use super::*;
    use crate::services::testing::{FakeStore, dec, rule};

    #[tokio::test]
    async fn test_no_rules_keeps_list_price() {
        let store = FakeStore::new().with_variant(1, "100.00", &[], &[]);
        let service = PricingService::new(&store);

        let prices = service
            .calculate_prices(
                store.merchant_id,
                &PriceRequest {
                    company_id: Some(store.company_id),
                    lines: vec![LineRequest::new(ShopifyVariantId::new(1), 1)],
                    cart_total: None,
                },
                Utc::now(),
            )
            .await
            .unwrap();

        assert_eq!(prices[0].discounted_price, dec("100.00"));
        assert_eq!(prices[0].discount_percentage, Decimal::ZERO);
        assert_eq!(prices[0].applied_rule_id, None);
    }

    #[tokio::test]
    async fn test_results_follow_request_order_with_unknown_variants() {
        let store = FakeStore::new()
            .with_variant(1, "100.00", &[], &[])
            .with_variant(2, "12.00", &[], &[])
            .with_rule(rule(
                RuleTarget::All,
                RuleScope::All,
                RuleDiscount::Percentage {
                    percentage: dec("20"),
                },
                1,
            ));
        let service = PricingService::new(&store);

        let request = PriceRequest {
            company_id: None,
            lines: vec![
                LineRequest::new(ShopifyVariantId::new(2), 1),
                LineRequest::new(ShopifyVariantId::new(999), 1),
                LineRequest::new(ShopifyVariantId::new(1), 1),
            ],
            cart_total: None,
        };
        let now = Utc::now();
        let first = service
            .calculate_prices(store.merchant_id, &request, now)
            .await
            .unwrap();
        let second = service
            .calculate_prices(store.merchant_id, &request, now)
            .await
            .unwrap();

        assert_eq!(first, second);
        let ids: Vec<i64> = first.iter().map(|p| p.variant_id.as_i64()).collect();
        assert_eq!(ids, vec![2, 999, 1]);
        assert_eq!(first[0].discounted_price, dec("9.60"));
        assert_eq!(first[1].list_price, Decimal::ZERO);
        assert_eq!(first[1].applied_rule_id, None);
        assert_eq!(first[2].discounted_price, dec("80.00"));
        assert_eq!(first[2].discount_percentage, dec("20"));
    }

    #[tokio::test]
    async fn test_qty_break_uses_requested_quantity() {
        let store = FakeStore::new()
            .with_variant(7, "12.00", &[], &[])
            .with_rule(rule(
                RuleTarget::All,
                RuleScope::All,
                RuleDiscount::QtyBreak {
                    tiers: vec![
                        QtyBreak {
                            min_qty: 10,
                            price: Some(dec("9")),
                            percentage: None,
                        },
                        QtyBreak {
                            min_qty: 50,
                            price: Some(dec("7")),
                            percentage: None,
                        },
                    ],
                },
                1,
            ));
        let service = PricingService::new(&store);
        let variant = ShopifyVariantId::new(7);

        let prices = service
            .calculate_prices(
                store.merchant_id,
                &PriceRequest {
                    company_id: None,
                    lines: vec![
                        LineRequest::new(variant, 5),
                        LineRequest::new(variant, 10),
                        LineRequest::new(variant, 60),
                    ],
                    cart_total: None,
                },
                Utc::now(),
            )
            .await
            .unwrap();

        let unit: Vec<Decimal> = prices.iter().map(|p| p.discounted_price).collect();
        assert_eq!(unit, vec![dec("12.00"), dec("9.00"), dec("7.00")]);
    }

    #[tokio::test]
    async fn test_unknown_company_is_an_error() {
        let store = FakeStore::new();
        let service = PricingService::new(&store);

        let err = service
            .calculate_prices(
                store.merchant_id,
                &PriceRequest {
                    company_id: Some(CompanyId::generate()),
                    lines: vec![],
                    cart_total: None,
                },
                Utc::now(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, PricingError::CompanyNotFound(_)));
    }

    #[test]
    fn test_snapshot_list_price_falls_back_to_line_snapshot() {
        let snapshot = PricingSnapshot::new(vec![], &[], Utc::now());
        let line = LineRequest {
            variant_id: ShopifyVariantId::new(5),
            quantity: 3,
            fallback_list_price: Some(dec("4.50")),
        };

        assert!(!snapshot.knows(line.variant_id));
        assert_eq!(snapshot.list_price(&line), dec("4.50"));
        assert_eq!(snapshot.list_total(&[line]), dec("13.50"));
    }
}
