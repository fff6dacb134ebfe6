//! Effective-rule selection and unit price computation.
//!
//! Everything in here is a pure function of the loaded rules, the variant
//! facts, the requested quantity and the cart total. Callers load the
//! candidate rules once per request and resolve every line against them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::rule::{PricingRule, QtyBreak, RuleDiscount, RuleScope, RuleTarget};
use crate::types::{
    CompanyId, PricingRuleId, ShopifyCollectionId, ShopifyProductId, ShopifyVariantId,
    round_money,
};

/// The buyer a price is being resolved for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanyContext {
    pub id: CompanyId,
    pub group: Option<String>,
}

/// What the catalog mirror knows about a variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantFacts {
    pub variant_id: ShopifyVariantId,
    pub product_id: ShopifyProductId,
    pub list_price: Decimal,
    pub tags: Vec<String>,
    pub collection_ids: Vec<ShopifyCollectionId>,
}

/// One variant to price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRequest {
    pub variant_id: ShopifyVariantId,
    pub quantity: u32,
    /// List price to report when the variant is missing from the catalog.
    pub fallback_list_price: Option<Decimal>,
}

impl LineRequest {
    #[must_use]
    pub const fn new(variant_id: ShopifyVariantId, quantity: u32) -> Self {
        Self {
            variant_id,
            quantity,
            fallback_list_price: None,
        }
    }
}

/// Resolved price for one variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceResult {
    pub variant_id: ShopifyVariantId,
    pub list_price: Decimal,
    pub discounted_price: Decimal,
    /// `(list - discounted) / list * 100`, recomputed from the actual prices.
    pub discount_percentage: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_rule_id: Option<PricingRuleId>,
}

impl PriceResult {
    /// A result that leaves the list price untouched.
    #[must_use]
    pub fn undiscounted(variant_id: ShopifyVariantId, list_price: Decimal) -> Self {
        let list_price = round_money(list_price);
        Self {
            variant_id,
            list_price,
            discounted_price: list_price,
            discount_percentage: Decimal::ZERO,
            applied_rule_id: None,
        }
    }
}

/// Everything about the request that rules are evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct PricingContext<'a> {
    /// `None` means an anonymous buyer: only rules targeting `all` apply.
    pub company: Option<&'a CompanyContext>,
    /// `None` means rules with a minimum cart amount never apply.
    pub cart_total: Option<Decimal>,
    pub now: DateTime<Utc>,
}

/// Resolves prices against an in-memory set of candidate rules.
#[derive(Debug, Clone, Copy)]
pub struct PricingResolver<'a> {
    rules: &'a [PricingRule],
    context: PricingContext<'a>,
}

impl<'a> PricingResolver<'a> {
    #[must_use]
    pub const fn new(rules: &'a [PricingRule], context: PricingContext<'a>) -> Self {
        Self { rules, context }
    }

    /// The single rule that wins for `variant`, if any.
    ///
    /// Highest priority wins; ties go to the newest rule, then to the larger
    /// id so the choice is stable across calls.
    #[must_use]
    pub fn effective_rule(&self, variant: &VariantFacts) -> Option<&'a PricingRule> {
        self.rules
            .iter()
            .filter(|rule| rule_matches(rule, variant, &self.context))
            .max_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then_with(|| a.created_at.cmp(&b.created_at))
                    .then_with(|| a.id.as_uuid().cmp(&b.id.as_uuid()))
            })
    }

    /// Price one line.
    ///
    /// A variant missing from the catalog keeps its (fallback) list price and
    /// reports no discount.
    #[must_use]
    pub fn price(&self, line: &LineRequest, variant: Option<&VariantFacts>) -> PriceResult {
        let Some(variant) = variant else {
            return PriceResult::undiscounted(
                line.variant_id,
                line.fallback_list_price.unwrap_or(Decimal::ZERO),
            );
        };

        let list_price = round_money(variant.list_price);
        let Some(rule) = self.effective_rule(variant) else {
            return PriceResult::undiscounted(line.variant_id, list_price);
        };

        let Some(discounted) = discounted_price(&rule.discount, list_price, line.quantity) else {
            return PriceResult::undiscounted(line.variant_id, list_price);
        };

        let discounted_price = round_money(discounted);
        PriceResult {
            variant_id: line.variant_id,
            list_price,
            discounted_price,
            discount_percentage: discount_percentage(list_price, discounted_price),
            applied_rule_id: Some(rule.id),
        }
    }
}

/// Whether `rule` applies to `variant` under `context`.
#[must_use]
pub fn rule_matches(rule: &PricingRule, variant: &VariantFacts, context: &PricingContext<'_>) -> bool {
    rule.is_active
        && is_live_at(rule, context.now)
        && targets(&rule.target, context.company)
        && covers(&rule.scope, variant)
        && admits_cart_total(rule.min_cart_amount, context.cart_total)
}

fn is_live_at(rule: &PricingRule, now: DateTime<Utc>) -> bool {
    rule.valid_from.is_none_or(|from| from <= now) && rule.valid_until.is_none_or(|until| now <= until)
}

fn targets(target: &RuleTarget, company: Option<&CompanyContext>) -> bool {
    match (target, company) {
        (RuleTarget::All, _) => true,
        (RuleTarget::Company { company_id }, Some(company)) => *company_id == company.id,
        (RuleTarget::CompanyGroup { group }, Some(company)) => {
            company.group.as_deref() == Some(group.as_str())
        }
        (_, None) => false,
    }
}

fn covers(scope: &RuleScope, variant: &VariantFacts) -> bool {
    match scope {
        RuleScope::All => true,
        RuleScope::Products { product_ids } => product_ids.contains(&variant.product_id),
        RuleScope::Collections { collection_ids } => collection_ids
            .iter()
            .any(|id| variant.collection_ids.contains(id)),
        // Shopify tags are case-insensitive
        RuleScope::Tags { tags } => tags.iter().any(|wanted| {
            variant
                .tags
                .iter()
                .any(|tag| tag.trim().eq_ignore_ascii_case(wanted.trim()))
        }),
        RuleScope::Variants { variant_ids } => variant_ids.contains(&variant.variant_id),
    }
}

fn admits_cart_total(min_cart_amount: Option<Decimal>, cart_total: Option<Decimal>) -> bool {
    match min_cart_amount {
        Some(min) if min > Decimal::ZERO => cart_total.is_some_and(|total| total >= min),
        _ => true,
    }
}

/// Unit price after applying `discount`, or `None` when it does not apply
/// at this quantity (a quantity below every tier).
#[must_use]
pub fn discounted_price(discount: &RuleDiscount, list_price: Decimal, quantity: u32) -> Option<Decimal> {
    match discount {
        RuleDiscount::Percentage { percentage } => Some(apply_percentage(list_price, *percentage)),
        RuleDiscount::FixedAmount { amount } => Some((list_price - amount).max(Decimal::ZERO)),
        RuleDiscount::FixedPrice { price } => Some(*price),
        RuleDiscount::QtyBreak { tiers } => {
            let tier = select_tier(tiers, quantity)?;
            match (tier.price, tier.percentage) {
                (Some(price), _) => Some(price),
                (None, Some(pct)) => Some(apply_percentage(list_price, pct)),
                (None, None) => None,
            }
        }
    }
}

/// Highest tier whose minimum quantity is reached.
#[must_use]
pub fn select_tier(tiers: &[QtyBreak], quantity: u32) -> Option<&QtyBreak> {
    tiers
        .iter()
        .filter(|tier| tier.min_qty <= quantity)
        .max_by_key(|tier| tier.min_qty)
}

fn apply_percentage(list_price: Decimal, percentage: Decimal) -> Decimal {
    let factor = Decimal::ONE - percentage / Decimal::ONE_HUNDRED;
    (list_price * factor).max(Decimal::ZERO)
}

/// Discount expressed as a percentage of list, rounded to two places.
///
/// Negative when the resolved price is above list (a fixed price rule set
/// higher than the storefront price).
#[must_use]
pub fn discount_percentage(list_price: Decimal, discounted_price: Decimal) -> Decimal {
    if list_price.is_zero() {
        return Decimal::ZERO;
    }
    round_money((list_price - discounted_price) / list_price * Decimal::ONE_HUNDRED).normalize()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::pricing::rule::DiscountType;
    use crate::types::MerchantId;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn rule(priority: i32, discount: RuleDiscount) -> PricingRule {
        PricingRule {
            id: PricingRuleId::generate(),
            merchant_id: MerchantId::new(uuid::Uuid::nil()),
            name: format!("rule-{priority}"),
            target: RuleTarget::All,
            scope: RuleScope::All,
            discount,
            min_cart_amount: None,
            priority,
            is_active: true,
            valid_from: None,
            valid_until: None,
            created_at: Utc::now(),
        }
    }

    fn variant(list_price: &str) -> VariantFacts {
        VariantFacts {
            variant_id: ShopifyVariantId::new(1001),
            product_id: ShopifyProductId::new(2001),
            list_price: dec(list_price),
            tags: vec!["Bulk".to_string()],
            collection_ids: vec![ShopifyCollectionId::new(3001)],
        }
    }

    fn company() -> CompanyContext {
        CompanyContext {
            id: CompanyId::generate(),
            group: Some("gold".to_string()),
        }
    }

    fn context(company: Option<&CompanyContext>, cart_total: Option<Decimal>) -> PricingContext<'_> {
        PricingContext {
            company,
            cart_total,
            now: Utc::now(),
        }
    }

    fn price_with(rules: &[PricingRule], v: &VariantFacts, qty: u32) -> PriceResult {
        let c = company();
        let resolver = PricingResolver::new(rules, context(Some(&c), None));
        resolver.price(&LineRequest::new(v.variant_id, qty), Some(v))
    }

    fn qty_break_rule() -> PricingRule {
        rule(
            1,
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
        )
    }

    #[test]
    fn test_no_rules_keeps_list_price() {
        let v = variant("19.99");
        let result = price_with(&[], &v, 1);
        assert_eq!(result.discounted_price, result.list_price);
        assert_eq!(result.discount_percentage, Decimal::ZERO);
        assert_eq!(result.applied_rule_id, None);
    }

    #[test]
    fn test_percentage_rule() {
        let v = variant("100");
        let rules = [rule(1, RuleDiscount::Percentage { percentage: dec("20") })];
        let result = price_with(&rules, &v, 1);
        assert_eq!(result.discounted_price, dec("80.00"));
        assert_eq!(result.discount_percentage, dec("20"));
        assert_eq!(result.applied_rule_id, Some(rules[0].id));
    }

    #[test]
    fn test_fixed_amount_floors_at_zero() {
        let v = variant("10");
        let rules = [rule(1, RuleDiscount::FixedAmount { amount: dec("15") })];
        let result = price_with(&rules, &v, 1);
        assert_eq!(result.discounted_price, Decimal::ZERO);
        assert_eq!(result.discount_percentage, dec("100"));
    }

    #[test]
    fn test_fixed_price_replaces_list() {
        let v = variant("40");
        let rules = [rule(1, RuleDiscount::FixedPrice { price: dec("30") })];
        let result = price_with(&rules, &v, 3);
        assert_eq!(result.discounted_price, dec("30"));
        assert_eq!(result.discount_percentage, dec("25"));
    }

    #[test]
    fn test_qty_break_tiers() {
        let v = variant("12");
        let rules = [qty_break_rule()];

        let below = price_with(&rules, &v, 5);
        assert_eq!(below.discounted_price, dec("12"));
        assert_eq!(below.discount_percentage, Decimal::ZERO);
        assert_eq!(below.applied_rule_id, None);

        assert_eq!(price_with(&rules, &v, 10).discounted_price, dec("9"));
        assert_eq!(price_with(&rules, &v, 60).discounted_price, dec("7"));
    }

    #[test]
    fn test_qty_break_percentage_tier() {
        let v = variant("50");
        let rules = [rule(
            1,
            RuleDiscount::QtyBreak {
                tiers: vec![QtyBreak {
                    min_qty: 2,
                    price: None,
                    percentage: Some(dec("10")),
                }],
            },
        )];
        assert_eq!(price_with(&rules, &v, 2).discounted_price, dec("45"));
    }

    #[test]
    fn test_highest_priority_wins() {
        let v = variant("100");
        let rules = [
            rule(1, RuleDiscount::Percentage { percentage: dec("10") }),
            rule(5, RuleDiscount::Percentage { percentage: dec("30") }),
        ];
        let result = price_with(&rules, &v, 1);
        assert_eq!(result.applied_rule_id, Some(rules[1].id));
        assert_eq!(result.discounted_price, dec("70"));
    }

    #[test]
    fn test_priority_tie_goes_to_newest_rule() {
        let v = variant("100");
        let mut older = rule(3, RuleDiscount::Percentage { percentage: dec("10") });
        older.created_at = Utc::now() - Duration::days(2);
        let newer = rule(3, RuleDiscount::Percentage { percentage: dec("15") });
        let rules = [newer.clone(), older];
        let result = price_with(&rules, &v, 1);
        assert_eq!(result.applied_rule_id, Some(newer.id));
    }

    #[test]
    fn test_inactive_and_expired_rules_ignored() {
        let v = variant("100");
        let mut inactive = rule(9, RuleDiscount::Percentage { percentage: dec("50") });
        inactive.is_active = false;
        let mut expired = rule(8, RuleDiscount::Percentage { percentage: dec("40") });
        expired.valid_until = Some(Utc::now() - Duration::hours(1));
        let mut future = rule(7, RuleDiscount::Percentage { percentage: dec("30") });
        future.valid_from = Some(Utc::now() + Duration::hours(1));
        let live = rule(1, RuleDiscount::Percentage { percentage: dec("5") });

        let rules = [inactive, expired, future, live.clone()];
        assert_eq!(price_with(&rules, &v, 1).applied_rule_id, Some(live.id));
    }

    #[test]
    fn test_validity_window_is_inclusive() {
        let v = variant("100");
        let now = Utc::now();
        let mut r = rule(1, RuleDiscount::Percentage { percentage: dec("10") });
        r.valid_from = Some(now);
        r.valid_until = Some(now);
        let rules = [r];
        let resolver = PricingResolver::new(
            &rules,
            PricingContext {
                company: None,
                cart_total: None,
                now,
            },
        );
        assert!(resolver.effective_rule(&v).is_some());
    }

    #[test]
    fn test_company_targeting() {
        let v = variant("100");
        let c = company();
        let mut mine = rule(2, RuleDiscount::Percentage { percentage: dec("10") });
        mine.target = RuleTarget::Company { company_id: c.id };
        let mut theirs = rule(9, RuleDiscount::Percentage { percentage: dec("90") });
        theirs.target = RuleTarget::Company {
            company_id: CompanyId::generate(),
        };
        let rules = [mine.clone(), theirs];

        let resolver = PricingResolver::new(&rules, context(Some(&c), None));
        assert_eq!(resolver.effective_rule(&v).map(|r| r.id), Some(mine.id));

        let anonymous = PricingResolver::new(&rules, context(None, None));
        assert!(anonymous.effective_rule(&v).is_none());
    }

    #[test]
    fn test_company_group_targeting() {
        let v = variant("100");
        let c = company();
        let mut gold = rule(1, RuleDiscount::Percentage { percentage: dec("10") });
        gold.target = RuleTarget::CompanyGroup {
            group: "gold".to_string(),
        };
        let mut silver = rule(5, RuleDiscount::Percentage { percentage: dec("5") });
        silver.target = RuleTarget::CompanyGroup {
            group: "silver".to_string(),
        };
        let rules = [gold.clone(), silver];
        let resolver = PricingResolver::new(&rules, context(Some(&c), None));
        assert_eq!(resolver.effective_rule(&v).map(|r| r.id), Some(gold.id));
    }

    #[test]
    fn test_scope_matching() {
        let v = variant("100");
        let c = company();
        let scopes = [
            (RuleScope::Tags { tags: vec!["bulk".to_string()] }, true),
            (RuleScope::Tags { tags: vec!["retail".to_string()] }, false),
            (
                RuleScope::Collections {
                    collection_ids: vec![ShopifyCollectionId::new(3001)],
                },
                true,
            ),
            (
                RuleScope::Products {
                    product_ids: vec![ShopifyProductId::new(9)],
                },
                false,
            ),
            (
                RuleScope::Variants {
                    variant_ids: vec![ShopifyVariantId::new(1001)],
                },
                true,
            ),
        ];

        for (scope, expected) in scopes {
            let mut r = rule(1, RuleDiscount::Percentage { percentage: dec("10") });
            r.scope = scope.clone();
            let rules = [r];
            let resolver = PricingResolver::new(&rules, context(Some(&c), None));
            assert_eq!(
                resolver.effective_rule(&v).is_some(),
                expected,
                "scope {scope:?}"
            );
        }
    }

    #[test]
    fn test_min_cart_amount_requires_total() {
        let v = variant("100");
        let c = company();
        let mut r = rule(1, RuleDiscount::Percentage { percentage: dec("10") });
        r.min_cart_amount = Some(dec("500"));
        let rules = [r];

        let without_total = PricingResolver::new(&rules, context(Some(&c), None));
        assert!(without_total.effective_rule(&v).is_none());

        let below = PricingResolver::new(&rules, context(Some(&c), Some(dec("499.99"))));
        assert!(below.effective_rule(&v).is_none());

        let at = PricingResolver::new(&rules, context(Some(&c), Some(dec("500"))));
        assert!(at.effective_rule(&v).is_some());
    }

    #[test]
    fn test_min_cart_amount_blocked_rule_falls_through_to_next() {
        let v = variant("100");
        let mut big = rule(9, RuleDiscount::Percentage { percentage: dec("30") });
        big.min_cart_amount = Some(dec("1000"));
        let small = rule(1, RuleDiscount::Percentage { percentage: dec("5") });
        let rules = [big, small.clone()];
        assert_eq!(price_with(&rules, &v, 1).applied_rule_id, Some(small.id));
    }

    #[test]
    fn test_unknown_variant_uses_fallback_price() {
        let rules = [rule(1, RuleDiscount::Percentage { percentage: dec("50") })];
        let resolver = PricingResolver::new(&rules, context(None, None));
        let mut line = LineRequest::new(ShopifyVariantId::new(404), 2);
        assert_eq!(resolver.price(&line, None).list_price, Decimal::ZERO);

        line.fallback_list_price = Some(dec("8.5"));
        let result = resolver.price(&line, None);
        assert_eq!(result.list_price, dec("8.50"));
        assert_eq!(result.discounted_price, dec("8.50"));
        assert_eq!(result.discount_percentage, Decimal::ZERO);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let v = variant("64.10");
        let rules = [qty_break_rule(), rule(0, RuleDiscount::FixedAmount { amount: dec("1.05") })];
        let first = price_with(&rules, &v, 12);
        let second = price_with(&rules, &v, 12);
        assert_eq!(first, second);
        assert_eq!(rules[0].discount.kind(), DiscountType::QtyBreak);
    }

    #[test]
    fn test_discount_percentage_rounding() {
        assert_eq!(discount_percentage(dec("3"), dec("2")), dec("33.33"));
        assert_eq!(discount_percentage(Decimal::ZERO, Decimal::ZERO), Decimal::ZERO);
        assert_eq!(discount_percentage(dec("10"), dec("12")), dec("-20"));
    }
}
