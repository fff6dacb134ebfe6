//! Rule drafts, as the API accepts them, through the resolver and into the
//! checkout discount.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde_json::json;

use tierline_core::pricing::{
    CompanyContext, LineRequest, PriceResult, PricingContext, PricingResolver, PricingRule,
    ReconciledLine, RuleDraft, VariantFacts, reconcile,
};
use tierline_core::{
    CompanyId, MerchantId, PricingRuleId, ShopifyCollectionId, ShopifyProductId, ShopifyVariantId,
};

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn rule_from_json(value: serde_json::Value, merchant_id: MerchantId, age_days: i64) -> PricingRule {
    let draft: RuleDraft = serde_json::from_value(value).unwrap();
    draft.validate().unwrap();
    draft.into_rule(
        PricingRuleId::generate(),
        merchant_id,
        Utc::now() - Duration::days(age_days),
    )
}

fn widget() -> VariantFacts {
    VariantFacts {
        variant_id: ShopifyVariantId::new(111),
        product_id: ShopifyProductId::new(10),
        list_price: dec("12.00"),
        tags: vec!["Wholesale".to_string()],
        collection_ids: vec![ShopifyCollectionId::new(500)],
    }
}

fn gadget() -> VariantFacts {
    VariantFacts {
        variant_id: ShopifyVariantId::new(222),
        product_id: ShopifyProductId::new(20),
        list_price: dec("40.00"),
        tags: Vec::new(),
        collection_ids: Vec::new(),
    }
}

#[test]
fn test_company_rule_outranks_group_rule_and_feeds_checkout_discount() {
    let merchant_id = MerchantId::generate();
    let company = CompanyContext {
        id: CompanyId::generate(),
        group: Some("distributors".to_string()),
    };

    let group_rule = rule_from_json(
        json!({
            "name": "Distributor tag discount",
            "target": { "type": "company_group", "group": "distributors" },
            "scope": { "type": "tags", "tags": ["wholesale"] },
            "discount": { "type": "percentage", "percentage": "10" },
            "priority": 5
        }),
        merchant_id,
        2,
    );
    let company_rule = rule_from_json(
        json!({
            "name": "Contract price",
            "target": { "type": "company", "companyId": company.id.to_string() },
            "scope": { "type": "variants", "variantIds": [111] },
            "discount": { "type": "fixed_price", "price": "9.00" },
            "priority": 10
        }),
        merchant_id,
        1,
    );
    let company_rule_id = company_rule.id;
    let rules = vec![group_rule, company_rule];

    let resolver = PricingResolver::new(
        &rules,
        PricingContext {
            company: Some(&company),
            cart_total: None,
            now: Utc::now(),
        },
    );

    let widget = widget();
    let gadget = gadget();
    let widget_line = LineRequest::new(widget.variant_id, 10);
    let gadget_line = LineRequest::new(gadget.variant_id, 2);

    let widget_price = resolver.price(&widget_line, Some(&widget));
    assert_eq!(widget_price.discounted_price, dec("9.00"));
    assert_eq!(widget_price.discount_percentage, dec("25"));
    assert_eq!(widget_price.applied_rule_id, Some(company_rule_id));

    let gadget_price = resolver.price(&gadget_line, Some(&gadget));
    assert_eq!(gadget_price.discounted_price, dec("40.00"));
    assert_eq!(gadget_price.applied_rule_id, None);

    let totals = reconcile(&[
        ReconciledLine {
            variant_id: widget.variant_id,
            quantity: widget_line.quantity,
            list_price: widget_price.list_price,
            unit_price: widget_price.discounted_price,
        },
        ReconciledLine {
            variant_id: gadget.variant_id,
            quantity: gadget_line.quantity,
            list_price: gadget_price.list_price,
            unit_price: gadget_price.discounted_price,
        },
    ]);
    assert_eq!(totals.shopify_total, dec("200.00"));
    assert_eq!(totals.subtotal, dec("170.00"));
    assert_eq!(totals.discount_amount(), Some(dec("30.00")));
}

#[test]
fn test_quantity_breaks_and_cart_minimum() {
    let merchant_id = MerchantId::generate();
    let company = CompanyContext {
        id: CompanyId::generate(),
        group: None,
    };
    let rules = vec![rule_from_json(
        json!({
            "name": "Bulk widget pricing",
            "target": { "type": "all" },
            "scope": { "type": "products", "productIds": [10] },
            "discount": {
                "type": "qty_break",
                "tiers": [
                    { "minQty": 10, "price": "10.00" },
                    { "minQty": 50, "percentage": "25" }
                ]
            },
            "minCartAmount": "100.00"
        }),
        merchant_id,
        1,
    )];
    let widget = widget();

    let price_at = |quantity: u32, cart_total: Option<Decimal>| {
        PricingResolver::new(
            &rules,
            PricingContext {
                company: Some(&company),
                cart_total,
                now: Utc::now(),
            },
        )
        .price(&LineRequest::new(widget.variant_id, quantity), Some(&widget))
        .discounted_price
    };

    // Below the first tier the rule leaves the list price alone
    assert_eq!(price_at(5, Some(dec("500"))), dec("12.00"));
    assert_eq!(price_at(10, Some(dec("500"))), dec("10.00"));
    assert_eq!(price_at(60, Some(dec("720"))), dec("9.00"));

    // Cart minimum not reached, or not known
    assert_eq!(price_at(60, Some(dec("99.99"))), dec("12.00"));
    assert_eq!(price_at(60, None), dec("12.00"));
}

#[test]
fn test_anonymous_buyer_only_sees_rules_for_everyone() {
    let merchant_id = MerchantId::generate();
    let rules = vec![
        rule_from_json(
            json!({
                "name": "Public sale",
                "target": { "type": "all" },
                "scope": { "type": "all" },
                "discount": { "type": "fixed_amount", "amount": "2.00" }
            }),
            merchant_id,
            3,
        ),
        rule_from_json(
            json!({
                "name": "Distributors",
                "target": { "type": "company_group", "group": "distributors" },
                "scope": { "type": "all" },
                "discount": { "type": "percentage", "percentage": "50" },
                "priority": 100
            }),
            merchant_id,
            1,
        ),
    ];

    let widget = widget();
    let price = PricingResolver::new(
        &rules,
        PricingContext {
            company: None,
            cart_total: None,
            now: Utc::now(),
        },
    )
    .price(&LineRequest::new(widget.variant_id, 1), Some(&widget));

    assert_eq!(price.discounted_price, dec("10.00"));
    assert_eq!(price.applied_rule_id, Some(rules[0].id));
}

#[test]
fn test_price_result_wire_shape() {
    let price = PriceResult::undiscounted(ShopifyVariantId::new(111), dec("12.50"));
    let value = serde_json::to_value(&price).unwrap();

    assert_eq!(value["variantId"], json!(111));
    assert_eq!(value["listPrice"], json!("12.50"));
    assert_eq!(value["discountedPrice"], json!("12.50"));
    assert!(value.get("appliedRuleId").is_none());
}

#[test]
fn test_invalid_drafts_are_rejected() {
    let inverted: RuleDraft = serde_json::from_value(json!({
        "name": "Backwards",
        "target": { "type": "all" },
        "scope": { "type": "all" },
        "discount": { "type": "percentage", "percentage": "10" },
        "validFrom": "2026-06-01T00:00:00Z",
        "validUntil": "2026-05-01T00:00:00Z"
    }))
    .unwrap();
    assert!(inverted.validate().is_err());

    let too_much: RuleDraft = serde_json::from_value(json!({
        "name": "Free stuff",
        "target": { "type": "all" },
        "scope": { "type": "all" },
        "discount": { "type": "percentage", "percentage": "150" }
    }))
    .unwrap();
    assert!(too_much.validate().is_err());
}
