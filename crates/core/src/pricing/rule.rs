//! Merchant pricing rules.
//!
//! A rule says *who* it applies to ([`RuleTarget`]), *what* it applies to
//! ([`RuleScope`]) and *how much* it takes off ([`RuleDiscount`]), plus the
//! constraints that gate it (validity window, minimum cart amount, priority).
//!
//! The storage layer keeps these as flat columns with `*_type` discriminators;
//! the enums here are the validated shape the resolver works with.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{
    CompanyId, MerchantId, PricingRuleId, ShopifyCollectionId, ShopifyProductId, ShopifyVariantId,
};

/// Discriminator for [`RuleTarget`] as stored in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "b2b.rule_target_type", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    All,
    Company,
    CompanyGroup,
}

/// Discriminator for [`RuleScope`] as stored in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "b2b.rule_scope_type", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum ScopeType {
    All,
    Products,
    Collections,
    Tags,
    Variants,
}

/// Discriminator for [`RuleDiscount`] as stored in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "b2b.rule_discount_type", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    Percentage,
    FixedAmount,
    FixedPrice,
    QtyBreak,
}

/// Which buyers a rule applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleTarget {
    /// Every company of the merchant.
    All,
    /// A single company.
    #[serde(rename_all = "camelCase")]
    Company { company_id: CompanyId },
    /// Every company carrying this group label.
    #[serde(rename_all = "camelCase")]
    CompanyGroup { group: String },
}

impl RuleTarget {
    #[must_use]
    pub const fn kind(&self) -> TargetType {
        match self {
            Self::All => TargetType::All,
            Self::Company { .. } => TargetType::Company,
            Self::CompanyGroup { .. } => TargetType::CompanyGroup,
        }
    }
}

/// Which variants a rule applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleScope {
    All,
    #[serde(rename_all = "camelCase")]
    Products { product_ids: Vec<ShopifyProductId> },
    #[serde(rename_all = "camelCase")]
    Collections {
        collection_ids: Vec<ShopifyCollectionId>,
    },
    Tags { tags: Vec<String> },
    #[serde(rename_all = "camelCase")]
    Variants { variant_ids: Vec<ShopifyVariantId> },
}

impl RuleScope {
    #[must_use]
    pub const fn kind(&self) -> ScopeType {
        match self {
            Self::All => ScopeType::All,
            Self::Products { .. } => ScopeType::Products,
            Self::Collections { .. } => ScopeType::Collections,
            Self::Tags { .. } => ScopeType::Tags,
            Self::Variants { .. } => ScopeType::Variants,
        }
    }
}

/// One quantity-break tier.
///
/// A tier either replaces the unit price (`price`) or takes a percentage off
/// the list price (`percentage`). When both are present, `price` wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QtyBreak {
    /// Minimum quantity (inclusive) for this tier to apply.
    pub min_qty: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<Decimal>,
}

/// How a rule changes the price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleDiscount {
    /// Percentage off list (0-100).
    Percentage { percentage: Decimal },
    /// Absolute amount off list, floored at zero.
    FixedAmount { amount: Decimal },
    /// Replacement unit price.
    FixedPrice { price: Decimal },
    /// Tiered by requested quantity.
    QtyBreak { tiers: Vec<QtyBreak> },
}

impl RuleDiscount {
    #[must_use]
    pub const fn kind(&self) -> DiscountType {
        match self {
            Self::Percentage { .. } => DiscountType::Percentage,
            Self::FixedAmount { .. } => DiscountType::FixedAmount,
            Self::FixedPrice { .. } => DiscountType::FixedPrice,
            Self::QtyBreak { .. } => DiscountType::QtyBreak,
        }
    }
}

/// A stored, merchant-scoped pricing rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingRule {
    pub id: PricingRuleId,
    pub merchant_id: MerchantId,
    pub name: String,
    pub target: RuleTarget,
    pub scope: RuleScope,
    pub discount: RuleDiscount,
    /// Rule only applies when the cart total is at least this amount.
    pub min_cart_amount: Option<Decimal>,
    /// Higher wins.
    pub priority: i32,
    pub is_active: bool,
    /// Inclusive lower bound; `None` means unbounded.
    pub valid_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound; `None` means unbounded.
    pub valid_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Errors produced when validating a rule definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleValidationError {
    #[error("rule name cannot be empty")]
    EmptyName,
    #[error("percentage must be between 0 and 100 (got {0})")]
    PercentageOutOfRange(Decimal),
    #[error("{0} cannot be negative")]
    NegativeAmount(&'static str),
    #[error("quantity breaks need at least one tier")]
    NoTiers,
    #[error("quantity break tiers need a positive minimum quantity")]
    ZeroMinQty,
    #[error("duplicate quantity break tier for minimum quantity {0}")]
    DuplicateTier(u32),
    #[error("quantity break tier for {0} needs a price or a percentage")]
    EmptyTier(u32),
    #[error("{0} scope needs at least one entry")]
    EmptyScope(&'static str),
    #[error("company group cannot be empty")]
    EmptyCompanyGroup,
    #[error("valid_from must not be after valid_until")]
    InvertedWindow,
}

/// The merchant-editable part of a rule, as submitted for creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDraft {
    pub name: String,
    pub target: RuleTarget,
    pub scope: RuleScope,
    pub discount: RuleDiscount,
    #[serde(default)]
    pub min_cart_amount: Option<Decimal>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
}

impl RuleDraft {
    /// Check that the draft is internally consistent.
    ///
    /// # Errors
    ///
    /// Returns the first [`RuleValidationError`] found.
    pub fn validate(&self) -> Result<(), RuleValidationError> {
        if self.name.trim().is_empty() {
            return Err(RuleValidationError::EmptyName);
        }

        if let RuleTarget::CompanyGroup { group } = &self.target
            && group.trim().is_empty()
        {
            return Err(RuleValidationError::EmptyCompanyGroup);
        }

        let scope_is_empty = match &self.scope {
            RuleScope::All => false,
            RuleScope::Products { product_ids } => product_ids.is_empty(),
            RuleScope::Collections { collection_ids } => collection_ids.is_empty(),
            RuleScope::Tags { tags } => tags.iter().all(|t| t.trim().is_empty()),
            RuleScope::Variants { variant_ids } => variant_ids.is_empty(),
        };
        if scope_is_empty {
            return Err(RuleValidationError::EmptyScope(scope_label(self.scope.kind())));
        }

        validate_discount(&self.discount)?;

        if self.min_cart_amount.is_some_and(|m| m.is_sign_negative()) {
            return Err(RuleValidationError::NegativeAmount("min_cart_amount"));
        }

        if let (Some(from), Some(until)) = (self.valid_from, self.valid_until)
            && from > until
        {
            return Err(RuleValidationError::InvertedWindow);
        }

        Ok(())
    }

    /// Turn a validated draft into a stored rule.
    #[must_use]
    pub fn into_rule(
        self,
        id: PricingRuleId,
        merchant_id: MerchantId,
        created_at: DateTime<Utc>,
    ) -> PricingRule {
        PricingRule {
            id,
            merchant_id,
            name: self.name.trim().to_string(),
            target: self.target,
            scope: self.scope,
            discount: self.discount,
            min_cart_amount: self.min_cart_amount,
            priority: self.priority,
            is_active: true,
            valid_from: self.valid_from,
            valid_until: self.valid_until,
            created_at,
        }
    }
}

const fn scope_label(kind: ScopeType) -> &'static str {
    match kind {
        ScopeType::All => "all",
        ScopeType::Products => "products",
        ScopeType::Collections => "collections",
        ScopeType::Tags => "tags",
        ScopeType::Variants => "variants",
    }
}

fn validate_percentage(pct: Decimal) -> Result<(), RuleValidationError> {
    if pct.is_sign_negative() || pct > Decimal::ONE_HUNDRED {
        return Err(RuleValidationError::PercentageOutOfRange(pct));
    }
    Ok(())
}

fn validate_discount(discount: &RuleDiscount) -> Result<(), RuleValidationError> {
    match discount {
        RuleDiscount::Percentage { percentage } => validate_percentage(*percentage),
        RuleDiscount::FixedAmount { amount } if amount.is_sign_negative() => {
            Err(RuleValidationError::NegativeAmount("discount amount"))
        }
        RuleDiscount::FixedPrice { price } if price.is_sign_negative() => {
            Err(RuleValidationError::NegativeAmount("fixed price"))
        }
        RuleDiscount::FixedAmount { .. } | RuleDiscount::FixedPrice { .. } => Ok(()),
        RuleDiscount::QtyBreak { tiers } => {
            if tiers.is_empty() {
                return Err(RuleValidationError::NoTiers);
            }
            let mut seen = Vec::with_capacity(tiers.len());
            for tier in tiers {
                if tier.min_qty == 0 {
                    return Err(RuleValidationError::ZeroMinQty);
                }
                if seen.contains(&tier.min_qty) {
                    return Err(RuleValidationError::DuplicateTier(tier.min_qty));
                }
                seen.push(tier.min_qty);
                match (tier.price, tier.percentage) {
                    (None, None) => return Err(RuleValidationError::EmptyTier(tier.min_qty)),
                    (Some(price), _) if price.is_sign_negative() => {
                        return Err(RuleValidationError::NegativeAmount("tier price"));
                    }
                    (_, Some(pct)) => validate_percentage(pct)?,
                    _ => {}
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn draft(discount: RuleDiscount) -> RuleDraft {
        RuleDraft {
            name: "Wholesale".to_string(),
            target: RuleTarget::All,
            scope: RuleScope::All,
            discount,
            min_cart_amount: None,
            priority: 0,
            valid_from: None,
            valid_until: None,
        }
    }

    #[test]
    fn test_valid_percentage_draft() {
        let d = draft(RuleDiscount::Percentage {
            percentage: Decimal::new(20, 0),
        });
        assert!(d.validate().is_ok());
    }

    #[test]
    fn test_percentage_out_of_range() {
        let d = draft(RuleDiscount::Percentage {
            percentage: Decimal::new(101, 0),
        });
        assert_eq!(
            d.validate(),
            Err(RuleValidationError::PercentageOutOfRange(Decimal::new(101, 0)))
        );
    }

    #[test]
    fn test_negative_fixed_amount() {
        let d = draft(RuleDiscount::FixedAmount {
            amount: Decimal::new(-5, 0),
        });
        assert!(matches!(
            d.validate(),
            Err(RuleValidationError::NegativeAmount(_))
        ));
    }

    #[test]
    fn test_qty_break_tiers_validated() {
        let empty = draft(RuleDiscount::QtyBreak { tiers: vec![] });
        assert_eq!(empty.validate(), Err(RuleValidationError::NoTiers));

        let dup = draft(RuleDiscount::QtyBreak {
            tiers: vec![
                QtyBreak {
                    min_qty: 10,
                    price: Some(Decimal::new(9, 0)),
                    percentage: None,
                },
                QtyBreak {
                    min_qty: 10,
                    price: Some(Decimal::new(8, 0)),
                    percentage: None,
                },
            ],
        });
        assert_eq!(dup.validate(), Err(RuleValidationError::DuplicateTier(10)));

        let hollow = draft(RuleDiscount::QtyBreak {
            tiers: vec![QtyBreak {
                min_qty: 5,
                price: None,
                percentage: None,
            }],
        });
        assert_eq!(hollow.validate(), Err(RuleValidationError::EmptyTier(5)));
    }

    #[test]
    fn test_empty_scope_rejected() {
        let mut d = draft(RuleDiscount::FixedPrice {
            price: Decimal::new(10, 0),
        });
        d.scope = RuleScope::Tags { tags: vec![" ".to_string()] };
        assert_eq!(d.validate(), Err(RuleValidationError::EmptyScope("tags")));
    }

    #[test]
    fn test_inverted_window_rejected() {
        let mut d = draft(RuleDiscount::FixedPrice {
            price: Decimal::new(10, 0),
        });
        let now = Utc::now();
        d.valid_from = Some(now);
        d.valid_until = Some(now - chrono::Duration::days(1));
        assert_eq!(d.validate(), Err(RuleValidationError::InvertedWindow));
    }

    #[test]
    fn test_draft_deserializes_from_api_shape() {
        let json = serde_json::json!({
            "name": "Gold tier",
            "target": { "type": "company_group", "group": "gold" },
            "scope": { "type": "tags", "tags": ["bulk"] },
            "discount": { "type": "qty_break", "tiers": [
                { "minQty": 10, "price": "9" },
                { "minQty": 50, "percentage": "40" }
            ]},
            "priority": 5
        });
        let d: RuleDraft = serde_json::from_value(json).unwrap();
        assert_eq!(d.target.kind(), TargetType::CompanyGroup);
        assert_eq!(d.scope.kind(), ScopeType::Tags);
        assert_eq!(d.discount.kind(), DiscountType::QtyBreak);
        assert_eq!(d.priority, 5);
        assert!(d.validate().is_ok());
    }
}
