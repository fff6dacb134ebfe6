//! Pricing rule repository.
//!
//! Rules are stored as flat columns with `*_type` discriminators so they can
//! be filtered and indexed in SQL; [`PricingRuleRow`] converts them into the
//! validated [`PricingRule`] shape.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use sqlx::types::Json;

use tierline_core::pricing::{
    DiscountType, PricingRule, QtyBreak, RuleDiscount, RuleScope, RuleTarget, ScopeType,
    TargetType,
};
use tierline_core::{
    CompanyId, MerchantId, PricingRuleId, ShopifyCollectionId, ShopifyProductId, ShopifyVariantId,
};

use super::RepositoryError;

// =============================================================================
// Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct PricingRuleRow {
    id: PricingRuleId,
    merchant_id: MerchantId,
    name: String,
    target_type: TargetType,
    target_company_id: Option<CompanyId>,
    target_company_group: Option<String>,
    scope_type: ScopeType,
    scope_product_ids: Vec<i64>,
    scope_collection_ids: Vec<i64>,
    scope_tags: Vec<String>,
    scope_variant_ids: Vec<i64>,
    discount_type: DiscountType,
    discount_value: Option<Decimal>,
    discount_percentage: Option<Decimal>,
    qty_breaks: Json<Vec<QtyBreak>>,
    min_cart_amount: Option<Decimal>,
    priority: i32,
    is_active: bool,
    valid_from: Option<DateTime<Utc>>,
    valid_until: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<PricingRuleRow> for PricingRule {
    type Error = RepositoryError;

    fn try_from(row: PricingRuleRow) -> Result<Self, Self::Error> {
        let corrupt = |what: &str| {
            RepositoryError::DataCorruption(format!("pricing rule {}: {what}", row.id))
        };

        let target = match row.target_type {
            TargetType::All => RuleTarget::All,
            TargetType::Company => RuleTarget::Company {
                company_id: row
                    .target_company_id
                    .ok_or_else(|| corrupt("company target without company id"))?,
            },
            TargetType::CompanyGroup => RuleTarget::CompanyGroup {
                group: row
                    .target_company_group
                    .clone()
                    .ok_or_else(|| corrupt("group target without group"))?,
            },
        };

        let scope = match row.scope_type {
            ScopeType::All => RuleScope::All,
            ScopeType::Products => RuleScope::Products {
                product_ids: row
                    .scope_product_ids
                    .iter()
                    .copied()
                    .map(ShopifyProductId::new)
                    .collect(),
            },
            ScopeType::Collections => RuleScope::Collections {
                collection_ids: row
                    .scope_collection_ids
                    .iter()
                    .copied()
                    .map(ShopifyCollectionId::new)
                    .collect(),
            },
            ScopeType::Tags => RuleScope::Tags {
                tags: row.scope_tags.clone(),
            },
            ScopeType::Variants => RuleScope::Variants {
                variant_ids: row
                    .scope_variant_ids
                    .iter()
                    .copied()
                    .map(ShopifyVariantId::new)
                    .collect(),
            },
        };

        let discount = match row.discount_type {
            DiscountType::Percentage => RuleDiscount::Percentage {
                percentage: row
                    .discount_percentage
                    .ok_or_else(|| corrupt("percentage rule without percentage"))?,
            },
            DiscountType::FixedAmount => RuleDiscount::FixedAmount {
                amount: row
                    .discount_value
                    .ok_or_else(|| corrupt("fixed amount rule without value"))?,
            },
            DiscountType::FixedPrice => RuleDiscount::FixedPrice {
                price: row
                    .discount_value
                    .ok_or_else(|| corrupt("fixed price rule without value"))?,
            },
            DiscountType::QtyBreak => RuleDiscount::QtyBreak {
                tiers: row.qty_breaks.0.clone(),
            },
        };

        Ok(Self {
            id: row.id,
            merchant_id: row.merchant_id,
            name: row.name,
            target,
            scope,
            discount,
            min_cart_amount: row.min_cart_amount,
            priority: row.priority,
            is_active: row.is_active,
            valid_from: row.valid_from,
            valid_until: row.valid_until,
            created_at: row.created_at,
        })
    }
}

/// Flat column values for an insert.
struct RuleColumns {
    target_company_id: Option<CompanyId>,
    target_company_group: Option<String>,
    scope_product_ids: Vec<i64>,
    scope_collection_ids: Vec<i64>,
    scope_tags: Vec<String>,
    scope_variant_ids: Vec<i64>,
    discount_value: Option<Decimal>,
    discount_percentage: Option<Decimal>,
    qty_breaks: Vec<QtyBreak>,
}

impl From<&PricingRule> for RuleColumns {
    fn from(rule: &PricingRule) -> Self {
        let mut columns = Self {
            target_company_id: None,
            target_company_group: None,
            scope_product_ids: Vec::new(),
            scope_collection_ids: Vec::new(),
            scope_tags: Vec::new(),
            scope_variant_ids: Vec::new(),
            discount_value: None,
            discount_percentage: None,
            qty_breaks: Vec::new(),
        };

        match &rule.target {
            RuleTarget::All => {}
            RuleTarget::Company { company_id } => columns.target_company_id = Some(*company_id),
            RuleTarget::CompanyGroup { group } => {
                columns.target_company_group = Some(group.trim().to_string());
            }
        }

        match &rule.scope {
            RuleScope::All => {}
            RuleScope::Products { product_ids } => {
                columns.scope_product_ids = product_ids.iter().map(ShopifyProductId::as_i64).collect();
            }
            RuleScope::Collections { collection_ids } => {
                columns.scope_collection_ids =
                    collection_ids.iter().map(ShopifyCollectionId::as_i64).collect();
            }
            RuleScope::Tags { tags } => {
                columns.scope_tags = tags
                    .iter()
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect();
            }
            RuleScope::Variants { variant_ids } => {
                columns.scope_variant_ids = variant_ids.iter().map(ShopifyVariantId::as_i64).collect();
            }
        }

        match &rule.discount {
            RuleDiscount::Percentage { percentage } => columns.discount_percentage = Some(*percentage),
            RuleDiscount::FixedAmount { amount } => columns.discount_value = Some(*amount),
            RuleDiscount::FixedPrice { price } => columns.discount_value = Some(*price),
            RuleDiscount::QtyBreak { tiers } => {
                let mut tiers = tiers.clone();
                tiers.sort_by_key(|tier| tier.min_qty);
                columns.qty_breaks = tiers;
            }
        }

        columns
    }
}

const RULE_COLUMNS: &str = "id, merchant_id, name, target_type, target_company_id, \
    target_company_group, scope_type, scope_product_ids, scope_collection_ids, scope_tags, \
    scope_variant_ids, discount_type, discount_value, discount_percentage, qty_breaks, \
    min_cart_amount, priority, is_active, valid_from, valid_until, created_at";

// =============================================================================
// Repository
// =============================================================================

/// Repository for merchant pricing rules.
pub struct PricingRuleRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> PricingRuleRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Active rules whose validity window contains `now`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if a row is inconsistent.
    pub async fn list_active(
        &self,
        merchant_id: MerchantId,
        now: DateTime<Utc>,
    ) -> Result<Vec<PricingRule>, RepositoryError> {
        let rows = sqlx::query_as::<_, PricingRuleRow>(&format!(
            r"
            SELECT {RULE_COLUMNS}
            FROM b2b.pricing_rules
            WHERE merchant_id = $1
              AND is_active
              AND (valid_from IS NULL OR valid_from <= $2)
              AND (valid_until IS NULL OR valid_until >= $2)
            "
        ))
        .bind(merchant_id)
        .bind(now)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// All rules of a merchant, highest priority first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        merchant_id: MerchantId,
        active_only: bool,
    ) -> Result<Vec<PricingRule>, RepositoryError> {
        let rows = sqlx::query_as::<_, PricingRuleRow>(&format!(
            r"
            SELECT {RULE_COLUMNS}
            FROM b2b.pricing_rules
            WHERE merchant_id = $1 AND (is_active OR NOT $2)
            ORDER BY priority DESC, created_at DESC
            "
        ))
        .bind(merchant_id)
        .bind(active_only)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Insert a new rule.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails (including a
    /// company target pointing at another merchant's company).
    pub async fn create(&self, rule: &PricingRule) -> Result<(), RepositoryError> {
        let columns = RuleColumns::from(rule);

        sqlx::query(
            r"
            INSERT INTO b2b.pricing_rules
                (id, merchant_id, name, target_type, target_company_id, target_company_group,
                 scope_type, scope_product_ids, scope_collection_ids, scope_tags, scope_variant_ids,
                 discount_type, discount_value, discount_percentage, qty_breaks,
                 min_cart_amount, priority, is_active, valid_from, valid_until, created_at, updated_at)
            SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                   $16, $17, $18, $19, $20, $21, $21
            WHERE $5::uuid IS NULL
               OR EXISTS (SELECT 1 FROM b2b.companies WHERE id = $5 AND merchant_id = $2)
            ",
        )
        .bind(rule.id)
        .bind(rule.merchant_id)
        .bind(&rule.name)
        .bind(rule.target.kind())
        .bind(columns.target_company_id)
        .bind(columns.target_company_group)
        .bind(rule.scope.kind())
        .bind(&columns.scope_product_ids)
        .bind(&columns.scope_collection_ids)
        .bind(&columns.scope_tags)
        .bind(&columns.scope_variant_ids)
        .bind(rule.discount.kind())
        .bind(columns.discount_value)
        .bind(columns.discount_percentage)
        .bind(Json(&columns.qty_breaks))
        .bind(rule.min_cart_amount)
        .bind(rule.priority)
        .bind(rule.is_active)
        .bind(rule.valid_from)
        .bind(rule.valid_until)
        .bind(rule.created_at)
        .execute(self.pool)
        .await
        .map_err(RepositoryError::Database)
        .and_then(|result| {
            if result.rows_affected() == 0 {
                Err(RepositoryError::NotFound)
            } else {
                Ok(())
            }
        })
    }

    /// Soft-deactivate a rule. Rules are never deleted.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the rule does not belong to the merchant.
    pub async fn deactivate(
        &self,
        merchant_id: MerchantId,
        id: PricingRuleId,
    ) -> Result<PricingRule, RepositoryError> {
        let row = sqlx::query_as::<_, PricingRuleRow>(&format!(
            r"
            UPDATE b2b.pricing_rules
            SET is_active = FALSE, updated_at = NOW()
            WHERE merchant_id = $1 AND id = $2
            RETURNING {RULE_COLUMNS}
            "
        ))
        .bind(merchant_id)
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn rule(target: RuleTarget, scope: RuleScope, discount: RuleDiscount) -> PricingRule {
        PricingRule {
            id: PricingRuleId::generate(),
            merchant_id: MerchantId::generate(),
            name: "Wholesale".to_string(),
            target,
            scope,
            discount,
            min_cart_amount: None,
            priority: 1,
            is_active: true,
            valid_from: None,
            valid_until: None,
            created_at: Utc::now(),
        }
    }

    fn row_for(rule: &PricingRule) -> PricingRuleRow {
        let columns = RuleColumns::from(rule);
        PricingRuleRow {
            id: rule.id,
            merchant_id: rule.merchant_id,
            name: rule.name.clone(),
            target_type: rule.target.kind(),
            target_company_id: columns.target_company_id,
            target_company_group: columns.target_company_group,
            scope_type: rule.scope.kind(),
            scope_product_ids: columns.scope_product_ids,
            scope_collection_ids: columns.scope_collection_ids,
            scope_tags: columns.scope_tags,
            scope_variant_ids: columns.scope_variant_ids,
            discount_type: rule.discount.kind(),
            discount_value: columns.discount_value,
            discount_percentage: columns.discount_percentage,
            qty_breaks: Json(columns.qty_breaks),
            min_cart_amount: rule.min_cart_amount,
            priority: rule.priority,
            is_active: rule.is_active,
            valid_from: rule.valid_from,
            valid_until: rule.valid_until,
            created_at: rule.created_at,
        }
    }

    #[test]
    fn test_flat_columns_restore_the_rule() {
        let original = rule(
            RuleTarget::CompanyGroup {
                group: "gold".to_string(),
            },
            RuleScope::Collections {
                collection_ids: vec![ShopifyCollectionId::new(44)],
            },
            RuleDiscount::FixedPrice {
                price: Decimal::new(950, 2),
            },
        );

        let restored = PricingRule::try_from(row_for(&original)).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn test_qty_breaks_are_stored_in_tier_order() {
        let original = rule(
            RuleTarget::All,
            RuleScope::All,
            RuleDiscount::QtyBreak {
                tiers: vec![
                    QtyBreak {
                        min_qty: 50,
                        price: Some(Decimal::from(7)),
                        percentage: None,
                    },
                    QtyBreak {
                        min_qty: 10,
                        price: Some(Decimal::from(9)),
                        percentage: None,
                    },
                ],
            },
        );

        let columns = RuleColumns::from(&original);
        let mins: Vec<u32> = columns.qty_breaks.iter().map(|t| t.min_qty).collect();
        assert_eq!(mins, vec![10, 50]);
    }

    #[test]
    fn test_missing_company_id_is_corruption() {
        let original = rule(
            RuleTarget::Company {
                company_id: CompanyId::generate(),
            },
            RuleScope::All,
            RuleDiscount::Percentage {
                percentage: Decimal::from(10),
            },
        );
        let mut row = row_for(&original);
        row.target_company_id = None;

        let err = PricingRule::try_from(row).unwrap_err();
        assert!(matches!(err, RepositoryError::DataCorruption(_)));
    }
}
