//! Discount code repository.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use tierline_core::{CartId, CompanyId, DiscountCodeId, DiscountSyncStatus, MerchantId};

use super::RepositoryError;
use crate::models::{DiscountCode, NewDiscountCode};

#[derive(Debug, sqlx::FromRow)]
struct DiscountCodeRow {
    id: DiscountCodeId,
    code: String,
    merchant_id: MerchantId,
    company_id: CompanyId,
    cart_id: CartId,
    discount_amount: Decimal,
    shopify_price_rule_id: Option<i64>,
    shopify_discount_id: Option<i64>,
    sync_status: DiscountSyncStatus,
    sync_error: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<DiscountCodeRow> for DiscountCode {
    fn from(row: DiscountCodeRow) -> Self {
        Self {
            id: row.id,
            code: row.code,
            merchant_id: row.merchant_id,
            company_id: row.company_id,
            cart_id: row.cart_id,
            discount_amount: row.discount_amount,
            shopify_price_rule_id: row.shopify_price_rule_id,
            shopify_discount_id: row.shopify_discount_id,
            sync_status: row.sync_status,
            sync_error: row.sync_error,
            created_at: row.created_at,
        }
    }
}

const CODE_COLUMNS: &str = "id, code, merchant_id, company_id, cart_id, discount_amount, \
    shopify_price_rule_id, shopify_discount_id, sync_status, sync_error, created_at";

/// Repository for checkout discount codes.
pub struct DiscountCodeRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> DiscountCodeRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a `pending` code.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the code string is already taken.
    pub async fn create(&self, new: &NewDiscountCode) -> Result<DiscountCode, RepositoryError> {
        let row = sqlx::query_as::<_, DiscountCodeRow>(&format!(
            r"
            INSERT INTO b2b.discount_codes
                (id, code, merchant_id, company_id, cart_id, discount_amount, sync_status)
            VALUES ($1, $2, $3, $4, $5, $6, 'pending')
            RETURNING {CODE_COLUMNS}
            "
        ))
        .bind(DiscountCodeId::generate())
        .bind(&new.code)
        .bind(new.merchant_id)
        .bind(new.company_id)
        .bind(new.cart_id)
        .bind(new.discount_amount)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_insert(e, "discount code"))?;

        Ok(row.into())
    }

    /// Record the Shopify ids of a code that was created remotely.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn mark_synced(
        &self,
        id: DiscountCodeId,
        price_rule_id: i64,
        discount_id: i64,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            UPDATE b2b.discount_codes
            SET sync_status = 'synced', shopify_price_rule_id = $2,
                shopify_discount_id = $3, sync_error = NULL
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(price_rule_id)
        .bind(discount_id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Record a failed remote creation, with the id of any price rule it
    /// left behind in Shopify.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn mark_failed(
        &self,
        id: DiscountCodeId,
        error: &str,
        orphaned_price_rule_id: Option<i64>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            UPDATE b2b.discount_codes
            SET sync_status = 'failed', sync_error = $2, shopify_price_rule_id = $3
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(error)
        .bind(orphaned_price_rule_id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Delete a code.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the delete fails.
    pub async fn delete(&self, id: DiscountCodeId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM b2b.discount_codes WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Find a code of a merchant by its (case-insensitive) string.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_by_code(
        &self,
        merchant_id: MerchantId,
        code: &str,
    ) -> Result<Option<DiscountCode>, RepositoryError> {
        let row = sqlx::query_as::<_, DiscountCodeRow>(&format!(
            r"
            SELECT {CODE_COLUMNS}
            FROM b2b.discount_codes
            WHERE merchant_id = $1 AND upper(code) = upper($2)
            "
        ))
        .bind(merchant_id)
        .bind(code)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }
}
