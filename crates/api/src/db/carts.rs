//! Cart repository.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use tierline_core::{
    CartId, CartItemId, CartStatus, CompanyId, CompanyUserId, MerchantId, ShopifyOrderId,
    ShopifyVariantId,
};

use super::{RepositoryError, quantity_from_db};
use crate::models::{Cart, CartItem, CartWithItems};

#[derive(Debug, sqlx::FromRow)]
struct CartRow {
    id: CartId,
    merchant_id: MerchantId,
    company_id: CompanyId,
    created_by_user_id: Option<CompanyUserId>,
    status: CartStatus,
    checkout_url: Option<String>,
    shopify_order_id: Option<ShopifyOrderId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CartRow> for Cart {
    fn from(row: CartRow) -> Self {
        Self {
            id: row.id,
            merchant_id: row.merchant_id,
            company_id: row.company_id,
            created_by_user_id: row.created_by_user_id,
            status: row.status,
            checkout_url: row.checkout_url,
            shopify_order_id: row.shopify_order_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CartItemRow {
    id: CartItemId,
    cart_id: CartId,
    shopify_variant_id: ShopifyVariantId,
    quantity: i32,
    list_price: Decimal,
    unit_price: Decimal,
}

impl TryFrom<CartItemRow> for CartItem {
    type Error = RepositoryError;

    fn try_from(row: CartItemRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            cart_id: row.cart_id,
            variant_id: row.shopify_variant_id,
            quantity: quantity_from_db(row.quantity)?,
            list_price: row.list_price,
            unit_price: row.unit_price,
        })
    }
}

const CART_COLUMNS: &str = "id, merchant_id, company_id, created_by_user_id, status, \
                            checkout_url, shopify_order_id, created_at, updated_at";

/// A line to write into a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemSnapshot {
    pub variant_id: ShopifyVariantId,
    pub quantity: u32,
    pub list_price: Decimal,
    pub unit_price: Decimal,
}

/// Repository for carts and their items.
pub struct CartRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CartRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create an empty draft cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create(
        &self,
        merchant_id: MerchantId,
        company_id: CompanyId,
        created_by: Option<CompanyUserId>,
    ) -> Result<Cart, RepositoryError> {
        let row = sqlx::query_as::<_, CartRow>(&format!(
            r"
            INSERT INTO b2b.carts (id, merchant_id, company_id, created_by_user_id, status)
            VALUES ($1, $2, $3, $4, 'draft')
            RETURNING {CART_COLUMNS}
            "
        ))
        .bind(CartId::generate())
        .bind(merchant_id)
        .bind(company_id)
        .bind(created_by)
        .fetch_one(self.pool)
        .await?;

        Ok(row.into())
    }

    /// Get a cart with its items, scoped to its merchant.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn get_with_items(
        &self,
        merchant_id: MerchantId,
        id: CartId,
    ) -> Result<Option<CartWithItems>, RepositoryError> {
        let Some(row) = sqlx::query_as::<_, CartRow>(&format!(
            "SELECT {CART_COLUMNS} FROM b2b.carts WHERE merchant_id = $1 AND id = $2"
        ))
        .bind(merchant_id)
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        else {
            return Ok(None);
        };

        let items = sqlx::query_as::<_, CartItemRow>(
            r"
            SELECT id, cart_id, shopify_variant_id, quantity, list_price, unit_price
            FROM b2b.cart_items
            WHERE cart_id = $1
            ORDER BY created_at, id
            ",
        )
        .bind(id)
        .fetch_all(self.pool)
        .await?
        .into_iter()
        .map(TryInto::try_into)
        .collect::<Result<Vec<CartItem>, _>>()?;

        Ok(Some(CartWithItems {
            cart: row.into(),
            items,
        }))
    }

    /// Insert or replace a line of a draft cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the cart is no longer a draft.
    pub async fn upsert_item(
        &self,
        cart_id: CartId,
        item: &ItemSnapshot,
    ) -> Result<(), RepositoryError> {
        let quantity = i32::try_from(item.quantity)
            .map_err(|_| RepositoryError::Conflict(format!("quantity {} too large", item.quantity)))?;

        let mut tx = self.pool.begin().await?;
        lock_draft(&mut tx, cart_id).await?;

        sqlx::query(
            r"
            INSERT INTO b2b.cart_items
                (id, cart_id, shopify_variant_id, quantity, list_price, unit_price)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (cart_id, shopify_variant_id) DO UPDATE SET
                quantity = EXCLUDED.quantity,
                list_price = EXCLUDED.list_price,
                unit_price = EXCLUDED.unit_price,
                updated_at = NOW()
            ",
        )
        .bind(CartItemId::generate())
        .bind(cart_id)
        .bind(item.variant_id)
        .bind(quantity)
        .bind(item.list_price)
        .bind(item.unit_price)
        .execute(&mut *tx)
        .await?;

        touch(&mut tx, cart_id).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Remove a line from a draft cart. Removing a missing line is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the cart is no longer a draft.
    pub async fn remove_item(
        &self,
        cart_id: CartId,
        variant_id: ShopifyVariantId,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        lock_draft(&mut tx, cart_id).await?;

        sqlx::query("DELETE FROM b2b.cart_items WHERE cart_id = $1 AND shopify_variant_id = $2")
            .bind(cart_id)
            .bind(variant_id)
            .execute(&mut *tx)
            .await?;

        touch(&mut tx, cart_id).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Store the checkout URL and move the cart to `approved`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the cart is neither draft nor approved.
    pub async fn approve(&self, cart_id: CartId, checkout_url: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE b2b.carts
            SET status = 'approved', checkout_url = $2, updated_at = NOW()
            WHERE id = $1 AND status IN ('draft', 'approved')
            ",
        )
        .bind(cart_id)
        .bind(checkout_url)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "cart {cart_id} cannot be approved"
            )));
        }
        Ok(())
    }

    /// Move an approved cart to `converted`. Returns `false` when the cart is
    /// not (or no longer) approved.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn convert(
        &self,
        merchant_id: MerchantId,
        cart_id: CartId,
        order_id: ShopifyOrderId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE b2b.carts
            SET status = 'converted', shopify_order_id = $3, updated_at = NOW()
            WHERE merchant_id = $1 AND id = $2 AND status = 'approved'
            ",
        )
        .bind(merchant_id)
        .bind(cart_id)
        .bind(order_id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark drafts untouched since `cutoff` as abandoned.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn mark_abandoned_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE b2b.carts
            SET status = 'abandoned', updated_at = NOW()
            WHERE status = 'draft' AND updated_at < $1 AND shopify_order_id IS NULL
            ",
        )
        .bind(cutoff)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

async fn lock_draft(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    cart_id: CartId,
) -> Result<(), RepositoryError> {
    let status: Option<CartStatus> =
        sqlx::query_scalar("SELECT status FROM b2b.carts WHERE id = $1 FOR UPDATE")
            .bind(cart_id)
            .fetch_optional(&mut **tx)
            .await?;

    match status {
        None => Err(RepositoryError::NotFound),
        Some(status) if status.is_editable() => Ok(()),
        Some(status) => Err(RepositoryError::Conflict(format!(
            "cart {cart_id} is {status} and can no longer be edited"
        ))),
    }
}

async fn touch(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    cart_id: CartId,
) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE b2b.carts SET updated_at = NOW() WHERE id = $1")
        .bind(cart_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}
