//! Catalog mirror repository.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use tierline_core::{MerchantId, ShopifyCollectionId, ShopifyProductId, ShopifyVariantId};

use super::RepositoryError;
use crate::models::{CatalogVariant, VariantUpsert};

#[derive(Debug, sqlx::FromRow)]
struct CatalogVariantRow {
    merchant_id: MerchantId,
    shopify_variant_id: ShopifyVariantId,
    shopify_product_id: ShopifyProductId,
    title: String,
    sku: Option<String>,
    price: Decimal,
    tags: Vec<String>,
    collection_ids: Vec<i64>,
    updated_at: DateTime<Utc>,
}

impl From<CatalogVariantRow> for CatalogVariant {
    fn from(row: CatalogVariantRow) -> Self {
        Self {
            merchant_id: row.merchant_id,
            variant_id: row.shopify_variant_id,
            product_id: row.shopify_product_id,
            title: row.title,
            sku: row.sku,
            price: row.price,
            tags: row.tags,
            collection_ids: row
                .collection_ids
                .into_iter()
                .map(ShopifyCollectionId::new)
                .collect(),
            updated_at: row.updated_at,
        }
    }
}

/// Repository for the catalog mirror.
pub struct CatalogRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CatalogRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Load the mirrored variants among `variant_ids`. Unknown ids are skipped.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_variants(
        &self,
        merchant_id: MerchantId,
        variant_ids: &[ShopifyVariantId],
    ) -> Result<Vec<CatalogVariant>, RepositoryError> {
        if variant_ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = variant_ids.iter().map(ShopifyVariantId::as_i64).collect();
        let rows = sqlx::query_as::<_, CatalogVariantRow>(
            r"
            SELECT merchant_id, shopify_variant_id, shopify_product_id, title, sku,
                   price, tags, collection_ids, updated_at
            FROM b2b.catalog_variants
            WHERE merchant_id = $1 AND shopify_variant_id = ANY($2)
            ",
        )
        .bind(merchant_id)
        .bind(&ids)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Insert or refresh mirrored variants in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if any statement fails; nothing is
    /// written in that case.
    pub async fn upsert_variants(
        &self,
        merchant_id: MerchantId,
        variants: &[VariantUpsert],
    ) -> Result<u64, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0;

        for variant in variants {
            let collection_ids: Vec<i64> = variant
                .collection_ids
                .iter()
                .map(ShopifyCollectionId::as_i64)
                .collect();

            written += sqlx::query(
                r"
                INSERT INTO b2b.catalog_variants
                    (merchant_id, shopify_variant_id, shopify_product_id, title, sku,
                     price, tags, collection_ids, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
                ON CONFLICT (merchant_id, shopify_variant_id) DO UPDATE SET
                    shopify_product_id = EXCLUDED.shopify_product_id,
                    title = EXCLUDED.title,
                    sku = EXCLUDED.sku,
                    price = EXCLUDED.price,
                    tags = EXCLUDED.tags,
                    collection_ids = EXCLUDED.collection_ids,
                    updated_at = NOW()
                ",
            )
            .bind(merchant_id)
            .bind(variant.variant_id)
            .bind(variant.product_id)
            .bind(&variant.title)
            .bind(variant.sku.as_deref())
            .bind(variant.price)
            .bind(&variant.tags)
            .bind(&collection_ids)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        tx.commit().await?;
        Ok(written)
    }
}
