//! Catalog mirror refresh.
//!
//! Pages every active merchant's products and collection memberships from
//! the Admin REST API and upserts one `catalog_variants` row per variant.
//! Upserts are idempotent, so a sweep can be interrupted and re-run.

use std::collections::HashMap;

use sqlx::PgPool;
use thiserror::Error;
use tracing::instrument;

use tierline_core::{ShopifyCollectionId, ShopifyProductId};

use crate::db::{CatalogRepository, MerchantRepository, RepositoryError};
use crate::models::{Merchant, VariantUpsert};
use crate::shopify::{AdminClient, PAGE_LIMIT, RestCollect, RestProduct, ShopifyClients, ShopifyError};

/// Errors from syncing one merchant.
#[derive(Debug, Error)]
pub enum CatalogSyncError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Shopify(#[from] ShopifyError),
}

/// Totals from a sweep over all merchants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub merchants: usize,
    pub variants: u64,
    pub failures: usize,
}

/// Refreshes the catalog mirror from Shopify.
#[derive(Clone)]
pub struct CatalogSync {
    pool: PgPool,
    shopify: ShopifyClients,
}

impl CatalogSync {
    #[must_use]
    pub const fn new(pool: PgPool, shopify: ShopifyClients) -> Self {
        Self { pool, shopify }
    }

    /// Sync every active merchant. A failing merchant is logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns `CatalogSyncError::Repository` if the merchant list cannot be read.
    pub async fn sync_all(&self) -> Result<SyncReport, CatalogSyncError> {
        let merchants = MerchantRepository::new(&self.pool).list_active().await?;
        let mut report = SyncReport::default();

        for merchant in &merchants {
            match self.sync_merchant(merchant).await {
                Ok(written) => {
                    report.merchants += 1;
                    report.variants += written;
                }
                Err(e) => {
                    report.failures += 1;
                    tracing::warn!(
                        error = %e,
                        shop = %merchant.shop_domain,
                        "Catalog sync failed for merchant"
                    );
                }
            }
        }

        tracing::info!(
            merchants = report.merchants,
            variants = report.variants,
            failures = report.failures,
            "Catalog sync finished"
        );
        Ok(report)
    }

    /// Sync one merchant; returns the number of variants written.
    ///
    /// # Errors
    ///
    /// Returns `CatalogSyncError` if a Shopify page or the upsert fails.
    #[instrument(skip(self, merchant), fields(shop = %merchant.shop_domain))]
    pub async fn sync_merchant(&self, merchant: &Merchant) -> Result<u64, CatalogSyncError> {
        let admin = self.shopify.admin(merchant);
        let products = fetch_products(&admin).await?;
        let collects = fetch_collects(&admin).await?;

        let variants = assemble_variants(&products, &collects);
        let written = CatalogRepository::new(&self.pool)
            .upsert_variants(merchant.id, &variants)
            .await?;

        tracing::debug!(
            products = products.len(),
            collects = collects.len(),
            written,
            "Synced merchant catalog"
        );
        Ok(written)
    }
}

async fn fetch_products(admin: &AdminClient<'_>) -> Result<Vec<RestProduct>, ShopifyError> {
    let mut products = Vec::new();
    let mut since_id = None;

    loop {
        let page = admin.list_products(since_id).await?;
        let last_page = page.len() < PAGE_LIMIT;
        since_id = page.last().map(|p| p.id.as_i64());
        products.extend(page);

        if last_page || since_id.is_none() {
            return Ok(products);
        }
    }
}

async fn fetch_collects(admin: &AdminClient<'_>) -> Result<Vec<RestCollect>, ShopifyError> {
    let mut collects = Vec::new();
    let mut since_id = None;

    loop {
        let page = admin.list_collects(since_id).await?;
        let last_page = page.len() < PAGE_LIMIT;
        since_id = page.last().map(|c| c.id);
        collects.extend(page);

        if last_page || since_id.is_none() {
            return Ok(collects);
        }
    }
}

/// Split Shopify's comma-separated tag string, dropping blanks and repeats.
#[must_use]
pub fn parse_tags(tags: &str) -> Vec<String> {
    let mut parsed: Vec<String> = Vec::new();
    for tag in tags.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        if !parsed.iter().any(|seen| seen == tag) {
            parsed.push(tag.to_string());
        }
    }
    parsed
}

/// One upsert per variant, carrying its product's tags and collections.
#[must_use]
pub fn assemble_variants(products: &[RestProduct], collects: &[RestCollect]) -> Vec<VariantUpsert> {
    let mut collections: HashMap<ShopifyProductId, Vec<ShopifyCollectionId>> = HashMap::new();
    for collect in collects {
        collections
            .entry(collect.product_id)
            .or_default()
            .push(collect.collection_id);
    }
    for ids in collections.values_mut() {
        ids.sort_unstable();
        ids.dedup();
    }

    products
        .iter()
        .flat_map(|product| {
            let tags = parse_tags(&product.tags);
            let collection_ids = collections.get(&product.id).cloned().unwrap_or_default();

            product.variants.iter().map(move |variant| VariantUpsert {
                variant_id: variant.id,
                product_id: product.id,
                title: if variant.title == "Default Title" {
                    product.title.clone()
                } else {
                    format!("{} - {}", product.title, variant.title)
                },
                sku: variant.sku.clone().filter(|s| !s.is_empty()),
                price: variant.price,
                tags: tags.clone(),
                collection_ids: collection_ids.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use rust_decimal::Decimal;
    use tierline_core::ShopifyVariantId;

    use super::*;
    use crate::shopify::RestVariant;

    fn product(id: i64, tags: &str, variants: &[(i64, &str)]) -> RestProduct {
        RestProduct {
            id: ShopifyProductId::new(id),
            title: "Espresso Beans".to_string(),
            tags: tags.to_string(),
            variants: variants
                .iter()
                .map(|&(vid, title)| RestVariant {
                    id: ShopifyVariantId::new(vid),
                    title: title.to_string(),
                    sku: Some(String::new()),
                    price: Decimal::new(1850, 2),
                })
                .collect(),
        }
    }

    fn collect(id: i64, product_id: i64, collection_id: i64) -> RestCollect {
        RestCollect {
            id,
            product_id: ShopifyProductId::new(product_id),
            collection_id: ShopifyCollectionId::new(collection_id),
        }
    }

    #[test]
    fn test_parse_tags() {
        assert_eq!(
            parse_tags(" wholesale, coffee ,,wholesale"),
            vec!["wholesale".to_string(), "coffee".to_string()]
        );
        assert!(parse_tags("").is_empty());
    }

    #[test]
    fn test_variants_inherit_product_tags_and_collections() {
        let products = [
            product(10, "b2b, beans", &[(101, "1kg"), (102, "5kg")]),
            product(20, "", &[(201, "Default Title")]),
        ];
        let collects = [collect(1, 10, 500), collect(2, 10, 400), collect(3, 10, 500)];

        let variants = assemble_variants(&products, &collects);

        assert_eq!(variants.len(), 3);
        assert_eq!(variants[0].variant_id, ShopifyVariantId::new(101));
        assert_eq!(variants[0].title, "Espresso Beans - 1kg");
        assert_eq!(variants[0].tags, vec!["b2b".to_string(), "beans".to_string()]);
        assert_eq!(
            variants[1].collection_ids,
            vec![ShopifyCollectionId::new(400), ShopifyCollectionId::new(500)]
        );
        assert_eq!(variants[0].sku, None);

        assert_eq!(variants[2].title, "Espresso Beans");
        assert!(variants[2].tags.is_empty());
        assert!(variants[2].collection_ids.is_empty());
    }
}
