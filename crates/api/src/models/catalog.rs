//! Catalog mirror of Shopify variants.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use tierline_core::pricing::VariantFacts;
use tierline_core::{MerchantId, ShopifyCollectionId, ShopifyProductId, ShopifyVariantId};

/// A Shopify variant as last seen by the catalog sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogVariant {
    pub merchant_id: MerchantId,
    pub variant_id: ShopifyVariantId,
    pub product_id: ShopifyProductId,
    pub title: String,
    pub sku: Option<String>,
    /// Storefront list price.
    pub price: Decimal,
    /// Product tags.
    pub tags: Vec<String>,
    pub collection_ids: Vec<ShopifyCollectionId>,
    pub updated_at: DateTime<Utc>,
}

impl CatalogVariant {
    #[must_use]
    pub fn facts(&self) -> VariantFacts {
        VariantFacts {
            variant_id: self.variant_id,
            product_id: self.product_id,
            list_price: self.price,
            tags: self.tags.clone(),
            collection_ids: self.collection_ids.clone(),
        }
    }
}

/// A variant row written by the catalog sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantUpsert {
    pub variant_id: ShopifyVariantId,
    pub product_id: ShopifyProductId,
    pub title: String,
    pub sku: Option<String>,
    pub price: Decimal,
    pub tags: Vec<String>,
    pub collection_ids: Vec<ShopifyCollectionId>,
}
