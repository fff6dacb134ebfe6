//! Business logic between the routes and the repositories.
//!
//! Services that make decisions (pricing, checkout, carts) are generic over
//! small store/gateway traits so they can run against in-memory fakes in
//! tests. [`crate::db::PgStore`] and [`crate::shopify::ShopifyClients`] are the
//! production implementations.

pub mod carts;
pub mod catalog_sync;
pub mod checkout;
pub mod discount_codes;
pub mod jobs;
pub mod pricing;

#[cfg(test)]
pub(crate) mod testing;

pub use carts::{CartError, CartService, CartStore, ConversionOutcome, OrderNotification};
pub use catalog_sync::{CatalogSync, CatalogSyncError, SyncReport};
pub use checkout::{
    CheckoutError, CheckoutGateway, CheckoutReconciler, CheckoutRequest, CheckoutResult,
    CheckoutStore,
};
pub use pricing::{PriceRequest, PricingError, PricingService, PricingSnapshot, PricingStore};
