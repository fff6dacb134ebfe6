//! Database operations for the B2B `PostgreSQL` schema.
//!
//! # Schema: `b2b`
//!
//! ## Tables
//!
//! - `merchants` - Tenants and their Shopify API tokens
//! - `companies` / `company_users` - Buyer organisations
//! - `catalog_variants` - Mirror of Shopify variants (price, tags, collections)
//! - `pricing_rules` - Merchant-defined B2B pricing rules
//! - `carts` / `cart_items` - Buyer carts with price snapshots
//! - `discount_codes` - One-time codes minted at checkout
//!
//! # Migrations
//!
//! Migrations are stored in `crates/api/migrations/` and run via:
//! ```bash
//! cargo run -p tierline-cli -- migrate
//! ```

pub mod carts;
pub mod catalog;
pub mod companies;
pub mod discount_codes;
pub mod merchants;
pub mod pricing_rules;
mod store;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use carts::CartRepository;
pub use catalog::CatalogRepository;
pub use companies::CompanyRepository;
pub use discount_codes::DiscountCodeRepository;
pub use merchants::MerchantRepository;
pub use pricing_rules::PricingRuleRepository;
pub use store::PgStore;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., duplicate discount code).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Map a unique-violation into [`RepositoryError::Conflict`].
    fn from_insert(err: sqlx::Error, what: &str) -> Self {
        if let sqlx::Error::Database(db_err) = &err
            && db_err.is_unique_violation()
        {
            return Self::Conflict(format!("{what} already exists"));
        }
        Self::Database(err)
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Convert a stored `INTEGER` quantity into the unsigned domain type.
fn quantity_from_db(quantity: i32) -> Result<u32, RepositoryError> {
    u32::try_from(quantity)
        .map_err(|_| RepositoryError::DataCorruption(format!("negative quantity {quantity}")))
}
