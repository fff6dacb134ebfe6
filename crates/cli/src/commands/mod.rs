//! CLI subcommands.

pub mod migrate;
pub mod sweep;
pub mod sync;

use thiserror::Error;

use tierline_api::config::{ApiConfig, ConfigError};
use tierline_api::services::{CartError, CatalogSyncError};
use tierline_api::shopify::ShopifyError;

/// Errors from the one-shot job commands.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Shopify client error: {0}")]
    Shopify(#[from] ShopifyError),

    #[error("Catalog sync failed: {0}")]
    CatalogSync(#[from] CatalogSyncError),

    #[error("Cart sweep failed: {0}")]
    Cart(#[from] CartError),

    #[error("Catalog sync failed for all {0} merchants")]
    NothingSynced(usize),
}

/// Load the API configuration and connect to its database.
async fn connect() -> Result<(ApiConfig, sqlx::PgPool), JobError> {
    let config = ApiConfig::from_env()?;

    tracing::info!("Connecting to database...");
    let pool = tierline_api::db::create_pool(&config.database_url).await?;
    Ok((config, pool))
}
