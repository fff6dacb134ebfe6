//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::ApiConfig;
use crate::db::PgStore;
use crate::shopify::{ShopifyClients, ShopifyError};

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ApiConfig,
    store: PgStore,
    shopify: ShopifyClients,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns `ShopifyError::Http` if the shared HTTP client cannot be built.
    pub fn new(config: ApiConfig, pool: PgPool) -> Result<Self, ShopifyError> {
        let shopify = ShopifyClients::new(&config.shopify)?;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                store: PgStore::new(pool),
                shopify,
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        self.inner.store.pool()
    }

    /// Repositories behind the service store traits.
    #[must_use]
    pub fn store(&self) -> &PgStore {
        &self.inner.store
    }

    /// Shopify clients, also the production checkout gateway.
    #[must_use]
    pub fn shopify(&self) -> &ShopifyClients {
        &self.inner.shopify
    }
}
