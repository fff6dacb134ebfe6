//! Background workers started with the server.
//!
//! Both jobs are idempotent and run on a fixed `tokio` interval. The first
//! tick fires immediately, so a fresh deploy syncs the catalog right away.

use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use super::carts::CartService;
use super::catalog_sync::CatalogSync;
use crate::db::PgStore;
use crate::state::AppState;

/// How often stale drafts are swept.
const ABANDON_SWEEP_EVERY: Duration = Duration::from_secs(3600);

/// Spawn every configured worker.
pub fn spawn_all(state: &AppState) {
    let jobs = &state.config().jobs;

    if let Some(every) = jobs.catalog_sync_interval {
        spawn_catalog_sync(
            CatalogSync::new(state.pool().clone(), state.shopify().clone()),
            every,
        );
    } else {
        info!("Catalog sync worker disabled");
    }

    spawn_abandoned_sweep(state.store().clone(), jobs.cart_abandon_after);
}

/// Refresh the catalog mirror every `every`.
pub fn spawn_catalog_sync(sync: CatalogSync, every: Duration) {
    info!(interval_secs = every.as_secs(), "Spawning catalog sync worker");
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if let Err(e) = sync.sync_all().await {
                error!(error = %e, "Catalog sync sweep failed");
            }
        }
    });
}

/// Mark drafts untouched for `older_than` as abandoned, hourly.
pub fn spawn_abandoned_sweep(store: PgStore, older_than: Duration) {
    info!(
        older_than_hours = older_than.as_secs() / 3600,
        "Spawning abandoned cart sweep"
    );
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(ABANDON_SWEEP_EVERY);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if let Err(e) = CartService::new(&store)
                .sweep_abandoned(Utc::now(), older_than)
                .await
            {
                error!(error = %e, "Abandoned cart sweep failed");
            }
        }
    });
}
