//! One-shot abandoned cart sweep.

use std::time::Duration;

use chrono::Utc;

use tierline_api::db::PgStore;
use tierline_api::services::CartService;

use super::{JobError, connect};

/// Mark drafts untouched for `older_than_hours` (or the configured
/// threshold) as abandoned.
pub async fn abandoned(older_than_hours: Option<u64>) -> Result<(), JobError> {
    let (config, pool) = connect().await?;
    let older_than = older_than_hours.map_or(config.jobs.cart_abandon_after, |hours| {
        Duration::from_secs(hours.saturating_mul(3600))
    });

    let store = PgStore::new(pool);
    let abandoned = CartService::new(&store)
        .sweep_abandoned(Utc::now(), older_than)
        .await?;

    tracing::info!(abandoned, "Abandoned cart sweep complete");
    Ok(())
}
