//! One-shot catalog sync.

use tierline_api::services::CatalogSync;
use tierline_api::shopify::ShopifyClients;

use super::{JobError, connect};

/// Refresh the catalog mirror for every active merchant.
///
/// Individual merchant failures are logged by the sync itself; the command
/// only fails when no merchant synced at all.
pub async fn catalog() -> Result<(), JobError> {
    let (config, pool) = connect().await?;
    let shopify = ShopifyClients::new(&config.shopify)?;

    let report = CatalogSync::new(pool, shopify).sync_all().await?;
    if report.merchants == 0 && report.failures > 0 {
        return Err(JobError::NothingSynced(report.failures));
    }
    Ok(())
}
