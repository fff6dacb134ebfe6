//! Merchant repository.

use secrecy::SecretString;
use sqlx::PgPool;

use tierline_core::{CurrencyCode, MerchantId};

use super::RepositoryError;
use crate::models::Merchant;

#[derive(Debug, sqlx::FromRow)]
struct MerchantRow {
    id: MerchantId,
    shop_domain: String,
    admin_access_token: String,
    storefront_access_token: String,
    currency_code: String,
    is_active: bool,
}

impl TryFrom<MerchantRow> for Merchant {
    type Error = RepositoryError;

    fn try_from(row: MerchantRow) -> Result<Self, Self::Error> {
        let currency_code: CurrencyCode = row.currency_code.parse().map_err(|e| {
            RepositoryError::DataCorruption(format!("merchant {}: {e}", row.id))
        })?;

        Ok(Self {
            id: row.id,
            shop_domain: row.shop_domain,
            admin_access_token: SecretString::from(row.admin_access_token),
            storefront_access_token: SecretString::from(row.storefront_access_token),
            currency_code,
            is_active: row.is_active,
        })
    }
}

const MERCHANT_COLUMNS: &str = "id, shop_domain, admin_access_token, storefront_access_token, \
                                currency_code, is_active";

/// Repository for merchant lookups.
pub struct MerchantRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> MerchantRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a merchant by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the stored currency is unknown.
    pub async fn get_by_id(&self, id: MerchantId) -> Result<Option<Merchant>, RepositoryError> {
        let row = sqlx::query_as::<_, MerchantRow>(&format!(
            "SELECT {MERCHANT_COLUMNS} FROM b2b.merchants WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Get a merchant by its `*.myshopify.com` domain (webhooks identify shops this way).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_shop_domain(
        &self,
        shop_domain: &str,
    ) -> Result<Option<Merchant>, RepositoryError> {
        let row = sqlx::query_as::<_, MerchantRow>(&format!(
            "SELECT {MERCHANT_COLUMNS} FROM b2b.merchants WHERE lower(shop_domain) = lower($1)"
        ))
        .bind(shop_domain)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// List every active merchant, for background jobs.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_active(&self) -> Result<Vec<Merchant>, RepositoryError> {
        let rows = sqlx::query_as::<_, MerchantRow>(&format!(
            "SELECT {MERCHANT_COLUMNS} FROM b2b.merchants WHERE is_active ORDER BY shop_domain"
        ))
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}
