//! Company and company user repository.

use sqlx::PgPool;

use tierline_core::{CompanyId, CompanyUserId, MerchantId};

use super::RepositoryError;
use crate::models::{Company, CompanyUser};

#[derive(Debug, sqlx::FromRow)]
struct CompanyRow {
    id: CompanyId,
    merchant_id: MerchantId,
    name: String,
    company_group: Option<String>,
    is_active: bool,
}

impl From<CompanyRow> for Company {
    fn from(row: CompanyRow) -> Self {
        Self {
            id: row.id,
            merchant_id: row.merchant_id,
            name: row.name,
            company_group: row.company_group.filter(|g| !g.trim().is_empty()),
            is_active: row.is_active,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CompanyUserRow {
    id: CompanyUserId,
    company_id: CompanyId,
    email: String,
    first_name: Option<String>,
    last_name: Option<String>,
}

impl From<CompanyUserRow> for CompanyUser {
    fn from(row: CompanyUserRow) -> Self {
        Self {
            id: row.id,
            company_id: row.company_id,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
        }
    }
}

/// Repository for buyer companies.
pub struct CompanyRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CompanyRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a company, scoped to its merchant.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(
        &self,
        merchant_id: MerchantId,
        id: CompanyId,
    ) -> Result<Option<Company>, RepositoryError> {
        let row = sqlx::query_as::<_, CompanyRow>(
            r"
            SELECT id, merchant_id, name, company_group, is_active
            FROM b2b.companies
            WHERE merchant_id = $1 AND id = $2
            ",
        )
        .bind(merchant_id)
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Get a user of a company.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_user(
        &self,
        company_id: CompanyId,
        id: CompanyUserId,
    ) -> Result<Option<CompanyUser>, RepositoryError> {
        let row = sqlx::query_as::<_, CompanyUserRow>(
            r"
            SELECT id, company_id, email, first_name, last_name
            FROM b2b.company_users
            WHERE company_id = $1 AND id = $2
            ",
        )
        .bind(company_id)
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }
}
