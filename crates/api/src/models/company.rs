//! Buyer companies and their users.

use serde::Serialize;

use tierline_core::pricing::CompanyContext;
use tierline_core::{CompanyId, CompanyUserId, MerchantId};

/// A buyer organisation belonging to one merchant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub id: CompanyId,
    pub merchant_id: MerchantId,
    pub name: String,
    /// Free-form label rules can target (e.g. `wholesale-gold`).
    pub company_group: Option<String>,
    pub is_active: bool,
}

impl Company {
    /// What the resolver needs to know about this buyer.
    #[must_use]
    pub fn pricing_context(&self) -> CompanyContext {
        CompanyContext {
            id: self.id,
            group: self.company_group.clone(),
        }
    }
}

/// A person buying on behalf of a company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyUser {
    pub id: CompanyUserId,
    pub company_id: CompanyId,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}
