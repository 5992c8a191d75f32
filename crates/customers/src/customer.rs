use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mercora_core::{CustomerCode, CustomerId, DomainError, DomainResult, TenantId};

/// A customer as stored: phone is the tenant-scoped natural key, `code` the
/// sequential human-facing number assigned exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub tenant_id: TenantId,
    pub phone: String,
    pub name: String,
    pub address: Option<String>,
    pub code: CustomerCode,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Mutable profile fields supplied at checkout. Phone identifies the
/// customer within the tenant; name/address are updated in place on repeat
/// orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerProfile {
    pub phone: String,
    pub name: String,
    pub address: Option<String>,
}

impl CustomerProfile {
    pub fn validate(&self) -> DomainResult<()> {
        if self.phone.trim().is_empty() {
            return Err(DomainError::validation("customer phone must not be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("customer name must not be empty"));
        }
        Ok(())
    }
}

/// Raw row shape; converted into [`Customer`] so invalid ids never escape
/// the storage layer.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct CustomerRow {
    pub id: i64,
    pub tenant_id: i64,
    pub phone: String,
    pub name: String,
    pub address: Option<String>,
    pub code: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<CustomerRow> for Customer {
    type Error = DomainError;

    fn try_from(row: CustomerRow) -> DomainResult<Customer> {
        Ok(Customer {
            id: CustomerId::from_raw(row.id)?,
            tenant_id: TenantId::from_raw(row.tenant_id)?,
            phone: row.phone,
            name: row.name,
            address: row.address,
            code: CustomerCode::from_raw(row.code)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
