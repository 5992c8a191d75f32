use chrono::{DateTime, Utc};
use serde::Serialize;

use mercora_core::{DomainError, DomainResult, ProductId, TenantId};

/// A catalog entry. `unit_price` is in the smallest currency unit and is
/// the default line price at checkout; merchants may still override it per
/// order line afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub tenant_id: TenantId,
    pub name: String,
    pub unit_price: i64,
    pub available: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ProductRow {
    pub id: i64,
    pub tenant_id: i64,
    pub name: String,
    pub unit_price: i64,
    pub available: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = DomainError;

    fn try_from(row: ProductRow) -> DomainResult<Product> {
        Ok(Product {
            id: ProductId::from_raw(row.id)?,
            tenant_id: TenantId::from_raw(row.tenant_id)?,
            name: row.name,
            unit_price: row.unit_price,
            available: row.available,
            created_at: row.created_at,
        })
    }
}
