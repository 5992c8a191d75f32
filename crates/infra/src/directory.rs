//! Transaction-backed tenant directory.
//!
//! These are the two plain queries the resolver is allowed before any tenant
//! variable exists on the connection; they cannot go through tenant-filtered
//! repository access themselves. `tenants` carries no RLS policy and
//! `orders.public_token` is covered by a dedicated permissive lookup policy.

use async_trait::async_trait;
use sqlx::PgConnection;

use mercora_core::{DomainResult, TenantId};
use mercora_tenancy::TenantDirectory;

use crate::error::map_sqlx_error;

pub struct PgTenantDirectory<'c> {
    conn: &'c mut PgConnection,
}

impl<'c> PgTenantDirectory<'c> {
    pub fn new(conn: &'c mut PgConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl TenantDirectory for PgTenantDirectory<'_> {
    async fn tenant_by_slug(&mut self, slug: &str) -> DomainResult<Option<TenantId>> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM tenants WHERE slug = $1 AND status = 'active'")
                .bind(slug)
                .fetch_optional(&mut *self.conn)
                .await
                .map_err(|e| map_sqlx_error("tenant_by_slug", e))?;
        row.map(|(id,)| TenantId::from_raw(id)).transpose()
    }

    async fn tenant_by_order_token(&mut self, token: &str) -> DomainResult<Option<TenantId>> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT tenant_id FROM orders WHERE public_token = $1")
                .bind(token)
                .fetch_optional(&mut *self.conn)
                .await
                .map_err(|e| map_sqlx_error("tenant_by_order_token", e))?;
        row.map(|(id,)| TenantId::from_raw(id)).transpose()
    }
}
