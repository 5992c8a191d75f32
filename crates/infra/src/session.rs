//! Per-request transaction lifecycle and RLS session binding.
//!
//! One transaction per request: every statement the handler issues observes
//! the identical `app.tenant_id` session variable, closing the race where a
//! pooled connection could carry a variable set by a different, now-finished
//! request. The variable is transaction-scoped (`set_config(..., true)`), so
//! releasing the connection back to the pool cannot leak it either.

use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use std::sync::Arc;
use tokio::sync::Mutex;

use mercora_core::{DomainError, DomainResult, TenantId};
use mercora_tenancy::SharedTx;

use crate::error::map_sqlx_error;

/// Begin the request transaction on a dedicated pooled connection.
pub async fn begin_request(pool: &PgPool) -> DomainResult<SharedTx> {
    let tx = pool
        .begin()
        .await
        .map_err(|e| map_sqlx_error("begin_request", e))?;
    Ok(Arc::new(Mutex::new(Some(tx))))
}

/// Attach the resolved tenant to the connection for the rest of the
/// transaction. Consumed by the row-level-security policies on every
/// tenant-scoped table.
pub async fn bind_tenant(tx: &SharedTx, tenant_id: TenantId) -> DomainResult<()> {
    let mut guard = tx.lock().await;
    let conn = tx_conn(&mut guard)?;
    sqlx::query("SELECT set_config('app.tenant_id', $1, true)")
        .bind(tenant_id.as_i64().to_string())
        .execute(conn)
        .await
        .map_err(|e| map_sqlx_error("bind_tenant", e))?;
    tracing::debug!(tenant_id = tenant_id.as_i64(), "tenant session bound");
    Ok(())
}

/// Commit the request transaction, consuming the shared handle.
///
/// A handle cloned into some stray continuation observes `None` afterwards
/// and can no longer touch the connection.
pub async fn commit(tx: &SharedTx) -> DomainResult<()> {
    let taken = tx.lock().await.take();
    match taken {
        Some(tx) => tx.commit().await.map_err(|e| map_sqlx_error("commit", e)),
        None => Err(DomainError::storage(
            "request transaction already completed",
        )),
    }
}

/// Roll back the request transaction. Idempotent: a transaction that already
/// completed (or was dropped) is left alone.
pub async fn rollback(tx: &SharedTx) {
    let taken = tx.lock().await.take();
    if let Some(tx) = taken {
        if let Err(e) = tx.rollback().await {
            tracing::warn!(error = %e, "rollback failed");
        }
    }
}

/// Borrow the live connection out of a locked request transaction.
pub fn tx_conn<'g>(
    guard: &'g mut Option<Transaction<'static, Postgres>>,
) -> DomainResult<&'g mut PgConnection> {
    match guard.as_mut() {
        Some(tx) => Ok(&mut **tx),
        None => Err(DomainError::storage(
            "request transaction already completed",
        )),
    }
}
