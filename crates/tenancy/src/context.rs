//! Request-scoped context carrier.
//!
//! Binds {tenant id, transactional handle} to the currently executing logical
//! request via a task-local, never a process-wide singleton. The binding
//! exists only for the duration of the wrapped future and is torn down on
//! return or panic, so two concurrent requests can never observe each
//! other's value.

use std::future::Future;
use std::sync::Arc;

use sqlx::{Postgres, Transaction};
use tokio::sync::Mutex;

use mercora_core::TenantId;

/// Shared handle to the per-request transaction.
///
/// The `Option` is taken by the wrapper at commit/rollback time; a handle
/// retained past the request observes `None` instead of a live transaction.
pub type SharedTx = Arc<Mutex<Option<Transaction<'static, Postgres>>>>;

tokio::task_local! {
    static CURRENT: BoundContext;
}

/// The value bound for one request: resolved tenant (if any) plus the
/// transaction every downstream statement must run on.
#[derive(Clone)]
pub struct BoundContext {
    tenant_id: Option<TenantId>,
    tx: SharedTx,
}

impl BoundContext {
    pub fn new(tenant_id: Option<TenantId>, tx: SharedTx) -> Self {
        Self { tenant_id, tx }
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn tx(&self) -> SharedTx {
        Arc::clone(&self.tx)
    }

    /// Run `fut` with this context bound as the ambient request context.
    pub async fn scope<F: Future>(self, fut: F) -> F::Output {
        CURRENT.scope(self, fut).await
    }

    /// The context bound to the current task, if any.
    pub fn current() -> Option<BoundContext> {
        CURRENT.try_with(|ctx| ctx.clone()).ok()
    }
}

impl core::fmt::Debug for BoundContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BoundContext")
            .field("tenant_id", &self.tenant_id)
            .finish_non_exhaustive()
    }
}
