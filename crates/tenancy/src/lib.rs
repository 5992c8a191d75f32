//! `mercora-tenancy` — request-scoped tenant isolation primitives.
//!
//! The resolver decides which tenant (if any) governs a request; the context
//! carrier binds that decision, together with the per-request transaction,
//! to the executing task.

pub mod context;
pub mod resolver;

pub use context::{BoundContext, SharedTx};
pub use resolver::{
    RequestFacts, Resolution, TenantDirectory, TENANT_HEADER, TENANT_SCOPED_PREFIXES,
    is_tenant_scoped, resolve_tenant,
};
