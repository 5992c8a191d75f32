//! Domain error model.
//!
//! Every caller-visible failure carries a stable, machine-checkable kind plus
//! a human-readable message. Infrastructure failures are funneled through
//! `Storage` after rollback; they never leak partial state.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error taxonomy.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure, non-positive id).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource (slug, token, order, customer) does not exist.
    #[error("not found")]
    NotFound,

    /// No identity, header, slug or token produced a tenant on a route that
    /// requires one.
    #[error("tenant could not be resolved")]
    TenantUnresolved,

    /// Batch token resolution produced more than one tenant.
    #[error("tokens resolve to multiple tenants")]
    TenantAmbiguous,

    /// A unique-constraint race or other duplicate-write conflict.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A state-machine operation outside its permitted window (e.g. a
    /// customer decision against a non-pending line).
    #[error("state conflict: {0}")]
    StateConflict(String),

    /// Authorization failure at the domain boundary.
    #[error("unauthorized")]
    Unauthorized,

    /// Underlying storage failure, surfaced after rollback.
    #[error("storage error: {0}")]
    Storage(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn state_conflict(msg: impl Into<String>) -> Self {
        Self::StateConflict(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    /// Stable machine-checkable kind for the wire format.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::InvalidId(_) => "invalid_id",
            Self::NotFound => "not_found",
            Self::TenantUnresolved => "tenant_unresolved",
            Self::TenantAmbiguous => "tenant_ambiguous",
            Self::Conflict(_) => "conflict",
            Self::StateConflict(_) => "state_conflict",
            Self::Unauthorized => "unauthorized",
            Self::Storage(_) => "storage_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable_strings() {
        assert_eq!(DomainError::TenantUnresolved.kind(), "tenant_unresolved");
        assert_eq!(DomainError::TenantAmbiguous.kind(), "tenant_ambiguous");
        assert_eq!(DomainError::conflict("x").kind(), "conflict");
        assert_eq!(DomainError::state_conflict("x").kind(), "state_conflict");
        assert_eq!(DomainError::not_found().kind(), "not_found");
    }

    #[test]
    fn messages_carry_the_reason() {
        let err = DomainError::state_conflict("line is not pending");
        assert_eq!(err.to_string(), "state conflict: line is not pending");
    }
}
