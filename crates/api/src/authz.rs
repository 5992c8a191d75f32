//! Merchant-surface authorization checks.

use axum::http::StatusCode;

use mercora_core::TenantId;

use crate::app::errors::json_error;
use crate::context::Identity;

/// Merchant endpoints require an authenticated principal whose token carries
/// the tenant the wrapper bound for this request. A mismatch means the
/// caller holds a valid token for a different merchant.
pub fn require_merchant(
    identity: Option<&Identity>,
    bound_tenant: TenantId,
) -> Result<(), axum::response::Response> {
    let identity = identity.ok_or_else(|| {
        json_error(
            StatusCode::UNAUTHORIZED,
            "unauthenticated",
            "merchant endpoint requires a bearer token",
        )
    })?;

    match identity.tenant_id {
        Some(tenant_id) if tenant_id == bound_tenant => Ok(()),
        _ => Err(json_error(
            StatusCode::FORBIDDEN,
            "unauthorized",
            "token does not grant access to this tenant",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mercora_auth::PrincipalId;

    fn tenant(raw: i64) -> TenantId {
        TenantId::from_raw(raw).unwrap()
    }

    fn identity(tenant_id: Option<TenantId>) -> Identity {
        Identity {
            principal: PrincipalId::new(),
            tenant_id,
            roles: vec![],
        }
    }

    #[test]
    fn anonymous_callers_are_rejected() {
        assert!(require_merchant(None, tenant(1)).is_err());
    }

    #[test]
    fn matching_tenant_passes() {
        let id = identity(Some(tenant(1)));
        assert!(require_merchant(Some(&id), tenant(1)).is_ok());
    }

    #[test]
    fn foreign_or_missing_tenant_is_forbidden() {
        let foreign = identity(Some(tenant(2)));
        assert!(require_merchant(Some(&foreign), tenant(1)).is_err());

        let platform = identity(None);
        assert!(require_merchant(Some(&platform), tenant(1)).is_err());
    }
}
