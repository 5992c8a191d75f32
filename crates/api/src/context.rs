//! Request extensions inserted by the middleware stack.

use mercora_auth::{IdentityClaims, PrincipalId, Role};
use mercora_core::TenantId;

/// Authenticated principal, inserted by the auth middleware when a bearer
/// token validates. Public requests carry no identity.
#[derive(Debug, Clone)]
pub struct Identity {
    pub principal: PrincipalId,
    pub tenant_id: Option<TenantId>,
    pub roles: Vec<Role>,
}

impl From<IdentityClaims> for Identity {
    fn from(claims: IdentityClaims) -> Self {
        Self {
            principal: claims.sub,
            tenant_id: claims.tenant_id,
            roles: claims.roles,
        }
    }
}

/// The tenant the isolation wrapper bound for this request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantContext(TenantId);

impl TenantContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self(tenant_id)
    }

    pub fn tenant_id(&self) -> TenantId {
        self.0
    }
}

/// Batch tracking: the subset of requested tokens that actually resolved.
/// Handlers treat an absent extension as an empty set.
#[derive(Debug, Clone, Default)]
pub struct ActiveTokens(pub Vec<String>);
