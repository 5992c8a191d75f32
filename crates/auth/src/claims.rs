use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use mercora_core::TenantId;

use crate::{PrincipalId, Role};

/// Identity claims model (transport-agnostic).
///
/// The minimal set of claims the platform expects once a token has been
/// decoded/verified by whatever transport/security layer is in use. Platform
/// operators carry no `tenant_id`; merchant staff always do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// Subject / principal identifier.
    pub sub: PrincipalId,

    /// Tenant context for the token, if the principal belongs to one.
    pub tenant_id: Option<TenantId>,

    /// Roles granted within the tenant context.
    pub roles: Vec<Role>,

    /// Issued-at timestamp.
    pub issued_at: DateTime<Utc>,

    /// Expiration timestamp.
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,

    #[error("malformed token: {0}")]
    Malformed(String),
}

/// Deterministically validate identity claims.
///
/// Note: this validates the *claims* only. Signature verification / token
/// issuance is intentionally outside this crate.
pub fn validate_claims(
    claims: &IdentityClaims,
    now: DateTime<Utc>,
) -> Result<(), TokenValidationError> {
    if claims.expires_at <= claims.issued_at {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < claims.issued_at {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.expires_at {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

/// Decodes a bearer token into claims and validates their time window.
///
/// Implementations own the wire format; the platform trusts whatever tenant
/// id the validated claims carry.
pub trait ClaimsValidator: Send + Sync {
    fn validate(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<IdentityClaims, TokenValidationError>;
}

/// Claims validator for gateway-terminated deployments: the edge proxy has
/// already verified the signature and forwards the claims as JSON.
#[derive(Debug, Default)]
pub struct TrustedJsonValidator;

impl ClaimsValidator for TrustedJsonValidator {
    fn validate(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<IdentityClaims, TokenValidationError> {
        let claims: IdentityClaims = serde_json::from_str(token)
            .map_err(|e| TokenValidationError::Malformed(e.to_string()))?;
        validate_claims(&claims, now)?;
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn claims(issued: DateTime<Utc>, expires: DateTime<Utc>) -> IdentityClaims {
        IdentityClaims {
            sub: PrincipalId::new(),
            tenant_id: TenantId::from_raw(7).ok(),
            roles: vec![Role::new("merchant")],
            issued_at: issued,
            expires_at: expires,
        }
    }

    #[test]
    fn valid_window_passes() {
        let now = Utc::now();
        let c = claims(now - Duration::minutes(5), now + Duration::minutes(5));
        assert!(validate_claims(&c, now).is_ok());
    }

    #[test]
    fn expired_token_is_rejected() {
        let now = Utc::now();
        let c = claims(now - Duration::hours(2), now - Duration::hours(1));
        assert_eq!(validate_claims(&c, now), Err(TokenValidationError::Expired));
    }

    #[test]
    fn future_issued_at_is_rejected() {
        let now = Utc::now();
        let c = claims(now + Duration::minutes(1), now + Duration::hours(1));
        assert_eq!(
            validate_claims(&c, now),
            Err(TokenValidationError::NotYetValid)
        );
    }

    #[test]
    fn inverted_window_is_rejected() {
        let now = Utc::now();
        let c = claims(now, now);
        assert_eq!(
            validate_claims(&c, now),
            Err(TokenValidationError::InvalidTimeWindow)
        );
    }

    #[test]
    fn trusted_json_validator_round_trips_claims() {
        let now = Utc::now();
        let c = claims(now - Duration::minutes(1), now + Duration::minutes(10));
        let token = serde_json::to_string(&c).unwrap();

        let decoded = TrustedJsonValidator.validate(&token, now).unwrap();
        assert_eq!(decoded, c);
    }

    #[test]
    fn trusted_json_validator_rejects_garbage() {
        let err = TrustedJsonValidator
            .validate("not-json", Utc::now())
            .unwrap_err();
        assert!(matches!(err, TokenValidationError::Malformed(_)));
    }
}
