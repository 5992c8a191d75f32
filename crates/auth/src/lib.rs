//! `mercora-auth` — identity boundary (claims model only).
//!
//! This crate is intentionally decoupled from HTTP and storage. Token
//! issuance and signature mechanics live outside the platform; what matters
//! downstream is the tenant identity a validated token carries.

pub mod claims;
pub mod principal;

pub use claims::{
    ClaimsValidator, IdentityClaims, TokenValidationError, TrustedJsonValidator, validate_claims,
};
pub use principal::{PrincipalId, Role};
