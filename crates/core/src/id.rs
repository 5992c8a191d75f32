//! Strongly-typed identifiers used across the domain.
//!
//! Rows are `BIGSERIAL` in Postgres, so identifiers wrap `i64`. A valid
//! identifier is always positive; zero/negative values are rejected at the
//! boundary so that downstream code never has to re-check.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Identifier of a tenant (the multi-tenant isolation boundary).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(i64);

/// Identifier of a customer within a tenant.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(i64);

/// Identifier of an order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(i64);

/// Identifier of a single order line.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderItemId(i64);

/// Identifier of a product.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(i64);

macro_rules! impl_i64_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Wrap a raw database id, rejecting non-positive values.
            pub fn from_raw(raw: i64) -> Result<Self, DomainError> {
                if raw <= 0 {
                    return Err(DomainError::invalid_id(format!(
                        "{}: must be a positive integer, got {}",
                        $name, raw
                    )));
                }
                Ok(Self(raw))
            }

            pub fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl TryFrom<i64> for $t {
            type Error = DomainError;

            fn try_from(value: i64) -> Result<Self, Self::Error> {
                Self::from_raw(value)
            }
        }

        impl From<$t> for i64 {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw: i64 = s
                    .parse()
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Self::from_raw(raw)
            }
        }
    };
}

impl_i64_newtype!(TenantId, "TenantId");
impl_i64_newtype!(CustomerId, "CustomerId");
impl_i64_newtype!(OrderId, "OrderId");
impl_i64_newtype!(OrderItemId, "OrderItemId");
impl_i64_newtype!(ProductId, "ProductId");

/// Tenant-scoped, sequential, human-facing customer number.
///
/// Assigned exactly once by the sequence allocator; immutable thereafter.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerCode(i64);

impl CustomerCode {
    pub fn from_raw(raw: i64) -> Result<Self, DomainError> {
        if raw <= 0 {
            return Err(DomainError::invalid_id(format!(
                "CustomerCode: must be a positive integer, got {raw}"
            )));
        }
        Ok(Self(raw))
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl core::fmt::Display for CustomerCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_ids_are_accepted() {
        let id = TenantId::from_raw(42).unwrap();
        assert_eq!(id.as_i64(), 42);
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn zero_and_negative_ids_are_rejected() {
        assert!(TenantId::from_raw(0).is_err());
        assert!(TenantId::from_raw(-7).is_err());
        assert!(OrderId::from_raw(0).is_err());
    }

    #[test]
    fn from_str_parses_and_validates() {
        let id: TenantId = "17".parse().unwrap();
        assert_eq!(id.as_i64(), 17);

        assert!("0".parse::<TenantId>().is_err());
        assert!("-3".parse::<TenantId>().is_err());
        assert!("abc".parse::<TenantId>().is_err());
        assert!("".parse::<TenantId>().is_err());
    }

    #[test]
    fn customer_code_rejects_non_positive() {
        assert!(CustomerCode::from_raw(1).is_ok());
        assert!(CustomerCode::from_raw(0).is_err());
    }
}
