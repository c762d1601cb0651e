//! Strongly-typed identifiers used across the domain.
//!
//! Identifiers are positive integers assigned by the store (they travel as JSON
//! numbers to match the existing web client).

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Identifier of a catalog product.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductoId(i64);

/// Identifier of a stock movement (ledger line).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovimientoId(i64);

/// Identifier of a user account.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

macro_rules! impl_numeric_id {
    ($t:ty, $name:literal) => {
        impl $t {
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            pub const fn get(&self) -> i64 {
                self.0
            }

            /// Ids are assigned by the store starting at 1.
            pub fn is_valid(&self) -> bool {
                self.0 > 0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<i64> for $t {
            fn from(value: i64) -> Self {
                Self(value)
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
                let value = s
                    .trim()
                    .parse::<i64>()
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                if value <= 0 {
                    return Err(DomainError::invalid_id(format!("{}: debe ser positivo", $name)));
                }
                Ok(Self(value))
            }
        }
    };
}

impl_numeric_id!(ProductoId, "ProductoId");
impl_numeric_id!(MovimientoId, "MovimientoId");
impl_numeric_id!(UserId, "UserId");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_positive_ids() {
        let id: ProductoId = "42".parse().unwrap();
        assert_eq!(id.get(), 42);
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn rejects_zero_negative_and_garbage() {
        assert!("0".parse::<MovimientoId>().is_err());
        assert!("-3".parse::<MovimientoId>().is_err());
        assert!(matches!("abc".parse::<UserId>(), Err(DomainError::InvalidId(_))));
    }

    #[test]
    fn serializes_as_plain_number() {
        let json = serde_json::to_string(&ProductoId::new(7)).unwrap();
        assert_eq!(json, "7");
        let back: ProductoId = serde_json::from_str("7").unwrap();
        assert_eq!(back, ProductoId::new(7));
    }
}
