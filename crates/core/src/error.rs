//! Domain error model.
//!
//! Messages are user-facing (they end up in the `error` field of API
//! responses), so they are written in the shop's language.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. empty descripcion, non-positive cantidad).
    #[error("{0}")]
    Validation(String),

    /// A domain invariant would be violated (e.g. negative stock).
    #[error("{0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("identificador inválido: {0}")]
    InvalidId(String),

    /// The requested resource does not exist.
    #[error("{0}")]
    NotFound(String),

    /// A conflict occurred (duplicate key, stale version, repeated void).
    #[error("{0}")]
    Conflict(String),

    /// Authentication failure at the domain boundary.
    #[error("{0}")]
    Unauthorized(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    /// Stable machine-readable code, used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "validation_error",
            DomainError::InvariantViolation(_) => "invariant_violation",
            DomainError::InvalidId(_) => "invalid_id",
            DomainError::NotFound(_) => "not_found",
            DomainError::Conflict(_) => "conflict",
            DomainError::Unauthorized(_) => "unauthorized",
        }
    }
}
