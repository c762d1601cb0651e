use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use pescaderia_core::UserId;

/// Sessions last a week.
pub const TOKEN_TTL_DAYS: i64 = 7;

/// JWT claims model (transport-agnostic).
///
/// Timestamps are unix seconds so the token stays readable by any standard
/// JWT library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject: the user id.
    pub sub: UserId,

    pub email: String,

    /// Issued-at (unix seconds).
    pub iat: i64,

    /// Expiration (unix seconds).
    pub exp: i64,
}

impl JwtClaims {
    /// Claims for a session starting at `now`.
    pub fn for_user(user_id: UserId, email: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            sub: user_id,
            email: email.into(),
            iat: now.timestamp(),
            exp: (now + Duration::days(TOKEN_TTL_DAYS)).timestamp(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (iat is in the future)")]
    NotYetValid,

    #[error("invalid token time window (exp <= iat)")]
    InvalidTimeWindow,

    #[error("invalid subject")]
    InvalidSubject,
}

/// Deterministically validate JWT claims.
///
/// Validates the claims only; signature verification lives in [`crate::jwt`].
pub fn validate_claims(claims: &JwtClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if !claims.sub.is_valid() {
        return Err(TokenValidationError::InvalidSubject);
    }
    if claims.exp <= claims.iat {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    let now = now.timestamp();
    if now < claims.iat {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.exp {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_claims_are_valid_for_a_week() {
        let now = Utc::now();
        let claims = JwtClaims::for_user(UserId::new(3), "a@b.com", now);
        assert_eq!(claims.exp - claims.iat, 7 * 24 * 3600);
        assert_eq!(validate_claims(&claims, now), Ok(()));
        assert_eq!(
            validate_claims(&claims, now + Duration::days(8)),
            Err(TokenValidationError::Expired)
        );
    }

    #[test]
    fn rejects_future_and_inverted_windows() {
        let now = Utc::now();
        let claims = JwtClaims::for_user(UserId::new(3), "a@b.com", now + Duration::hours(1));
        assert_eq!(validate_claims(&claims, now), Err(TokenValidationError::NotYetValid));

        let mut inverted = JwtClaims::for_user(UserId::new(3), "a@b.com", now);
        inverted.exp = inverted.iat;
        assert_eq!(validate_claims(&inverted, now), Err(TokenValidationError::InvalidTimeWindow));
    }

    #[test]
    fn rejects_non_positive_subject() {
        let claims = JwtClaims::for_user(UserId::new(0), "a@b.com", Utc::now());
        assert_eq!(validate_claims(&claims, Utc::now()), Err(TokenValidationError::InvalidSubject));
    }
}
