use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;

use crate::claims::{JwtClaims, TokenValidationError, validate_claims};

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token could not be decoded: {0}")]
    Decode(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Claims(#[from] TokenValidationError),
}

/// Verifies bearer tokens and yields their claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenError>;
}

/// HMAC-SHA256 tokens signed with a shared secret.
#[derive(Clone)]
pub struct Hs256JwtValidator {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl Hs256JwtValidator {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let secret = secret.as_ref();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    pub fn issue(&self, claims: &JwtClaims) -> Result<String, TokenError> {
        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            claims,
            &self.encoding,
        )?)
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenError> {
        // Time checks run against the caller's clock in `validate_claims`.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let data = jsonwebtoken::decode::<JwtClaims>(token, &self.decoding, &validation)?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pescaderia_core::UserId;

    #[test]
    fn issued_tokens_validate() {
        let jwt = Hs256JwtValidator::new("s3cret");
        let now = Utc::now();
        let claims = JwtClaims::for_user(UserId::new(12), "caja@pescaderia.com", now);
        let token = jwt.issue(&claims).unwrap();

        let decoded = jwt.validate(&token, now).unwrap();
        assert_eq!(decoded, claims);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let now = Utc::now();
        let claims = JwtClaims::for_user(UserId::new(12), "caja@pescaderia.com", now);
        let token = Hs256JwtValidator::new("uno").issue(&claims).unwrap();

        let err = Hs256JwtValidator::new("otro").validate(&token, now).unwrap_err();
        assert!(matches!(err, TokenError::Decode(_)));
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let jwt = Hs256JwtValidator::new("s3cret");
        let issued = Utc::now() - Duration::days(8);
        let token = jwt.issue(&JwtClaims::for_user(UserId::new(1), "x@y.com", issued)).unwrap();

        let err = jwt.validate(&token, Utc::now()).unwrap_err();
        assert!(matches!(err, TokenError::Claims(TokenValidationError::Expired)));
    }

    #[test]
    fn garbage_is_rejected() {
        let jwt = Hs256JwtValidator::new("s3cret");
        assert!(jwt.validate("not.a.jwt", Utc::now()).is_err());
    }
}
