//! `pescaderia-auth` — authentication boundary.
//!
//! Claims, token signing, password hashing and credential validation.
//! Decoupled from HTTP and storage.

pub mod claims;
pub mod jwt;
pub mod password;
pub mod user;

pub use claims::{JwtClaims, TOKEN_TTL_DAYS, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtValidator, TokenError};
pub use password::{PasswordError, hash_password, verify_password};
pub use user::{Credenciales, Registro, User, normalize_email, validate_login, validate_signup};
