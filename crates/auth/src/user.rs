//! User accounts and credential checks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pescaderia_core::{DomainError, DomainResult, UserId};

const MIN_PASSWORD_LEN: usize = 6;

/// A registered account. The password hash never leaves the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Login request body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credenciales {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Signup request body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Registro {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
}

/// Emails are compared case-insensitively.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    }
}

pub fn validate_login(req: &Credenciales) -> DomainResult<()> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(DomainError::validation("Por favor complete todos los campos"));
    }
    Ok(())
}

pub fn validate_signup(req: &Registro) -> DomainResult<()> {
    if req.email.trim().is_empty() || req.password.is_empty() || req.confirm_password.is_empty() {
        return Err(DomainError::validation("Por favor complete todos los campos"));
    }
    if !looks_like_email(&normalize_email(&req.email)) {
        return Err(DomainError::validation("El email no es válido"));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(DomainError::validation(
            "La contraseña debe tener al menos 6 caracteres",
        ));
    }
    if req.password != req.confirm_password {
        return Err(DomainError::validation("Las contraseñas no coinciden"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registro(email: &str, password: &str, confirm: &str) -> Registro {
        Registro {
            email: email.to_string(),
            password: password.to_string(),
            confirm_password: confirm.to_string(),
        }
    }

    #[test]
    fn signup_rules() {
        assert!(validate_signup(&registro("ana@pesca.com", "123456", "123456")).is_ok());
        assert_eq!(
            validate_signup(&registro("", "123456", "123456")).unwrap_err(),
            DomainError::validation("Por favor complete todos los campos")
        );
        assert_eq!(
            validate_signup(&registro("ana@pesca.com", "12345", "12345")).unwrap_err(),
            DomainError::validation("La contraseña debe tener al menos 6 caracteres")
        );
        assert_eq!(
            validate_signup(&registro("ana@pesca.com", "123456", "654321")).unwrap_err(),
            DomainError::validation("Las contraseñas no coinciden")
        );
        assert!(validate_signup(&registro("ana", "123456", "123456")).is_err());
    }

    #[test]
    fn login_requires_both_fields() {
        let ok = Credenciales { email: "a@b.co".into(), password: "x".into() };
        assert!(validate_login(&ok).is_ok());
        assert!(validate_login(&Credenciales::default()).is_err());
    }

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  Ana@Pesca.COM "), "ana@pesca.com");
    }

    #[test]
    fn hash_is_never_serialized() {
        let user = User {
            id: UserId::new(1),
            email: "a@b.co".into(),
            password_hash: "secret-hash".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["id"], 1);
    }
}
