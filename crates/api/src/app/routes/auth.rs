use std::sync::Arc;

use axum::{
    extract::{Extension, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;

use pescaderia_auth::{
    Credenciales, JwtClaims, Registro, User, hash_password, normalize_email, validate_login,
    validate_signup, verify_password,
};
use pescaderia_infra::{StoreError, UserStore};

use crate::app::dto::AuthResponse;
use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::UserContext;

const CREDENCIALES_INVALIDAS: &str = "Email o contraseña incorrectos";

pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<Credenciales>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };
    if let Err(e) = validate_login(&body) {
        return errors::domain_error_to_response(e);
    }

    let email = normalize_email(&body.email);
    let user = match services.store().user_by_email(&email).await {
        Ok(Some(user)) => user,
        Ok(None) => return bad_credentials(),
        Err(e) => return errors::store_error_to_response(e),
    };

    let hash = user.password_hash.clone();
    let password = body.password;
    let matches = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .unwrap_or(false);
    if !matches {
        tracing::info!(user_id = %user.id, "login rejected");
        return bad_credentials();
    }

    match token_response(&services, user) {
        Ok(body) => Json(body).into_response(),
        Err(resp) => resp,
    }
}

pub async fn signup(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<Registro>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };
    if let Err(e) = validate_signup(&body) {
        return errors::domain_error_to_response(e);
    }

    let email = normalize_email(&body.email);
    match services.store().user_by_email(&email).await {
        Ok(Some(_)) => return email_taken(),
        Ok(None) => {}
        Err(e) => return errors::store_error_to_response(e),
    }

    let password = body.password;
    let hash = match tokio::task::spawn_blocking(move || hash_password(&password)).await {
        Ok(Ok(hash)) => hash,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "password hashing failed");
            return internal_error();
        }
        Err(e) => {
            tracing::error!(error = %e, "password hashing task failed");
            return internal_error();
        }
    };

    let user = match services.store().insert_user(&email, &hash, Utc::now()).await {
        Ok(user) => user,
        Err(StoreError::Duplicate(_)) => return email_taken(),
        Err(e) => return errors::store_error_to_response(e),
    };
    tracing::info!(user_id = %user.id, "user registered");

    match token_response(&services, user) {
        Ok(body) => (StatusCode::CREATED, Json(body)).into_response(),
        Err(resp) => resp,
    }
}

pub async fn profile(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<UserContext>,
) -> Response {
    match services.store().user_by_id(ctx.user_id()).await {
        Ok(Some(user)) => Json(user).into_response(),
        Ok(None) => errors::not_found("Usuario no encontrado"),
        Err(e) => errors::store_error_to_response(e),
    }
}

fn token_response(services: &AppServices, user: User) -> Result<AuthResponse, Response> {
    let claims = JwtClaims::for_user(user.id, user.email.clone(), Utc::now());
    match services.jwt.issue(&claims) {
        Ok(token) => Ok(AuthResponse { token, user }),
        Err(e) => {
            tracing::error!(error = %e, "token signing failed");
            Err(internal_error())
        }
    }
}

fn bad_credentials() -> Response {
    errors::json_error(StatusCode::UNAUTHORIZED, "unauthorized", CREDENCIALES_INVALIDAS)
}

fn email_taken() -> Response {
    errors::json_error(StatusCode::CONFLICT, "conflict", "El email ya está registrado")
}

fn internal_error() -> Response {
    errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", errors::INTERNAL_ERROR)
}
