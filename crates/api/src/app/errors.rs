use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use pescaderia_core::DomainError;
use pescaderia_infra::{DispatchError, StoreError};

pub const INTERNAL_ERROR: &str = "Error interno del servidor";
pub const INVALID_REQUEST: &str = "Solicitud inválida";

pub fn dispatch_error_to_response(err: DispatchError) -> Response {
    match err {
        DispatchError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DispatchError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        DispatchError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not_found", msg),
        DispatchError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DispatchError::Concurrency(msg) => {
            tracing::warn!(%msg, "command gave up after repeated version conflicts");
            json_error(
                StatusCode::CONFLICT,
                "concurrency_conflict",
                "Los datos cambiaron mientras se procesaba la solicitud, intente nuevamente",
            )
        }
        DispatchError::Unauthorized(msg) => json_error(StatusCode::UNAUTHORIZED, "unauthorized", msg),
        DispatchError::Store(e) => store_error_to_response(e),
    }
}

pub fn domain_error_to_response(err: DomainError) -> Response {
    dispatch_error_to_response(err.into())
}

pub fn store_error_to_response(err: StoreError) -> Response {
    match err {
        StoreError::Concurrency(msg) => dispatch_error_to_response(DispatchError::Concurrency(msg)),
        other => {
            tracing::error!(error = %other, "store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", INTERNAL_ERROR)
        }
    }
}

pub fn json_rejection(rejection: JsonRejection) -> Response {
    tracing::debug!(error = %rejection, "rejected request body");
    json_error(StatusCode::BAD_REQUEST, "invalid_body", INVALID_REQUEST)
}

pub fn query_rejection(rejection: QueryRejection) -> Response {
    tracing::debug!(error = %rejection, "rejected query string");
    json_error(StatusCode::BAD_REQUEST, "invalid_query", INVALID_REQUEST)
}

pub fn invalid_id(what: &str) -> Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("ID de {what} inválido"))
}

pub fn not_found(message: impl Into<String>) -> Response {
    json_error(StatusCode::NOT_FOUND, "not_found", message)
}

/// Error body: `{"error": <human text>, "code": <machine code>}`.
pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": message.into(),
            "code": code,
        })),
    )
        .into_response()
}
