//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: storage backend and dispatcher wiring
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::http::{HeaderValue, Method, header};
use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{AppServices, build_services};

/// Router over an in-memory store, with the default CORS origins.
pub fn build_app(jwt_secret: String) -> Router {
    let origins: Vec<String> = pescaderia_infra::config::DEFAULT_CORS_ORIGINS
        .iter()
        .map(|o| o.to_string())
        .collect();
    build_app_with(AppServices::in_memory(&jwt_secret), &origins)
}

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app_with(services: AppServices, cors_origins: &[String]) -> Router {
    let auth_state = middleware::AuthState {
        jwt: services.jwt.clone(),
    };
    let services = Arc::new(services);

    // Protected routes: require a valid bearer token.
    let protected = routes::router().route_layer(axum::middleware::from_fn_with_state(
        auth_state,
        middleware::auth_middleware,
    ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::public_router())
        .merge(protected)
        .layer(Extension(services))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(cors_origins)),
        )
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
