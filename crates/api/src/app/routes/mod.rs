use axum::{Router, routing::get, routing::post};

pub mod auth;
pub mod movimientos;
pub mod productos;
pub mod system;

/// Endpoints reachable without a token.
pub fn public_router() -> Router {
    Router::new()
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/signup", post(auth::signup))
}

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/api/auth/profile", get(auth::profile))
        .nest("/api/productos", productos::router())
        .nest("/api/movimientos", movimientos::router())
}
