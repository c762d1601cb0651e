use std::sync::Arc;

use axum::{
    extract::{
        Extension, Path, Query,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde_json::json;

use pescaderia_core::ProductoId;
use pescaderia_infra::ProductoStore;
use pescaderia_products::{
    ActualizarProducto, CrearProducto, EliminarProducto, ProductoCommand, buscar, con_stock_bajo,
};

use crate::app::dto::{self, ActualizarProductoRequest, CrearProductoRequest, ProductosQuery};
use crate::app::errors;
use crate::app::services::AppServices;

const NO_ENCONTRADO: &str = "Producto no encontrado";

pub fn router() -> Router {
    Router::new()
        .route("/", get(list).post(create))
        .route("/codigo/:codigo", get(by_codigo))
        .route("/:id", get(get_one).put(update).delete(delete))
}

pub async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<ProductosQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(rejection) => return errors::query_rejection(rejection),
    };
    let productos = match services.store().list_productos().await {
        Ok(p) => p,
        Err(e) => return errors::store_error_to_response(e),
    };

    let mut matching = buscar(&productos, query.q.as_deref().unwrap_or_default());
    if let Some(limite) = query.stock_max {
        let bajos: Vec<ProductoId> = con_stock_bajo(&productos, limite).iter().map(|p| p.id).collect();
        matching.retain(|p| bajos.contains(&p.id));
    }

    let out: Vec<_> = matching.into_iter().map(dto::producto_to_response).collect();
    Json(out).into_response()
}

pub async fn create(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<CrearProductoRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };
    let tipo_cantidad = match body.unidad() {
        Ok(u) => u,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let producto_id = match services.dispatcher.reserve_producto_id().await {
        Ok(id) => id,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    let cmd = ProductoCommand::Crear(CrearProducto {
        producto_id,
        codigo: body.codigo,
        descripcion: body.descripcion,
        stock: body.stock,
        tipo_cantidad,
        occurred_at: Utc::now(),
    });

    match services.dispatcher.dispatch_producto(cmd).await {
        Ok(p) => (StatusCode::CREATED, Json(dto::producto_to_response(&p))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn get_one(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let Ok(id) = id.parse::<ProductoId>() else {
        return errors::invalid_id("producto");
    };
    match services.store().load_producto(id).await {
        Ok(Some(p)) => Json(dto::producto_to_response(&p)).into_response(),
        Ok(None) => errors::not_found(NO_ENCONTRADO),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn by_codigo(
    Extension(services): Extension<Arc<AppServices>>,
    Path(codigo): Path<String>,
) -> Response {
    let Ok(codigo) = codigo.trim().parse::<i64>() else {
        return errors::json_error(StatusCode::BAD_REQUEST, "invalid_codigo", "Código inválido");
    };
    match services.store().producto_by_codigo(codigo).await {
        Ok(Some(p)) => Json(dto::producto_to_response(&p)).into_response(),
        Ok(None) => errors::not_found(NO_ENCONTRADO),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn update(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<ActualizarProductoRequest>, JsonRejection>,
) -> Response {
    let Ok(producto_id) = id.parse::<ProductoId>() else {
        return errors::invalid_id("producto");
    };
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };
    let tipo_cantidad = match body.unidad() {
        Ok(u) => u,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let cmd = ProductoCommand::Actualizar(ActualizarProducto {
        producto_id,
        codigo: body.codigo,
        descripcion: body.descripcion,
        stock: body.stock,
        tipo_cantidad,
        occurred_at: Utc::now(),
    });

    match services.dispatcher.dispatch_producto(cmd).await {
        Ok(p) => Json(dto::producto_to_response(&p)).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn delete(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let Ok(producto_id) = id.parse::<ProductoId>() else {
        return errors::invalid_id("producto");
    };

    let cmd = ProductoCommand::Eliminar(EliminarProducto {
        producto_id,
        occurred_at: Utc::now(),
    });

    match services.dispatcher.dispatch_producto(cmd).await {
        Ok(_) => Json(json!({ "mensaje": "Producto eliminado correctamente" })).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
