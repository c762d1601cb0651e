use std::sync::Arc;

use axum::{
    extract::{
        Extension, Path, Query,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;

use pescaderia_core::{MovimientoId, ProductoId};
use pescaderia_infra::{DispatchError, LedgerOutcome, MovimientoStore};
use pescaderia_inventory::{
    AnularMovimiento, EditarCantidad, EditarProducto, MovimientoCommand, MovimientoFilter,
    RegistrarEntrada, RegistrarSalida, TipoMovimiento, agrupar_facturas, buscar_facturas,
};

use crate::app::dto::{
    self, EditarCantidadRequest, EditarProductoRequest, EntradaRequest, FacturaResponse,
    FacturasQuery, MovimientosQuery, SalidaRequest,
};
use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list))
        .route("/facturas", get(facturas))
        .route("/entrada", post(registrar_entrada))
        .route("/salida", post(registrar_salida))
        .route("/:id", get(get_one))
        .route("/:id/cancelar", put(anular))
        .route("/:id/editar-cantidad", put(editar_cantidad))
        .route("/:id/editar-producto", put(editar_producto))
}

pub async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<MovimientosQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(rejection) => return errors::query_rejection(rejection),
    };
    let filter = match query.to_filter() {
        Ok(f) => f,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let movimientos = match services.store().list_movimientos(&filter).await {
        Ok(m) => m,
        Err(e) => return errors::store_error_to_response(e),
    };
    match services.movimientos_response(movimientos).await {
        Ok(out) => Json(out).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// Entradas grouped into invoices, newest fecha first.
pub async fn facturas(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<FacturasQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(rejection) => return errors::query_rejection(rejection),
    };
    let filter = MovimientoFilter {
        tipo: Some(TipoMovimiento::Entrada),
        estado: query.estado,
        ..Default::default()
    };

    let movimientos = match services.store().list_movimientos(&filter).await {
        Ok(m) => m,
        Err(e) => return errors::store_error_to_response(e),
    };
    let lineas = match services.movimientos_response(movimientos).await {
        Ok(l) => l,
        Err(e) => return errors::store_error_to_response(e),
    };

    let facturas = buscar_facturas(agrupar_facturas(&lineas), query.q.as_deref().unwrap_or_default());
    let out: Vec<FacturaResponse> = facturas.into_iter().map(FacturaResponse::from).collect();
    Json(out).into_response()
}

pub async fn get_one(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let Ok(id) = id.parse::<MovimientoId>() else {
        return errors::invalid_id("movimiento");
    };
    let movimiento = match services.store().load_movimiento(id).await {
        Ok(Some(m)) => m,
        Ok(None) => return errors::not_found("Movimiento no encontrado"),
        Err(e) => return errors::store_error_to_response(e),
    };
    match services.movimiento_response(movimiento).await {
        Ok(m) => Json(m).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn registrar_entrada(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<EntradaRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };
    let fecha = match dto::parse_fecha(&body.fecha) {
        Ok(f) => f,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let movimiento_id = match services.dispatcher.reserve_movimiento_id().await {
        Ok(id) => id,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    let cmd = MovimientoCommand::RegistrarEntrada(RegistrarEntrada {
        movimiento_id,
        producto_id: ProductoId::new(body.producto_id),
        numero_factura: body.numero_factura,
        fecha,
        descripcion: body.descripcion,
        cantidad: body.cantidad,
        occurred_at: Utc::now(),
    });

    respond(&services, StatusCode::CREATED, services.dispatcher.dispatch_movimiento(cmd).await).await
}

pub async fn registrar_salida(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<SalidaRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };
    let fecha = match dto::parse_fecha(&body.fecha) {
        Ok(f) => f,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let movimiento_id = match services.dispatcher.reserve_movimiento_id().await {
        Ok(id) => id,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    let cmd = MovimientoCommand::RegistrarSalida(RegistrarSalida {
        movimiento_id,
        producto_id: ProductoId::new(body.producto_id),
        fecha,
        descripcion: body.descripcion,
        cantidad: body.cantidad,
        occurred_at: Utc::now(),
    });

    respond(&services, StatusCode::CREATED, services.dispatcher.dispatch_movimiento(cmd).await).await
}

pub async fn anular(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let Ok(movimiento_id) = id.parse::<MovimientoId>() else {
        return errors::invalid_id("movimiento");
    };
    let cmd = MovimientoCommand::Anular(AnularMovimiento {
        movimiento_id,
        occurred_at: Utc::now(),
    });
    respond(&services, StatusCode::OK, services.dispatcher.dispatch_movimiento(cmd).await).await
}

pub async fn editar_cantidad(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<EditarCantidadRequest>, JsonRejection>,
) -> Response {
    let Ok(movimiento_id) = id.parse::<MovimientoId>() else {
        return errors::invalid_id("movimiento");
    };
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };
    let cmd = MovimientoCommand::EditarCantidad(EditarCantidad {
        movimiento_id,
        cantidad: body.cantidad,
        occurred_at: Utc::now(),
    });
    respond(&services, StatusCode::OK, services.dispatcher.dispatch_movimiento(cmd).await).await
}

pub async fn editar_producto(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<EditarProductoRequest>, JsonRejection>,
) -> Response {
    let Ok(movimiento_id) = id.parse::<MovimientoId>() else {
        return errors::invalid_id("movimiento");
    };
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };
    let cmd = MovimientoCommand::EditarProducto(EditarProducto {
        movimiento_id,
        producto_id: ProductoId::new(body.producto_id),
        cantidad: body.cantidad,
        occurred_at: Utc::now(),
    });
    respond(&services, StatusCode::OK, services.dispatcher.dispatch_movimiento(cmd).await).await
}

async fn respond(
    services: &AppServices,
    status: StatusCode,
    result: Result<LedgerOutcome, DispatchError>,
) -> Response {
    let outcome = match result {
        Ok(o) => o,
        Err(e) => return errors::dispatch_error_to_response(e),
    };
    tracing::info!(
        movimiento_id = %outcome.movimiento.id,
        events = outcome.events.len(),
        "movimiento committed"
    );
    match services
        .movimiento_response_with(outcome.movimiento, &outcome.productos)
        .await
    {
        Ok(m) => (status, Json(m)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
