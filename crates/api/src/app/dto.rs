use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use pescaderia_auth::User;
use pescaderia_core::{DomainError, DomainResult, MovimientoId, ProductoId};
use pescaderia_inventory::{Asiento, Factura, Movimiento, MovimientoFilter, TipoMovimiento};
use pescaderia_products::{Producto, UnidadMedida};

const FECHA_FORMATO: &str = "%Y-%m-%d";

/// Parse a `YYYY-MM-DD` calendar date.
pub fn parse_fecha(raw: &str) -> DomainResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), FECHA_FORMATO)
        .map_err(|_| DomainError::validation("Formato de fecha inválido"))
}

fn parse_unidad(raw: Option<&str>) -> DomainResult<Option<UnidadMedida>> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .transpose()
}

// ---- auth ----

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

// ---- productos ----

#[derive(Debug, Deserialize)]
pub struct CrearProductoRequest {
    #[serde(default)]
    pub codigo: i64,
    #[serde(default)]
    pub descripcion: String,
    #[serde(default)]
    pub stock: i64,
    #[serde(default)]
    pub tipo_cantidad: Option<String>,
}

impl CrearProductoRequest {
    pub fn unidad(&self) -> DomainResult<UnidadMedida> {
        Ok(parse_unidad(self.tipo_cantidad.as_deref())?.unwrap_or_default())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ActualizarProductoRequest {
    pub codigo: Option<i64>,
    pub descripcion: Option<String>,
    pub stock: Option<i64>,
    pub tipo_cantidad: Option<String>,
}

impl ActualizarProductoRequest {
    pub fn unidad(&self) -> DomainResult<Option<UnidadMedida>> {
        parse_unidad(self.tipo_cantidad.as_deref())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductosQuery {
    /// Case-insensitive match on codigo or descripcion.
    pub q: Option<String>,
    /// Only products with `stock <= stock_max`.
    pub stock_max: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductoResponse {
    pub id: ProductoId,
    pub codigo: i64,
    pub descripcion: String,
    pub stock: i64,
    pub tipo_cantidad: UnidadMedida,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub fn producto_to_response(p: &Producto) -> ProductoResponse {
    ProductoResponse {
        id: p.id,
        codigo: p.codigo,
        descripcion: p.descripcion.clone(),
        stock: p.stock,
        tipo_cantidad: p.tipo_cantidad,
        created_at: p.created_at,
        updated_at: p.updated_at,
    }
}

// ---- movimientos ----

#[derive(Debug, Deserialize)]
pub struct EntradaRequest {
    #[serde(default)]
    pub numero_factura: i64,
    #[serde(default)]
    pub fecha: String,
    #[serde(default)]
    pub producto_id: i64,
    #[serde(default)]
    pub descripcion: String,
    #[serde(default)]
    pub cantidad: i64,
}

#[derive(Debug, Deserialize)]
pub struct SalidaRequest {
    #[serde(default)]
    pub fecha: String,
    #[serde(default)]
    pub producto_id: i64,
    pub descripcion: Option<String>,
    #[serde(default)]
    pub cantidad: i64,
}

#[derive(Debug, Deserialize)]
pub struct EditarCantidadRequest {
    #[serde(default)]
    pub cantidad: i64,
}

#[derive(Debug, Deserialize)]
pub struct EditarProductoRequest {
    #[serde(default)]
    pub producto_id: i64,
    #[serde(default)]
    pub cantidad: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct MovimientosQuery {
    pub tipo: Option<String>,
    pub estado: Option<bool>,
    pub producto_id: Option<i64>,
    pub numero_factura: Option<i64>,
    pub desde: Option<String>,
    pub hasta: Option<String>,
}

impl MovimientosQuery {
    pub fn to_filter(&self) -> DomainResult<MovimientoFilter> {
        let fecha = |raw: &Option<String>| -> DomainResult<Option<NaiveDate>> {
            raw.as_deref()
                .filter(|s| !s.trim().is_empty())
                .map(parse_fecha)
                .transpose()
        };
        Ok(MovimientoFilter {
            tipo: self
                .tipo
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .map(str::parse::<TipoMovimiento>)
                .transpose()?,
            estado: self.estado,
            producto_id: self.producto_id.map(ProductoId::new),
            numero_factura: self.numero_factura,
            desde: fecha(&self.desde)?,
            hasta: fecha(&self.hasta)?,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct FacturasQuery {
    pub estado: Option<bool>,
    pub q: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovimientoResponse {
    pub id: MovimientoId,
    pub producto_id: ProductoId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub producto: Option<ProductoResponse>,
    pub tipo: TipoMovimiento,
    pub numero_factura: Option<i64>,
    pub fecha: NaiveDate,
    pub descripcion: String,
    pub cantidad: i64,
    pub estado: bool,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

pub fn movimiento_to_response(m: Movimiento, producto: Option<&Producto>) -> MovimientoResponse {
    MovimientoResponse {
        id: m.id,
        producto_id: m.producto_id,
        producto: producto.map(producto_to_response),
        tipo: m.tipo,
        numero_factura: m.numero_factura,
        fecha: m.fecha,
        descripcion: m.descripcion,
        cantidad: m.cantidad,
        estado: m.estado,
        created_at: m.created_at,
        updated_at: m.updated_at,
    }
}

impl Asiento for MovimientoResponse {
    fn producto_id(&self) -> ProductoId {
        self.producto_id
    }

    fn tipo(&self) -> TipoMovimiento {
        self.tipo
    }

    fn numero_factura(&self) -> Option<i64> {
        self.numero_factura
    }

    fn fecha(&self) -> NaiveDate {
        self.fecha
    }

    fn descripcion(&self) -> &str {
        &self.descripcion
    }

    fn cantidad(&self) -> i64 {
        self.cantidad
    }

    fn activo(&self) -> bool {
        self.estado
    }

    fn producto_codigo(&self) -> Option<i64> {
        self.producto.as_ref().map(|p| p.codigo)
    }

    fn producto_descripcion(&self) -> Option<&str> {
        self.producto.as_ref().map(|p| p.descripcion.as_str())
    }
}

#[derive(Debug, Serialize)]
pub struct FacturaResponse {
    #[serde(flatten)]
    pub factura: Factura<MovimientoResponse>,
    pub total_cantidad: i64,
}

impl From<Factura<MovimientoResponse>> for FacturaResponse {
    fn from(factura: Factura<MovimientoResponse>) -> Self {
        let total_cantidad = factura.total_cantidad();
        Self { factura, total_cantidad }
    }
}
