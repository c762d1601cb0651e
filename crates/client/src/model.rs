//! Wire types as the server sends them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use pescaderia_core::{MovimientoId, ProductoId, UserId};
use pescaderia_inventory::{Asiento, TipoMovimiento};
use pescaderia_products::UnidadMedida;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Producto {
    pub id: ProductoId,
    pub codigo: i64,
    pub descripcion: String,
    pub stock: i64,
    #[serde(default)]
    pub tipo_cantidad: UnidadMedida,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movimiento {
    pub id: MovimientoId,
    pub producto_id: ProductoId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub producto: Option<Producto>,
    pub tipo: TipoMovimiento,
    #[serde(default)]
    pub numero_factura: Option<i64>,
    pub fecha: NaiveDate,
    pub descripcion: String,
    pub cantidad: i64,
    pub estado: bool,
    #[serde(default, rename = "createdAt")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, rename = "updatedAt")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// An invoice as grouped by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacturaResumen {
    pub numero_factura: i64,
    pub fecha: NaiveDate,
    pub descripcion: String,
    pub estado: bool,
    pub lineas: Vec<Movimiento>,
    pub total_cantidad: i64,
}

impl Asiento for Movimiento {
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
