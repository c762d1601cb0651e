use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use pescaderia_core::{Aggregate, AggregateRoot, DomainError, Event, MovimientoId, ProductoId};

/// Descripcion stored for a salida registered without one.
pub const DESCRIPCION_SALIDA_POR_DEFECTO: &str = "Salida";

/// Direction of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TipoMovimiento {
    Entrada,
    Salida,
}

impl TipoMovimiento {
    pub fn as_str(&self) -> &'static str {
        match self {
            TipoMovimiento::Entrada => "ENTRADA",
            TipoMovimiento::Salida => "SALIDA",
        }
    }

    /// Signed ledger quantity for an absolute amount.
    pub fn firmar(&self, cantidad: i64) -> i64 {
        match self {
            TipoMovimiento::Entrada => cantidad.saturating_abs(),
            TipoMovimiento::Salida => -cantidad.saturating_abs(),
        }
    }
}

impl core::fmt::Display for TipoMovimiento {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for TipoMovimiento {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ENTRADA" => Ok(TipoMovimiento::Entrada),
            "SALIDA" => Ok(TipoMovimiento::Salida),
            other => Err(DomainError::validation(format!(
                "tipo de movimiento inválido: {other}"
            ))),
        }
    }
}

/// Aggregate root: Movimiento (one ledger line).
///
/// `cantidad` is signed: positive for entradas, negative for salidas.
/// A voided movement (`estado == false`) keeps its row but no longer
/// contributes to stock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Movimiento {
    pub id: MovimientoId,
    pub producto_id: ProductoId,
    pub tipo: TipoMovimiento,
    pub numero_factura: Option<i64>,
    pub fecha: NaiveDate,
    pub descripcion: String,
    pub cantidad: i64,
    pub estado: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
    pub created: bool,
}

impl Movimiento {
    /// Create an empty, not-yet-registered aggregate instance.
    pub fn empty(id: MovimientoId) -> Self {
        Self {
            id,
            producto_id: ProductoId::new(0),
            tipo: TipoMovimiento::Entrada,
            numero_factura: None,
            fecha: NaiveDate::default(),
            descripcion: String::new(),
            cantidad: 0,
            estado: false,
            created_at: DateTime::<Utc>::default(),
            updated_at: DateTime::<Utc>::default(),
            version: 0,
            created: false,
        }
    }

    /// Absolute quantity moved.
    pub fn cantidad_absoluta(&self) -> i64 {
        self.cantidad.saturating_abs()
    }

    fn ensure_registrado(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("Movimiento no encontrado"));
        }
        Ok(())
    }

    fn ensure_activo(&self) -> Result<(), DomainError> {
        if !self.estado {
            return Err(DomainError::invariant(
                "No se puede modificar un movimiento anulado",
            ));
        }
        Ok(())
    }

    fn ensure_movimiento_id(&self, movimiento_id: MovimientoId) -> Result<(), DomainError> {
        if self.id != movimiento_id {
            return Err(DomainError::invariant("movimiento_id no coincide"));
        }
        Ok(())
    }
}

impl AggregateRoot for Movimiento {
    type Id = MovimientoId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegistrarEntrada (one invoice line).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrarEntrada {
    pub movimiento_id: MovimientoId,
    pub producto_id: ProductoId,
    pub numero_factura: i64,
    pub fecha: NaiveDate,
    pub descripcion: String,
    pub cantidad: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RegistrarSalida.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrarSalida {
    pub movimiento_id: MovimientoId,
    pub producto_id: ProductoId,
    pub fecha: NaiveDate,
    pub descripcion: Option<String>,
    pub cantidad: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AnularMovimiento (void, reverting its stock effect).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnularMovimiento {
    pub movimiento_id: MovimientoId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: EditarCantidad (`cantidad` is absolute; the sign follows the movement type).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditarCantidad {
    pub movimiento_id: MovimientoId,
    pub cantidad: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: EditarProducto (move the line to another product, possibly with a new quantity).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditarProducto {
    pub movimiento_id: MovimientoId,
    pub producto_id: ProductoId,
    pub cantidad: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovimientoCommand {
    RegistrarEntrada(RegistrarEntrada),
    RegistrarSalida(RegistrarSalida),
    Anular(AnularMovimiento),
    EditarCantidad(EditarCantidad),
    EditarProducto(EditarProducto),
}

impl MovimientoCommand {
    pub fn movimiento_id(&self) -> MovimientoId {
        match self {
            MovimientoCommand::RegistrarEntrada(c) => c.movimiento_id,
            MovimientoCommand::RegistrarSalida(c) => c.movimiento_id,
            MovimientoCommand::Anular(c) => c.movimiento_id,
            MovimientoCommand::EditarCantidad(c) => c.movimiento_id,
            MovimientoCommand::EditarProducto(c) => c.movimiento_id,
        }
    }

    /// Registration commands target a movement that does not exist yet.
    pub fn is_registration(&self) -> bool {
        matches!(
            self,
            MovimientoCommand::RegistrarEntrada(_) | MovimientoCommand::RegistrarSalida(_)
        )
    }
}

/// Event: MovimientoRegistrado.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovimientoRegistrado {
    pub movimiento_id: MovimientoId,
    pub producto_id: ProductoId,
    pub tipo: TipoMovimiento,
    pub numero_factura: Option<i64>,
    pub fecha: NaiveDate,
    pub descripcion: String,
    /// Signed quantity.
    pub cantidad: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MovimientoAnulado.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovimientoAnulado {
    pub movimiento_id: MovimientoId,
    pub producto_id: ProductoId,
    /// Signed quantity at the time of voiding.
    pub cantidad: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CantidadEditada (signed quantities).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CantidadEditada {
    pub movimiento_id: MovimientoId,
    pub producto_id: ProductoId,
    pub cantidad_anterior: i64,
    pub cantidad_nueva: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductoCambiado (signed quantities).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductoCambiado {
    pub movimiento_id: MovimientoId,
    pub producto_anterior: ProductoId,
    pub cantidad_anterior: i64,
    pub producto_nuevo: ProductoId,
    pub cantidad_nueva: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovimientoEvent {
    Registrado(MovimientoRegistrado),
    Anulado(MovimientoAnulado),
    CantidadEditada(CantidadEditada),
    ProductoCambiado(ProductoCambiado),
}

/// Stock change a movement event implies for one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockEffect {
    pub producto_id: ProductoId,
    pub delta: i64,
}

impl MovimientoEvent {
    /// Stock adjustments implied by this event, in the order they must be applied.
    ///
    /// For a product change the old product is reverted before the new one is
    /// charged, so an entrada cannot be moved off a product whose stock was
    /// already consumed.
    pub fn stock_effects(&self) -> Vec<StockEffect> {
        let effects = match self {
            MovimientoEvent::Registrado(e) => vec![StockEffect {
                producto_id: e.producto_id,
                delta: e.cantidad,
            }],
            MovimientoEvent::Anulado(e) => vec![StockEffect {
                producto_id: e.producto_id,
                delta: -e.cantidad,
            }],
            MovimientoEvent::CantidadEditada(e) => vec![StockEffect {
                producto_id: e.producto_id,
                delta: e.cantidad_nueva - e.cantidad_anterior,
            }],
            MovimientoEvent::ProductoCambiado(e) => vec![
                StockEffect {
                    producto_id: e.producto_anterior,
                    delta: -e.cantidad_anterior,
                },
                StockEffect {
                    producto_id: e.producto_nuevo,
                    delta: e.cantidad_nueva,
                },
            ],
        };
        effects.into_iter().filter(|e| e.delta != 0).collect()
    }
}

impl Event for MovimientoEvent {
    fn event_type(&self) -> &'static str {
        match self {
            MovimientoEvent::Registrado(_) => "inventory.movimiento.registrado",
            MovimientoEvent::Anulado(_) => "inventory.movimiento.anulado",
            MovimientoEvent::CantidadEditada(_) => "inventory.movimiento.cantidad_editada",
            MovimientoEvent::ProductoCambiado(_) => "inventory.movimiento.producto_cambiado",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            MovimientoEvent::Registrado(e) => e.occurred_at,
            MovimientoEvent::Anulado(e) => e.occurred_at,
            MovimientoEvent::CantidadEditada(e) => e.occurred_at,
            MovimientoEvent::ProductoCambiado(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Movimiento {
    type Command = MovimientoCommand;
    type Event = MovimientoEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            MovimientoEvent::Registrado(e) => {
                self.id = e.movimiento_id;
                self.producto_id = e.producto_id;
                self.tipo = e.tipo;
                self.numero_factura = e.numero_factura;
                self.fecha = e.fecha;
                self.descripcion = e.descripcion.clone();
                self.cantidad = e.cantidad;
                self.estado = true;
                self.created_at = e.occurred_at;
                self.updated_at = e.occurred_at;
                self.created = true;
            }
            MovimientoEvent::Anulado(e) => {
                self.estado = false;
                self.updated_at = e.occurred_at;
            }
            MovimientoEvent::CantidadEditada(e) => {
                self.cantidad = e.cantidad_nueva;
                self.updated_at = e.occurred_at;
            }
            MovimientoEvent::ProductoCambiado(e) => {
                self.producto_id = e.producto_nuevo;
                self.cantidad = e.cantidad_nueva;
                self.updated_at = e.occurred_at;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            MovimientoCommand::RegistrarEntrada(cmd) => self.handle_entrada(cmd),
            MovimientoCommand::RegistrarSalida(cmd) => self.handle_salida(cmd),
            MovimientoCommand::Anular(cmd) => self.handle_anular(cmd),
            MovimientoCommand::EditarCantidad(cmd) => self.handle_editar_cantidad(cmd),
            MovimientoCommand::EditarProducto(cmd) => self.handle_editar_producto(cmd),
        }
    }
}

fn validate_cantidad(cantidad: i64) -> Result<(), DomainError> {
    if cantidad <= 0 {
        return Err(DomainError::validation("Cantidad debe ser mayor a 0"));
    }
    Ok(())
}

fn validate_producto(producto_id: ProductoId) -> Result<(), DomainError> {
    if !producto_id.is_valid() {
        return Err(DomainError::validation("Producto no seleccionado"));
    }
    Ok(())
}

impl Movimiento {
    fn ensure_nuevo(&self) -> Result<(), DomainError> {
        if self.created {
            return Err(DomainError::conflict("El movimiento ya existe"));
        }
        Ok(())
    }

    fn handle_entrada(&self, cmd: &RegistrarEntrada) -> Result<Vec<MovimientoEvent>, DomainError> {
        self.ensure_nuevo()?;
        if cmd.numero_factura <= 0 {
            return Err(DomainError::validation("Número de factura inválido"));
        }
        validate_producto(cmd.producto_id)?;
        let descripcion = cmd.descripcion.trim();
        if descripcion.is_empty() {
            return Err(DomainError::validation("Descripción requerida"));
        }
        validate_cantidad(cmd.cantidad)?;

        Ok(vec![MovimientoEvent::Registrado(MovimientoRegistrado {
            movimiento_id: cmd.movimiento_id,
            producto_id: cmd.producto_id,
            tipo: TipoMovimiento::Entrada,
            numero_factura: Some(cmd.numero_factura),
            fecha: cmd.fecha,
            descripcion: descripcion.to_string(),
            cantidad: TipoMovimiento::Entrada.firmar(cmd.cantidad),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_salida(&self, cmd: &RegistrarSalida) -> Result<Vec<MovimientoEvent>, DomainError> {
        self.ensure_nuevo()?;
        validate_producto(cmd.producto_id)?;
        validate_cantidad(cmd.cantidad)?;

        let descripcion = cmd
            .descripcion
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or(DESCRIPCION_SALIDA_POR_DEFECTO);

        Ok(vec![MovimientoEvent::Registrado(MovimientoRegistrado {
            movimiento_id: cmd.movimiento_id,
            producto_id: cmd.producto_id,
            tipo: TipoMovimiento::Salida,
            numero_factura: None,
            fecha: cmd.fecha,
            descripcion: descripcion.to_string(),
            cantidad: TipoMovimiento::Salida.firmar(cmd.cantidad),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_anular(&self, cmd: &AnularMovimiento) -> Result<Vec<MovimientoEvent>, DomainError> {
        self.ensure_registrado()?;
        self.ensure_movimiento_id(cmd.movimiento_id)?;
        if !self.estado {
            return Err(DomainError::conflict("El movimiento ya está anulado"));
        }

        Ok(vec![MovimientoEvent::Anulado(MovimientoAnulado {
            movimiento_id: self.id,
            producto_id: self.producto_id,
            cantidad: self.cantidad,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_editar_cantidad(&self, cmd: &EditarCantidad) -> Result<Vec<MovimientoEvent>, DomainError> {
        self.ensure_registrado()?;
        self.ensure_movimiento_id(cmd.movimiento_id)?;
        self.ensure_activo()?;
        validate_cantidad(cmd.cantidad)?;

        let cantidad_nueva = self.tipo.firmar(cmd.cantidad);
        if cantidad_nueva == self.cantidad {
            return Ok(vec![]);
        }

        Ok(vec![MovimientoEvent::CantidadEditada(CantidadEditada {
            movimiento_id: self.id,
            producto_id: self.producto_id,
            cantidad_anterior: self.cantidad,
            cantidad_nueva,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_editar_producto(&self, cmd: &EditarProducto) -> Result<Vec<MovimientoEvent>, DomainError> {
        self.ensure_registrado()?;
        self.ensure_movimiento_id(cmd.movimiento_id)?;
        self.ensure_activo()?;
        validate_producto(cmd.producto_id)?;
        validate_cantidad(cmd.cantidad)?;

        let cantidad_nueva = self.tipo.firmar(cmd.cantidad);
        if cmd.producto_id == self.producto_id && cantidad_nueva == self.cantidad {
            return Ok(vec![]);
        }

        Ok(vec![MovimientoEvent::ProductoCambiado(ProductoCambiado {
            movimiento_id: self.id,
            producto_anterior: self.producto_id,
            cantidad_anterior: self.cantidad,
            producto_nuevo: cmd.producto_id,
            cantidad_nueva,
            occurred_at: cmd.occurred_at,
        })])
    }
}
