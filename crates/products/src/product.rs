use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pescaderia_core::{Aggregate, AggregateRoot, DomainError, Event, ProductoId};

/// Unit a product's stock is counted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnidadMedida {
    #[default]
    Unidades,
    Cajas,
    Kg,
}

impl UnidadMedida {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnidadMedida::Unidades => "unidades",
            UnidadMedida::Cajas => "cajas",
            UnidadMedida::Kg => "kg",
        }
    }
}

impl core::fmt::Display for UnidadMedida {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for UnidadMedida {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "unidades" => Ok(UnidadMedida::Unidades),
            "cajas" => Ok(UnidadMedida::Cajas),
            "kg" => Ok(UnidadMedida::Kg),
            other => Err(DomainError::validation(format!(
                "tipo de cantidad inválido: {other} (use unidades, cajas o kg)"
            ))),
        }
    }
}

/// Aggregate root: Producto.
///
/// # Invariants
/// - `codigo` is positive (uniqueness across the catalog is checked by the dispatcher).
/// - `descripcion` is never blank.
/// - `stock` never goes negative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Producto {
    pub id: ProductoId,
    pub codigo: i64,
    pub descripcion: String,
    pub stock: i64,
    pub tipo_cantidad: UnidadMedida,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
    pub created: bool,
    pub eliminado: bool,
}

impl Producto {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: ProductoId) -> Self {
        Self {
            id,
            codigo: 0,
            descripcion: String::new(),
            stock: 0,
            tipo_cantidad: UnidadMedida::default(),
            created_at: DateTime::<Utc>::default(),
            updated_at: DateTime::<Utc>::default(),
            version: 0,
            created: false,
            eliminado: false,
        }
    }

    fn ensure_exists(&self) -> Result<(), DomainError> {
        if !self.created || self.eliminado {
            return Err(DomainError::not_found("Producto no encontrado"));
        }
        Ok(())
    }

    fn ensure_producto_id(&self, producto_id: ProductoId) -> Result<(), DomainError> {
        if self.id != producto_id {
            return Err(DomainError::invariant("producto_id no coincide"));
        }
        Ok(())
    }
}

impl AggregateRoot for Producto {
    type Id = ProductoId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CrearProducto.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrearProducto {
    pub producto_id: ProductoId,
    pub codigo: i64,
    pub descripcion: String,
    pub stock: i64,
    pub tipo_cantidad: UnidadMedida,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ActualizarProducto (partial update; `None` leaves a field unchanged).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActualizarProducto {
    pub producto_id: ProductoId,
    pub codigo: Option<i64>,
    pub descripcion: Option<String>,
    pub stock: Option<i64>,
    pub tipo_cantidad: Option<UnidadMedida>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AjustarStock (issued by the dispatcher for movement stock effects).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AjustarStock {
    pub producto_id: ProductoId,
    pub delta: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: EliminarProducto.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EliminarProducto {
    pub producto_id: ProductoId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductoCommand {
    Crear(CrearProducto),
    Actualizar(ActualizarProducto),
    AjustarStock(AjustarStock),
    Eliminar(EliminarProducto),
}

/// Event: ProductoCreado.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductoCreado {
    pub producto_id: ProductoId,
    pub codigo: i64,
    pub descripcion: String,
    pub stock: i64,
    pub tipo_cantidad: UnidadMedida,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductoActualizado (carries the resulting values).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductoActualizado {
    pub producto_id: ProductoId,
    pub codigo: i64,
    pub descripcion: String,
    pub stock: i64,
    pub tipo_cantidad: UnidadMedida,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockAjustado.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAjustado {
    pub producto_id: ProductoId,
    pub delta: i64,
    pub stock_resultante: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductoEliminado.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductoEliminado {
    pub producto_id: ProductoId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductoEvent {
    Creado(ProductoCreado),
    Actualizado(ProductoActualizado),
    StockAjustado(StockAjustado),
    Eliminado(ProductoEliminado),
}

impl Event for ProductoEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductoEvent::Creado(_) => "products.producto.creado",
            ProductoEvent::Actualizado(_) => "products.producto.actualizado",
            ProductoEvent::StockAjustado(_) => "products.producto.stock_ajustado",
            ProductoEvent::Eliminado(_) => "products.producto.eliminado",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductoEvent::Creado(e) => e.occurred_at,
            ProductoEvent::Actualizado(e) => e.occurred_at,
            ProductoEvent::StockAjustado(e) => e.occurred_at,
            ProductoEvent::Eliminado(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Producto {
    type Command = ProductoCommand;
    type Event = ProductoEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductoEvent::Creado(e) => {
                self.id = e.producto_id;
                self.codigo = e.codigo;
                self.descripcion = e.descripcion.clone();
                self.stock = e.stock;
                self.tipo_cantidad = e.tipo_cantidad;
                self.created_at = e.occurred_at;
                self.updated_at = e.occurred_at;
                self.created = true;
            }
            ProductoEvent::Actualizado(e) => {
                self.codigo = e.codigo;
                self.descripcion = e.descripcion.clone();
                self.stock = e.stock;
                self.tipo_cantidad = e.tipo_cantidad;
                self.updated_at = e.occurred_at;
            }
            ProductoEvent::StockAjustado(e) => {
                self.stock = e.stock_resultante;
                self.updated_at = e.occurred_at;
            }
            ProductoEvent::Eliminado(e) => {
                self.eliminado = true;
                self.updated_at = e.occurred_at;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductoCommand::Crear(cmd) => self.handle_crear(cmd),
            ProductoCommand::Actualizar(cmd) => self.handle_actualizar(cmd),
            ProductoCommand::AjustarStock(cmd) => self.handle_ajustar(cmd),
            ProductoCommand::Eliminar(cmd) => self.handle_eliminar(cmd),
        }
    }
}

fn validate_codigo(codigo: i64) -> Result<(), DomainError> {
    if codigo <= 0 {
        return Err(DomainError::validation("El código es obligatorio"));
    }
    Ok(())
}

fn validate_descripcion(descripcion: &str) -> Result<String, DomainError> {
    let trimmed = descripcion.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("La descripción es obligatoria"));
    }
    Ok(trimmed.to_string())
}

fn validate_stock(stock: i64) -> Result<(), DomainError> {
    if stock < 0 {
        return Err(DomainError::validation("El stock no puede ser negativo"));
    }
    Ok(())
}

impl Producto {
    fn handle_crear(&self, cmd: &CrearProducto) -> Result<Vec<ProductoEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("El producto ya existe"));
        }
        validate_codigo(cmd.codigo)?;
        let descripcion = validate_descripcion(&cmd.descripcion)?;
        validate_stock(cmd.stock)?;

        Ok(vec![ProductoEvent::Creado(ProductoCreado {
            producto_id: cmd.producto_id,
            codigo: cmd.codigo,
            descripcion,
            stock: cmd.stock,
            tipo_cantidad: cmd.tipo_cantidad,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_actualizar(&self, cmd: &ActualizarProducto) -> Result<Vec<ProductoEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_producto_id(cmd.producto_id)?;

        let codigo = match cmd.codigo {
            Some(c) => {
                validate_codigo(c)?;
                c
            }
            None => self.codigo,
        };
        let descripcion = match &cmd.descripcion {
            Some(d) => validate_descripcion(d)?,
            None => self.descripcion.clone(),
        };
        let stock = match cmd.stock {
            Some(s) => {
                validate_stock(s)?;
                s
            }
            None => self.stock,
        };
        let tipo_cantidad = cmd.tipo_cantidad.unwrap_or(self.tipo_cantidad);

        let unchanged = codigo == self.codigo
            && descripcion == self.descripcion
            && stock == self.stock
            && tipo_cantidad == self.tipo_cantidad;
        if unchanged {
            return Ok(vec![]);
        }

        Ok(vec![ProductoEvent::Actualizado(ProductoActualizado {
            producto_id: cmd.producto_id,
            codigo,
            descripcion,
            stock,
            tipo_cantidad,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_ajustar(&self, cmd: &AjustarStock) -> Result<Vec<ProductoEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_producto_id(cmd.producto_id)?;

        if cmd.delta == 0 {
            return Err(DomainError::validation("El ajuste de stock no puede ser cero"));
        }

        let Some(stock_resultante) = self.stock.checked_add(cmd.delta) else {
            return Err(DomainError::invariant(format!(
                "El stock de {} excede el máximo permitido",
                self.descripcion
            )));
        };
        if stock_resultante < 0 {
            return Err(DomainError::invariant(format!(
                "Stock insuficiente para {} (disponible: {}, requerido: {})",
                self.descripcion,
                self.stock,
                cmd.delta.unsigned_abs()
            )));
        }

        Ok(vec![ProductoEvent::StockAjustado(StockAjustado {
            producto_id: cmd.producto_id,
            delta: cmd.delta,
            stock_resultante,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_eliminar(&self, cmd: &EliminarProducto) -> Result<Vec<ProductoEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_producto_id(cmd.producto_id)?;

        Ok(vec![ProductoEvent::Eliminado(ProductoEliminado {
            producto_id: cmd.producto_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_id() -> ProductoId {
        ProductoId::new(1)
    }

    fn creado(stock: i64) -> Producto {
        let mut p = Producto::empty(test_id());
        p.execute(&ProductoCommand::Crear(CrearProducto {
            producto_id: test_id(),
            codigo: 101,
            descripcion: "Merluza".to_string(),
            stock,
            tipo_cantidad: UnidadMedida::Kg,
            occurred_at: Utc::now(),
        }))
        .unwrap();
        p
    }

    fn ajuste(delta: i64) -> ProductoCommand {
        ProductoCommand::AjustarStock(AjustarStock {
            producto_id: test_id(),
            delta,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn crear_emits_creado_with_trimmed_descripcion() {
        let p = Producto::empty(test_id());
        let events = p
            .handle(&ProductoCommand::Crear(CrearProducto {
                producto_id: test_id(),
                codigo: 7,
                descripcion: "  Salmón rosado ".to_string(),
                stock: 3,
                tipo_cantidad: UnidadMedida::Cajas,
                occurred_at: Utc::now(),
            }))
            .unwrap();

        assert_eq!(events.len(), 1);
        match &events[0] {
            ProductoEvent::Creado(e) => {
                assert_eq!(e.codigo, 7);
                assert_eq!(e.descripcion, "Salmón rosado");
                assert_eq!(e.stock, 3);
                assert_eq!(e.tipo_cantidad, UnidadMedida::Cajas);
            }
            other => panic!("expected Creado, got {other:?}"),
        }
    }

    #[test]
    fn crear_rejects_blank_descripcion_zero_codigo_and_negative_stock() {
        let p = Producto::empty(test_id());
        let base = CrearProducto {
            producto_id: test_id(),
            codigo: 1,
            descripcion: "Atún".to_string(),
            stock: 0,
            tipo_cantidad: UnidadMedida::Unidades,
            occurred_at: Utc::now(),
        };

        let blank = CrearProducto { descripcion: "   ".to_string(), ..base.clone() };
        let zero = CrearProducto { codigo: 0, ..base.clone() };
        let negative = CrearProducto { stock: -1, ..base };

        for cmd in [blank, zero, negative] {
            let err = p.handle(&ProductoCommand::Crear(cmd)).unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)), "got {err:?}");
        }
    }

    #[test]
    fn crear_twice_is_a_conflict() {
        let p = creado(0);
        let err = p
            .handle(&ProductoCommand::Crear(CrearProducto {
                producto_id: test_id(),
                codigo: 101,
                descripcion: "Merluza".to_string(),
                stock: 0,
                tipo_cantidad: UnidadMedida::Kg,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn ajustar_stock_moves_stock_and_bumps_version() {
        let mut p = creado(10);
        assert_eq!(p.version(), 1);

        p.execute(&ajuste(5)).unwrap();
        assert_eq!(p.stock, 15);
        p.execute(&ajuste(-15)).unwrap();
        assert_eq!(p.stock, 0);
        assert_eq!(p.version(), 3);
    }

    #[test]
    fn ajustar_stock_below_zero_is_rejected_without_mutation() {
        let mut p = creado(4);
        let before = p.clone();

        let err = p.execute(&ajuste(-5)).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(ref m) if m.starts_with("Stock insuficiente")));
        assert_eq!(p, before);
    }

    #[test]
    fn ajustar_past_i64_max_is_rejected_without_mutation() {
        let mut p = creado(i64::MAX);
        let before = p.clone();

        let err = p.execute(&ajuste(1)).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(ref m) if m.contains("máximo")));
        assert_eq!(p, before);
    }

    #[test]
    fn ajustar_zero_is_invalid() {
        let p = creado(4);
        assert!(matches!(p.handle(&ajuste(0)), Err(DomainError::Validation(_))));
    }

    #[test]
    fn actualizar_applies_only_present_fields() {
        let mut p = creado(10);
        p.execute(&ProductoCommand::Actualizar(ActualizarProducto {
            producto_id: test_id(),
            codigo: None,
            descripcion: Some("Merluza fresca".to_string()),
            stock: None,
            tipo_cantidad: Some(UnidadMedida::Cajas),
            occurred_at: Utc::now(),
        }))
        .unwrap();

        assert_eq!(p.codigo, 101);
        assert_eq!(p.descripcion, "Merluza fresca");
        assert_eq!(p.stock, 10);
        assert_eq!(p.tipo_cantidad, UnidadMedida::Cajas);
    }

    #[test]
    fn actualizar_without_changes_emits_nothing() {
        let p = creado(10);
        let events = p
            .handle(&ProductoCommand::Actualizar(ActualizarProducto {
                producto_id: test_id(),
                codigo: Some(101),
                descripcion: Some("Merluza".to_string()),
                stock: Some(10),
                tipo_cantidad: None,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn commands_on_deleted_product_are_not_found() {
        let mut p = creado(1);
        p.execute(&ProductoCommand::Eliminar(EliminarProducto {
            producto_id: test_id(),
            occurred_at: Utc::now(),
        }))
        .unwrap();
        assert!(p.eliminado);
        assert!(matches!(p.handle(&ajuste(1)), Err(DomainError::NotFound(_))));
    }

    #[test]
    fn unidad_medida_parses_and_serializes_lowercase() {
        assert_eq!("KG".parse::<UnidadMedida>().unwrap(), UnidadMedida::Kg);
        assert!("litros".parse::<UnidadMedida>().is_err());
        assert_eq!(serde_json::to_string(&UnidadMedida::Cajas).unwrap(), "\"cajas\"");
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: no sequence of adjustments can leave stock negative,
            /// and accepted adjustments sum exactly into the stock.
            #[test]
            fn stock_never_negative(initial in 0i64..1_000, deltas in proptest::collection::vec(-200i64..200, 0..50)) {
                let mut p = creado(initial);
                let mut expected = initial;

                for delta in deltas {
                    match p.execute(&ajuste(delta)) {
                        Ok(_) => expected += delta,
                        Err(_) => {}
                    }
                    prop_assert!(p.stock >= 0);
                    prop_assert_eq!(p.stock, expected);
                }
            }

            /// Property: handle is pure (state unchanged, same events for same command).
            #[test]
            fn handle_is_deterministic(initial in 0i64..1_000, delta in -500i64..500) {
                let p = creado(initial);
                let before = p.clone();
                let cmd = ajuste(delta);
                let a = p.handle(&cmd);
                let b = p.handle(&cmd);
                prop_assert_eq!(&p, &before);
                prop_assert_eq!(a, b);
            }
        }
    }
}
