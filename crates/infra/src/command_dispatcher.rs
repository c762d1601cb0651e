//! Command execution pipeline (application-level orchestration).
//!
//! ```text
//! Command
//!   ↓
//! 1. Load current state (aggregate row + version)
//!   ↓
//! 2. Handle command (pure decision logic, produces events)
//!   ↓
//! 3. Apply events; for movements, derive stock effects and run
//!    `AjustarStock` on every affected product
//!   ↓
//! 4. Commit everything atomically against the loaded versions
//!   ↓
//! 5. On a version conflict, reload and retry (bounded)
//! ```
//!
//! Domain crates never see the store; uniqueness checks and cross-aggregate
//! effects live here.

use chrono::Utc;
use thiserror::Error;

use pescaderia_core::{
    Aggregate, AggregateRoot, DomainError, Event, ExpectedVersion, MovimientoId, ProductoId,
};
use pescaderia_inventory::{Movimiento, MovimientoCommand, MovimientoEvent, StockEffect};
use pescaderia_products::{AjustarStock, Producto, ProductoCommand};

use crate::store::{LedgerCommit, Store, StoreError};

/// Attempts per command before a version conflict is reported to the caller.
pub const MAX_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    InvariantViolation(String),

    #[error("{0}")]
    NotFound(String),

    /// Business conflict (duplicate codigo, already voided, product in use).
    #[error("{0}")]
    Conflict(String),

    /// Optimistic concurrency failure that survived every retry.
    #[error("concurrent modification: {0}")]
    Concurrency(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::NotFound(msg) => DispatchError::NotFound(msg),
            DomainError::Conflict(msg) => DispatchError::Conflict(msg),
            DomainError::Unauthorized(msg) => DispatchError::Unauthorized(msg),
        }
    }
}

impl From<StoreError> for DispatchError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl DispatchError {
    fn is_retryable(&self) -> bool {
        matches!(self, DispatchError::Concurrency(_))
    }
}

/// State of a movement and the products it touched after a successful commit.
#[derive(Debug, Clone)]
pub struct LedgerOutcome {
    pub movimiento: Movimiento,
    pub productos: Vec<Producto>,
    pub events: Vec<MovimientoEvent>,
}

/// Runs product and movement commands against a [`Store`].
#[derive(Debug, Clone)]
pub struct CommandDispatcher<S> {
    store: S,
}

impl<S> CommandDispatcher<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

fn codigo_duplicado(codigo: i64) -> DispatchError {
    DispatchError::Conflict(format!("Ya existe un producto con el código {codigo}"))
}

impl<S: Store> CommandDispatcher<S> {
    /// Execute a catalog command. Returns the resulting product (for
    /// `Eliminar`, its last state before removal).
    pub async fn dispatch_producto(&self, command: ProductoCommand) -> Result<Producto, DispatchError> {
        let mut attempt = 1;
        loop {
            match self.try_producto(&command).await {
                Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                    tracing::warn!(attempt, error = %e, "producto command conflicted, retrying");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn try_producto(&self, command: &ProductoCommand) -> Result<Producto, DispatchError> {
        let id = producto_target(command);
        let mut producto = match self.store.load_producto(id).await? {
            Some(p) => p,
            None => Producto::empty(id),
        };
        let expected = ExpectedVersion::loaded_at(producto.version());

        let events = producto.handle(command)?;
        if events.is_empty() {
            return Ok(producto);
        }

        if let ProductoCommand::Crear(cmd) = command {
            self.ensure_codigo_libre(cmd.codigo, id).await?;
        }
        if let ProductoCommand::Actualizar(cmd) = command {
            if let Some(codigo) = cmd.codigo.filter(|c| *c != producto.codigo) {
                self.ensure_codigo_libre(codigo, id).await?;
            }
        }
        if let ProductoCommand::Eliminar(_) = command {
            if self.store.has_movimientos(id).await? {
                return Err(DispatchError::Conflict(
                    "No se puede eliminar un producto con movimientos registrados".to_string(),
                ));
            }
        }

        for event in &events {
            producto.apply(event);
            tracing::info!(
                event_type = event.event_type(),
                producto_id = %id,
                version = producto.version(),
                "producto event"
            );
        }

        let result = if producto.eliminado {
            self.store.delete_producto(id, expected).await
        } else {
            self.store.save_producto(&producto, expected).await
        };
        match result {
            Err(StoreError::Duplicate(_)) => Err(codigo_duplicado(producto.codigo)),
            Err(e) => Err(e.into()),
            Ok(()) => Ok(producto),
        }
    }

    async fn ensure_codigo_libre(&self, codigo: i64, id: ProductoId) -> Result<(), DispatchError> {
        match self.store.producto_by_codigo(codigo).await? {
            Some(existing) if existing.id != id => Err(codigo_duplicado(codigo)),
            _ => Ok(()),
        }
    }

    /// Execute a ledger command and apply its stock effects atomically.
    pub async fn dispatch_movimiento(
        &self,
        command: MovimientoCommand,
    ) -> Result<LedgerOutcome, DispatchError> {
        let mut attempt = 1;
        loop {
            match self.try_movimiento(&command).await {
                Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                    tracing::warn!(attempt, error = %e, "movimiento command conflicted, retrying");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn try_movimiento(&self, command: &MovimientoCommand) -> Result<LedgerOutcome, DispatchError> {
        let id = command.movimiento_id();
        let mut movimiento = match self.store.load_movimiento(id).await? {
            Some(m) => m,
            None if command.is_registration() => Movimiento::empty(id),
            None => return Err(DispatchError::NotFound("Movimiento no encontrado".to_string())),
        };
        let expected = ExpectedVersion::loaded_at(movimiento.version());

        let events = movimiento.handle(command)?;
        if events.is_empty() {
            return Ok(LedgerOutcome {
                movimiento,
                productos: vec![],
                events,
            });
        }

        let effects = net_effects(events.iter().flat_map(MovimientoEvent::stock_effects))?;
        let mut touched: Vec<(Producto, ExpectedVersion)> = Vec::with_capacity(effects.len());
        for effect in &effects {
            let mut producto = self.load_producto_existente(effect.producto_id).await?;
            let loaded = ExpectedVersion::loaded_at(producto.version());
            let occurred_at = events.last().map(|e| e.occurred_at()).unwrap_or_else(Utc::now);
            producto.execute(&ProductoCommand::AjustarStock(AjustarStock {
                producto_id: effect.producto_id,
                delta: effect.delta,
                occurred_at,
            }))?;
            touched.push((producto, loaded));
        }

        // A registration or product change must point at an existing product
        // even when the net stock effect on it is zero.
        if !touched.iter().any(|(p, _)| p.id == movimiento_producto(&events, &movimiento)) {
            self.load_producto_existente(movimiento_producto(&events, &movimiento)).await?;
        }

        for event in &events {
            movimiento.apply(event);
            tracing::info!(
                event_type = event.event_type(),
                movimiento_id = %id,
                version = movimiento.version(),
                "movimiento event"
            );
        }

        self.store
            .commit_ledger(LedgerCommit {
                movimiento: movimiento.clone(),
                expected,
                productos: touched.clone(),
            })
            .await?;

        Ok(LedgerOutcome {
            movimiento,
            productos: touched.into_iter().map(|(p, _)| p).collect(),
            events,
        })
    }

    async fn load_producto_existente(&self, id: ProductoId) -> Result<Producto, DispatchError> {
        self.store
            .load_producto(id)
            .await?
            .filter(|p| p.created && !p.eliminado)
            .ok_or_else(|| DispatchError::NotFound("Producto no encontrado".to_string()))
    }

    /// Reserve an id for a new product.
    pub async fn reserve_producto_id(&self) -> Result<ProductoId, DispatchError> {
        Ok(self.store.next_producto_id().await?)
    }

    /// Reserve an id for a new movement.
    pub async fn reserve_movimiento_id(&self) -> Result<MovimientoId, DispatchError> {
        Ok(self.store.next_movimiento_id().await?)
    }
}

fn producto_target(command: &ProductoCommand) -> ProductoId {
    match command {
        ProductoCommand::Crear(c) => c.producto_id,
        ProductoCommand::Actualizar(c) => c.producto_id,
        ProductoCommand::AjustarStock(c) => c.producto_id,
        ProductoCommand::Eliminar(c) => c.producto_id,
    }
}

/// The product a movement points at once `events` are applied.
fn movimiento_producto(events: &[MovimientoEvent], actual: &Movimiento) -> ProductoId {
    events
        .iter()
        .rev()
        .find_map(|e| match e {
            MovimientoEvent::Registrado(r) => Some(r.producto_id),
            MovimientoEvent::ProductoCambiado(c) => Some(c.producto_nuevo),
            _ => None,
        })
        .unwrap_or(actual.producto_id)
}

/// Sum effects per product (first-seen order) and drop the ones that cancel out.
fn net_effects(effects: impl IntoIterator<Item = StockEffect>) -> Result<Vec<StockEffect>, DomainError> {
    let mut net: Vec<StockEffect> = Vec::new();
    for effect in effects {
        match net.iter_mut().find(|e| e.producto_id == effect.producto_id) {
            Some(e) => {
                e.delta = e
                    .delta
                    .checked_add(effect.delta)
                    .ok_or_else(|| DomainError::invariant("El ajuste de stock excede el máximo permitido"))?;
            }
            None => net.push(effect),
        }
    }
    net.retain(|e| e.delta != 0);
    Ok(net)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::{DateTime, NaiveDate};

    use pescaderia_auth::User;
    use pescaderia_core::UserId;
    use pescaderia_inventory::{
        AnularMovimiento, EditarCantidad, EditarProducto, MovimientoFilter, RegistrarEntrada,
        RegistrarSalida,
    };
    use pescaderia_products::{ActualizarProducto, CrearProducto, EliminarProducto, UnidadMedida};

    use super::*;
    use crate::store::{InMemoryStore, MovimientoStore, ProductoStore, StoreResult, UserStore};

    type Dispatcher = CommandDispatcher<Arc<InMemoryStore>>;

    fn dispatcher() -> Dispatcher {
        CommandDispatcher::new(Arc::new(InMemoryStore::new()))
    }

    fn fecha() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 10).unwrap()
    }

    async fn crear<T: Store>(d: &CommandDispatcher<T>, codigo: i64, stock: i64) -> ProductoId {
        let id = d.reserve_producto_id().await.unwrap();
        d.dispatch_producto(ProductoCommand::Crear(CrearProducto {
            producto_id: id,
            codigo,
            descripcion: format!("Producto {codigo}"),
            stock,
            tipo_cantidad: UnidadMedida::Kg,
            occurred_at: Utc::now(),
        }))
        .await
        .unwrap();
        id
    }

    async fn entrada<T: Store>(
        d: &CommandDispatcher<T>,
        producto_id: ProductoId,
        cantidad: i64,
    ) -> Result<LedgerOutcome, DispatchError> {
        let id = d.reserve_movimiento_id().await.unwrap();
        d.dispatch_movimiento(MovimientoCommand::RegistrarEntrada(RegistrarEntrada {
            movimiento_id: id,
            producto_id,
            numero_factura: 1001,
            fecha: fecha(),
            descripcion: "Proveedor".into(),
            cantidad,
            occurred_at: Utc::now(),
        }))
        .await
    }

    async fn salida(d: &Dispatcher, producto_id: ProductoId, cantidad: i64) -> Result<LedgerOutcome, DispatchError> {
        let id = d.reserve_movimiento_id().await.unwrap();
        d.dispatch_movimiento(MovimientoCommand::RegistrarSalida(RegistrarSalida {
            movimiento_id: id,
            producto_id,
            fecha: fecha(),
            descripcion: None,
            cantidad,
            occurred_at: Utc::now(),
        }))
        .await
    }

    async fn stock(d: &Dispatcher, id: ProductoId) -> i64 {
        d.store().load_producto(id).await.unwrap().unwrap().stock
    }

    fn anular(id: MovimientoId) -> MovimientoCommand {
        MovimientoCommand::Anular(AnularMovimiento {
            movimiento_id: id,
            occurred_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn entrada_and_salida_move_stock() {
        let d = dispatcher();
        let p = crear(&d, 100, 0).await;

        let out = entrada(&d, p, 20).await.unwrap();
        assert_eq!(out.movimiento.cantidad, 20);
        assert_eq!(out.productos[0].stock, 20);
        assert_eq!(stock(&d, p).await, 20);

        salida(&d, p, 8).await.unwrap();
        assert_eq!(stock(&d, p).await, 12);
    }

    #[tokio::test]
    async fn salida_beyond_stock_changes_nothing() {
        let d = dispatcher();
        let p = crear(&d, 100, 3).await;

        let err = salida(&d, p, 4).await.unwrap_err();
        assert!(matches!(err, DispatchError::InvariantViolation(_)));
        assert_eq!(stock(&d, p).await, 3);
        let todos = d.store().list_movimientos(&MovimientoFilter::default()).await.unwrap();
        assert!(todos.is_empty());
    }

    #[tokio::test]
    async fn movement_on_unknown_product_is_not_found() {
        let d = dispatcher();
        let err = entrada(&d, ProductoId::new(77), 1).await.unwrap_err();
        assert!(matches!(err, DispatchError::NotFound(_)));
    }

    #[tokio::test]
    async fn anular_reverts_stock_once() {
        let d = dispatcher();
        let p = crear(&d, 100, 10).await;
        let out = salida(&d, p, 4).await.unwrap();
        let id = out.movimiento.id;

        d.dispatch_movimiento(anular(id)).await.unwrap();
        assert_eq!(stock(&d, p).await, 10);

        let err = d.dispatch_movimiento(anular(id)).await.unwrap_err();
        assert!(matches!(err, DispatchError::Conflict(_)));
        assert_eq!(stock(&d, p).await, 10);
    }

    #[tokio::test]
    async fn voiding_a_consumed_entrada_is_refused() {
        let d = dispatcher();
        let p = crear(&d, 100, 0).await;
        let e = entrada(&d, p, 5).await.unwrap();
        salida(&d, p, 4).await.unwrap();

        let err = d.dispatch_movimiento(anular(e.movimiento.id)).await.unwrap_err();
        assert!(matches!(err, DispatchError::InvariantViolation(_)));
        assert_eq!(stock(&d, p).await, 1);
    }

    #[tokio::test]
    async fn editar_cantidad_applies_difference() {
        let d = dispatcher();
        let p = crear(&d, 100, 10).await;
        let s = salida(&d, p, 4).await.unwrap();

        d.dispatch_movimiento(MovimientoCommand::EditarCantidad(EditarCantidad {
            movimiento_id: s.movimiento.id,
            cantidad: 9,
            occurred_at: Utc::now(),
        }))
        .await
        .unwrap();
        assert_eq!(stock(&d, p).await, 1);

        let err = d
            .dispatch_movimiento(MovimientoCommand::EditarCantidad(EditarCantidad {
                movimiento_id: s.movimiento.id,
                cantidad: 11,
                occurred_at: Utc::now(),
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvariantViolation(_)));
        assert_eq!(stock(&d, p).await, 1);
    }

    #[tokio::test]
    async fn editar_producto_moves_stock_between_products() {
        let d = dispatcher();
        let a = crear(&d, 100, 0).await;
        let b = crear(&d, 200, 2).await;
        let e = entrada(&d, a, 6).await.unwrap();

        let out = d
            .dispatch_movimiento(MovimientoCommand::EditarProducto(EditarProducto {
                movimiento_id: e.movimiento.id,
                producto_id: b,
                cantidad: 5,
                occurred_at: Utc::now(),
            }))
            .await
            .unwrap();
        assert_eq!(out.movimiento.producto_id, b);
        assert_eq!(stock(&d, a).await, 0);
        assert_eq!(stock(&d, b).await, 7);
    }

    #[tokio::test]
    async fn editar_producto_same_product_nets_the_change() {
        let d = dispatcher();
        let a = crear(&d, 100, 0).await;
        let e = entrada(&d, a, 6).await.unwrap();
        salida(&d, a, 4).await.unwrap();
        assert_eq!(stock(&d, a).await, 2);

        // Reverting 6 first would go negative; the net change (-2) fits.
        d.dispatch_movimiento(MovimientoCommand::EditarProducto(EditarProducto {
            movimiento_id: e.movimiento.id,
            producto_id: a,
            cantidad: 4,
            occurred_at: Utc::now(),
        }))
        .await
        .unwrap();
        assert_eq!(stock(&d, a).await, 0);
    }

    #[tokio::test]
    async fn codigo_must_be_unique() {
        let d = dispatcher();
        let a = crear(&d, 100, 0).await;
        crear(&d, 200, 0).await;

        let id = d.reserve_producto_id().await.unwrap();
        let err = d
            .dispatch_producto(ProductoCommand::Crear(CrearProducto {
                producto_id: id,
                codigo: 100,
                descripcion: "Otra".into(),
                stock: 0,
                tipo_cantidad: UnidadMedida::Unidades,
                occurred_at: Utc::now(),
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Conflict(_)));

        let err = d
            .dispatch_producto(ProductoCommand::Actualizar(ActualizarProducto {
                producto_id: a,
                codigo: Some(200),
                descripcion: None,
                stock: None,
                tipo_cantidad: None,
                occurred_at: Utc::now(),
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Conflict(_)));
    }

    #[tokio::test]
    async fn products_with_movements_cannot_be_deleted() {
        let d = dispatcher();
        let a = crear(&d, 100, 0).await;
        let b = crear(&d, 200, 0).await;
        entrada(&d, a, 1).await.unwrap();

        let eliminar = |id| {
            ProductoCommand::Eliminar(EliminarProducto {
                producto_id: id,
                occurred_at: Utc::now(),
            })
        };
        let err = d.dispatch_producto(eliminar(a)).await.unwrap_err();
        assert!(matches!(err, DispatchError::Conflict(_)));

        d.dispatch_producto(eliminar(b)).await.unwrap();
        assert!(d.store().load_producto(b).await.unwrap().is_none());
    }

    /// Store whose first `fail` ledger commits report a concurrent write.
    struct Flaky {
        inner: InMemoryStore,
        fail: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl UserStore for Flaky {
        async fn insert_user(&self, email: &str, hash: &str, now: DateTime<Utc>) -> StoreResult<User> {
            self.inner.insert_user(email, hash, now).await
        }
        async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
            self.inner.user_by_email(email).await
        }
        async fn user_by_id(&self, id: UserId) -> StoreResult<Option<User>> {
            self.inner.user_by_id(id).await
        }
    }

    #[async_trait::async_trait]
    impl ProductoStore for Flaky {
        async fn next_producto_id(&self) -> StoreResult<ProductoId> {
            self.inner.next_producto_id().await
        }
        async fn load_producto(&self, id: ProductoId) -> StoreResult<Option<Producto>> {
            self.inner.load_producto(id).await
        }
        async fn producto_by_codigo(&self, codigo: i64) -> StoreResult<Option<Producto>> {
            self.inner.producto_by_codigo(codigo).await
        }
        async fn list_productos(&self) -> StoreResult<Vec<Producto>> {
            self.inner.list_productos().await
        }
        async fn save_producto(&self, p: &Producto, expected: ExpectedVersion) -> StoreResult<()> {
            self.inner.save_producto(p, expected).await
        }
        async fn delete_producto(&self, id: ProductoId, expected: ExpectedVersion) -> StoreResult<()> {
            self.inner.delete_producto(id, expected).await
        }
    }

    #[async_trait::async_trait]
    impl MovimientoStore for Flaky {
        async fn next_movimiento_id(&self) -> StoreResult<MovimientoId> {
            self.inner.next_movimiento_id().await
        }
        async fn load_movimiento(&self, id: MovimientoId) -> StoreResult<Option<Movimiento>> {
            self.inner.load_movimiento(id).await
        }
        async fn list_movimientos(&self, filter: &MovimientoFilter) -> StoreResult<Vec<Movimiento>> {
            self.inner.list_movimientos(filter).await
        }
        async fn has_movimientos(&self, id: ProductoId) -> StoreResult<bool> {
            self.inner.has_movimientos(id).await
        }
        async fn commit_ledger(&self, commit: LedgerCommit) -> StoreResult<()> {
            let remaining = self.fail.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail.store(remaining - 1, Ordering::SeqCst);
                return Err(StoreError::Concurrency("simulated".into()));
            }
            self.inner.commit_ledger(commit).await
        }
    }

    fn flaky(fail: usize) -> CommandDispatcher<Flaky> {
        CommandDispatcher::new(Flaky {
            inner: InMemoryStore::new(),
            fail: AtomicUsize::new(fail),
        })
    }

    #[tokio::test]
    async fn conflicts_are_retried() {
        let d = flaky(MAX_ATTEMPTS - 1);
        let p = crear(&d, 100, 0).await;
        entrada(&d, p, 3).await.unwrap();
        assert_eq!(d.store().load_producto(p).await.unwrap().unwrap().stock, 3);
    }

    #[tokio::test]
    async fn persistent_conflicts_surface() {
        let d = flaky(MAX_ATTEMPTS);
        let p = crear(&d, 100, 0).await;
        let err = entrada(&d, p, 3).await.unwrap_err();
        assert!(matches!(err, DispatchError::Concurrency(_)));
        assert_eq!(d.store().load_producto(p).await.unwrap().unwrap().stock, 0);
    }

    #[test]
    fn net_effects_merge_and_drop_zero() {
        let a = ProductoId::new(1);
        let b = ProductoId::new(2);
        let net = net_effects(vec![
            StockEffect { producto_id: a, delta: -6 },
            StockEffect { producto_id: b, delta: 2 },
            StockEffect { producto_id: a, delta: 6 },
        ])
        .unwrap();
        assert_eq!(net, vec![StockEffect { producto_id: b, delta: 2 }]);
    }

    #[test]
    fn net_effects_refuse_overflow() {
        let a = ProductoId::new(1);
        let err = net_effects(vec![
            StockEffect { producto_id: a, delta: i64::MAX },
            StockEffect { producto_id: a, delta: 1 },
        ])
        .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[tokio::test]
    async fn entrada_past_max_stock_is_refused() {
        let d = dispatcher();
        let p = crear(&d, 100, i64::MAX).await;

        let err = entrada(&d, p, 1).await.unwrap_err();
        assert!(matches!(err, DispatchError::InvariantViolation(_)));
        assert_eq!(stock(&d, p).await, i64::MAX);
    }
}
