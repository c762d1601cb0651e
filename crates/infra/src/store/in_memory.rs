use std::collections::{BTreeMap, HashSet};
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use pescaderia_auth::User;
use pescaderia_core::{AggregateRoot, ExpectedVersion, MovimientoId, ProductoId, UserId};
use pescaderia_inventory::{Movimiento, MovimientoFilter};
use pescaderia_products::Producto;

use super::{LedgerCommit, MovimientoStore, ProductoStore, StoreError, StoreResult, UserStore};

#[derive(Debug, Default)]
struct State {
    users: BTreeMap<UserId, User>,
    productos: BTreeMap<ProductoId, Producto>,
    movimientos: BTreeMap<MovimientoId, Movimiento>,
    next_user: i64,
    next_producto: i64,
    next_movimiento: i64,
}

impl State {
    fn check_producto(&self, id: ProductoId, expected: ExpectedVersion) -> StoreResult<()> {
        let actual = self.productos.get(&id).map(|p| p.version());
        if !expected.matches(actual) {
            return Err(StoreError::Concurrency(format!(
                "producto {id}: expected {expected:?}, found {actual:?}"
            )));
        }
        Ok(())
    }

    fn check_codigo(&self, producto: &Producto) -> StoreResult<()> {
        let taken = self
            .productos
            .values()
            .any(|p| p.codigo == producto.codigo && p.id != producto.id);
        if taken {
            return Err(StoreError::Duplicate(format!("codigo {}", producto.codigo)));
        }
        Ok(())
    }
}

/// In-memory store.
///
/// Intended for tests/dev. A single lock guards all tables, so every commit is
/// trivially atomic.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<std::sync::RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl UserStore for InMemoryStore {
    async fn insert_user(&self, email: &str, password_hash: &str, now: DateTime<Utc>) -> StoreResult<User> {
        let mut state = self.write()?;
        if state.users.values().any(|u| u.email == email) {
            return Err(StoreError::Duplicate(format!("email {email}")));
        }
        state.next_user += 1;
        let user = User {
            id: UserId::new(state.next_user),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: now,
            updated_at: now,
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.read()?.users.values().find(|u| u.email == email).cloned())
    }

    async fn user_by_id(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.read()?.users.get(&id).cloned())
    }
}

#[async_trait::async_trait]
impl ProductoStore for InMemoryStore {
    async fn next_producto_id(&self) -> StoreResult<ProductoId> {
        let mut state = self.write()?;
        state.next_producto += 1;
        Ok(ProductoId::new(state.next_producto))
    }

    async fn load_producto(&self, id: ProductoId) -> StoreResult<Option<Producto>> {
        Ok(self.read()?.productos.get(&id).cloned())
    }

    async fn producto_by_codigo(&self, codigo: i64) -> StoreResult<Option<Producto>> {
        Ok(self.read()?.productos.values().find(|p| p.codigo == codigo).cloned())
    }

    async fn list_productos(&self) -> StoreResult<Vec<Producto>> {
        let mut productos: Vec<Producto> = self.read()?.productos.values().cloned().collect();
        productos.sort_by_key(|p| (p.codigo, p.id));
        Ok(productos)
    }

    async fn save_producto(&self, producto: &Producto, expected: ExpectedVersion) -> StoreResult<()> {
        let mut state = self.write()?;
        state.check_producto(producto.id, expected)?;
        state.check_codigo(producto)?;
        state.productos.insert(producto.id, producto.clone());
        Ok(())
    }

    async fn delete_producto(&self, id: ProductoId, expected: ExpectedVersion) -> StoreResult<()> {
        let mut state = self.write()?;
        state.check_producto(id, expected)?;
        state.productos.remove(&id);
        Ok(())
    }
}

#[async_trait::async_trait]
impl MovimientoStore for InMemoryStore {
    async fn next_movimiento_id(&self) -> StoreResult<MovimientoId> {
        let mut state = self.write()?;
        state.next_movimiento += 1;
        Ok(MovimientoId::new(state.next_movimiento))
    }

    async fn load_movimiento(&self, id: MovimientoId) -> StoreResult<Option<Movimiento>> {
        Ok(self.read()?.movimientos.get(&id).cloned())
    }

    async fn list_movimientos(&self, filter: &MovimientoFilter) -> StoreResult<Vec<Movimiento>> {
        let mut movimientos: Vec<Movimiento> = self
            .read()?
            .movimientos
            .values()
            .filter(|m| filter.matches(*m))
            .cloned()
            .collect();
        movimientos.sort_by(|a, b| b.fecha.cmp(&a.fecha).then(b.id.cmp(&a.id)));
        Ok(movimientos)
    }

    async fn has_movimientos(&self, producto_id: ProductoId) -> StoreResult<bool> {
        Ok(self
            .read()?
            .movimientos
            .values()
            .any(|m| m.producto_id == producto_id))
    }

    async fn commit_ledger(&self, commit: LedgerCommit) -> StoreResult<()> {
        let mut state = self.write()?;

        // Validate everything before touching any table.
        let actual = state.movimientos.get(&commit.movimiento.id).map(|m| m.version());
        if !commit.expected.matches(actual) {
            return Err(StoreError::Concurrency(format!(
                "movimiento {}: expected {:?}, found {actual:?}",
                commit.movimiento.id, commit.expected
            )));
        }
        let mut seen = HashSet::new();
        for (producto, expected) in &commit.productos {
            if !seen.insert(producto.id) {
                return Err(StoreError::Backend(format!(
                    "producto {} appears twice in one commit",
                    producto.id
                )));
            }
            if *expected == ExpectedVersion::New {
                return Err(StoreError::Backend("ledger commits cannot create products".to_string()));
            }
            state.check_producto(producto.id, *expected)?;
        }

        for (producto, _) in commit.productos {
            state.productos.insert(producto.id, producto);
        }
        state.movimientos.insert(commit.movimiento.id, commit.movimiento);
        Ok(())
    }
}
