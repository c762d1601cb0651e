//! State storage boundary.
//!
//! Aggregates are stored as their current state plus a version column. Every
//! write carries an [`ExpectedVersion`]; a mismatch is reported as
//! [`StoreError::Concurrency`] and nothing is written.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use pescaderia_auth::User;
use pescaderia_core::{ExpectedVersion, MovimientoId, ProductoId, UserId};
use pescaderia_inventory::{Movimiento, MovimientoFilter};
use pescaderia_products::Producto;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    /// A unique key is already taken (product codigo, user email).
    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One atomic change to the stock ledger: a movement plus every product whose
/// stock it touched.
#[derive(Debug, Clone)]
pub struct LedgerCommit {
    pub movimiento: Movimiento,
    pub expected: ExpectedVersion,
    pub productos: Vec<(Producto, ExpectedVersion)>,
}

#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with [`StoreError::Duplicate`] when the email is taken.
    async fn insert_user(
        &self,
        email: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<User>;

    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn user_by_id(&self, id: UserId) -> StoreResult<Option<User>>;
}

#[async_trait::async_trait]
pub trait ProductoStore: Send + Sync {
    /// Reserve a fresh id. Ids are never reused, even if the reservation is abandoned.
    async fn next_producto_id(&self) -> StoreResult<ProductoId>;

    async fn load_producto(&self, id: ProductoId) -> StoreResult<Option<Producto>>;

    async fn producto_by_codigo(&self, codigo: i64) -> StoreResult<Option<Producto>>;

    /// All products ordered by codigo.
    async fn list_productos(&self) -> StoreResult<Vec<Producto>>;

    /// Insert (`ExpectedVersion::New`) or update a product.
    async fn save_producto(&self, producto: &Producto, expected: ExpectedVersion) -> StoreResult<()>;

    async fn delete_producto(&self, id: ProductoId, expected: ExpectedVersion) -> StoreResult<()>;
}

#[async_trait::async_trait]
pub trait MovimientoStore: Send + Sync {
    async fn next_movimiento_id(&self) -> StoreResult<MovimientoId>;

    async fn load_movimiento(&self, id: MovimientoId) -> StoreResult<Option<Movimiento>>;

    /// Matching movements, newest fecha first (ties: newest id first).
    async fn list_movimientos(&self, filter: &MovimientoFilter) -> StoreResult<Vec<Movimiento>>;

    /// Whether any movement (active or voided) references the product.
    async fn has_movimientos(&self, producto_id: ProductoId) -> StoreResult<bool>;

    /// Persist a movement change and its stock effects atomically.
    async fn commit_ledger(&self, commit: LedgerCommit) -> StoreResult<()>;
}

/// Everything the service needs from a backend.
pub trait Store: UserStore + ProductoStore + MovimientoStore {}

impl<T> Store for T where T: UserStore + ProductoStore + MovimientoStore {}

#[async_trait::async_trait]
impl<S> UserStore for Arc<S>
where
    S: UserStore + ?Sized,
{
    async fn insert_user(&self, email: &str, password_hash: &str, now: DateTime<Utc>) -> StoreResult<User> {
        (**self).insert_user(email, password_hash, now).await
    }

    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        (**self).user_by_email(email).await
    }

    async fn user_by_id(&self, id: UserId) -> StoreResult<Option<User>> {
        (**self).user_by_id(id).await
    }
}

#[async_trait::async_trait]
impl<S> ProductoStore for Arc<S>
where
    S: ProductoStore + ?Sized,
{
    async fn next_producto_id(&self) -> StoreResult<ProductoId> {
        (**self).next_producto_id().await
    }

    async fn load_producto(&self, id: ProductoId) -> StoreResult<Option<Producto>> {
        (**self).load_producto(id).await
    }

    async fn producto_by_codigo(&self, codigo: i64) -> StoreResult<Option<Producto>> {
        (**self).producto_by_codigo(codigo).await
    }

    async fn list_productos(&self) -> StoreResult<Vec<Producto>> {
        (**self).list_productos().await
    }

    async fn save_producto(&self, producto: &Producto, expected: ExpectedVersion) -> StoreResult<()> {
        (**self).save_producto(producto, expected).await
    }

    async fn delete_producto(&self, id: ProductoId, expected: ExpectedVersion) -> StoreResult<()> {
        (**self).delete_producto(id, expected).await
    }
}

#[async_trait::async_trait]
impl<S> MovimientoStore for Arc<S>
where
    S: MovimientoStore + ?Sized,
{
    async fn next_movimiento_id(&self) -> StoreResult<MovimientoId> {
        (**self).next_movimiento_id().await
    }

    async fn load_movimiento(&self, id: MovimientoId) -> StoreResult<Option<Movimiento>> {
        (**self).load_movimiento(id).await
    }

    async fn list_movimientos(&self, filter: &MovimientoFilter) -> StoreResult<Vec<Movimiento>> {
        (**self).list_movimientos(filter).await
    }

    async fn has_movimientos(&self, producto_id: ProductoId) -> StoreResult<bool> {
        (**self).has_movimientos(producto_id).await
    }

    async fn commit_ledger(&self, commit: LedgerCommit) -> StoreResult<()> {
        (**self).commit_ledger(commit).await
    }
}
