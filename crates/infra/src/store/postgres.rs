//! Postgres-backed store.
//!
//! ## Error Mapping
//!
//! | SQLx error | PostgreSQL code | StoreError |
//! |------------|-----------------|------------|
//! | unique violation on `productos_codigo_key` / `usuarios_email_key` | `23505` | `Duplicate` |
//! | other unique violation (primary key) | `23505` | `Concurrency` |
//! | anything else | any | `Backend` |
//!
//! Version checks are done with `UPDATE ... WHERE version = $n`; zero affected
//! rows means someone else committed first.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use pescaderia_auth::User;
use pescaderia_core::{ExpectedVersion, MovimientoId, ProductoId, UserId};
use pescaderia_inventory::{Movimiento, MovimientoFilter, TipoMovimiento};
use pescaderia_products::{Producto, UnidadMedida};

use super::{LedgerCommit, MovimientoStore, ProductoStore, StoreError, StoreResult, UserStore};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS usuarios (
        id BIGSERIAL PRIMARY KEY,
        email TEXT NOT NULL,
        password_hash TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL,
        CONSTRAINT usuarios_email_key UNIQUE (email)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS productos (
        id BIGSERIAL PRIMARY KEY,
        codigo BIGINT NOT NULL,
        descripcion TEXT NOT NULL,
        stock BIGINT NOT NULL CHECK (stock >= 0),
        tipo_cantidad TEXT NOT NULL DEFAULT 'unidades',
        version BIGINT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL,
        CONSTRAINT productos_codigo_key UNIQUE (codigo)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS movimientos (
        id BIGSERIAL PRIMARY KEY,
        producto_id BIGINT NOT NULL REFERENCES productos(id),
        tipo TEXT NOT NULL CHECK (tipo IN ('ENTRADA', 'SALIDA')),
        numero_factura BIGINT,
        fecha DATE NOT NULL,
        descripcion TEXT NOT NULL,
        cantidad BIGINT NOT NULL,
        estado BOOLEAN NOT NULL,
        version BIGINT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS movimientos_producto_idx ON movimientos (producto_id)",
    "CREATE INDEX IF NOT EXISTS movimientos_fecha_idx ON movimientos (fecha DESC, id DESC)",
];

const PRODUCTO_COLUMNS: &str =
    "id, codigo, descripcion, stock, tipo_cantidad, version, created_at, updated_at";

const MOVIMIENTO_COLUMNS: &str = "id, producto_id, tipo, numero_factura, fecha, descripcion, \
     cantidad, estado, version, created_at, updated_at";

/// Postgres-backed store.
///
/// Thread-safe: all access goes through the SQLx connection pool. Each
/// ledger commit runs in its own transaction.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Connect and bootstrap the schema.
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Create tables and indexes if they do not exist.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("migrate", e))?;
        }
        tracing::info!("database schema ready");
        Ok(())
    }
}

#[async_trait::async_trait]
impl UserStore for PostgresStore {
    #[instrument(skip(self, password_hash), err)]
    async fn insert_user(&self, email: &str, password_hash: &str, now: DateTime<Utc>) -> StoreResult<User> {
        let row = sqlx::query(
            r#"
            INSERT INTO usuarios (email, password_hash, created_at, updated_at)
            VALUES ($1, $2, $3, $3)
            RETURNING id, email, password_hash, created_at, updated_at
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .bind(now)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_user", e))?;

        user_from_row(&row)
    }

    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query(
            "SELECT id, email, password_hash, created_at, updated_at FROM usuarios WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("user_by_email", e))?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn user_by_id(&self, id: UserId) -> StoreResult<Option<User>> {
        let row = sqlx::query(
            "SELECT id, email, password_hash, created_at, updated_at FROM usuarios WHERE id = $1",
        )
        .bind(id.get())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("user_by_id", e))?;

        row.as_ref().map(user_from_row).transpose()
    }
}

#[async_trait::async_trait]
impl ProductoStore for PostgresStore {
    async fn next_producto_id(&self) -> StoreResult<ProductoId> {
        let id: i64 = sqlx::query_scalar("SELECT nextval(pg_get_serial_sequence('productos', 'id'))")
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("next_producto_id", e))?;
        Ok(ProductoId::new(id))
    }

    async fn load_producto(&self, id: ProductoId) -> StoreResult<Option<Producto>> {
        let row = sqlx::query(&format!("SELECT {PRODUCTO_COLUMNS} FROM productos WHERE id = $1"))
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_producto", e))?;

        row.as_ref().map(producto_from_row).transpose()
    }

    async fn producto_by_codigo(&self, codigo: i64) -> StoreResult<Option<Producto>> {
        let row = sqlx::query(&format!("SELECT {PRODUCTO_COLUMNS} FROM productos WHERE codigo = $1"))
            .bind(codigo)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("producto_by_codigo", e))?;

        row.as_ref().map(producto_from_row).transpose()
    }

    async fn list_productos(&self) -> StoreResult<Vec<Producto>> {
        let rows = sqlx::query(&format!("SELECT {PRODUCTO_COLUMNS} FROM productos ORDER BY codigo, id"))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_productos", e))?;

        rows.iter().map(producto_from_row).collect()
    }

    #[instrument(skip(self, producto), fields(producto_id = %producto.id), err)]
    async fn save_producto(&self, producto: &Producto, expected: ExpectedVersion) -> StoreResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        write_producto(&mut tx, producto, expected).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    #[instrument(skip(self), err)]
    async fn delete_producto(&self, id: ProductoId, expected: ExpectedVersion) -> StoreResult<()> {
        let result = match expected {
            ExpectedVersion::Exact(v) => {
                sqlx::query("DELETE FROM productos WHERE id = $1 AND version = $2")
                    .bind(id.get())
                    .bind(v as i64)
                    .execute(&*self.pool)
                    .await
            }
            _ => {
                sqlx::query("DELETE FROM productos WHERE id = $1")
                    .bind(id.get())
                    .execute(&*self.pool)
                    .await
            }
        }
        .map_err(|e| map_sqlx_error("delete_producto", e))?;

        if result.rows_affected() == 0 && expected != ExpectedVersion::Any {
            return Err(StoreError::Concurrency(format!(
                "producto {id}: expected {expected:?}, row changed or missing"
            )));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl MovimientoStore for PostgresStore {
    async fn next_movimiento_id(&self) -> StoreResult<MovimientoId> {
        let id: i64 = sqlx::query_scalar("SELECT nextval(pg_get_serial_sequence('movimientos', 'id'))")
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("next_movimiento_id", e))?;
        Ok(MovimientoId::new(id))
    }

    async fn load_movimiento(&self, id: MovimientoId) -> StoreResult<Option<Movimiento>> {
        let row = sqlx::query(&format!("SELECT {MOVIMIENTO_COLUMNS} FROM movimientos WHERE id = $1"))
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_movimiento", e))?;

        row.as_ref().map(movimiento_from_row).transpose()
    }

    async fn list_movimientos(&self, filter: &MovimientoFilter) -> StoreResult<Vec<Movimiento>> {
        let sql = format!(
            r#"
            SELECT {MOVIMIENTO_COLUMNS}
            FROM movimientos
            WHERE ($1::text IS NULL OR tipo = $1)
                AND ($2::boolean IS NULL OR estado = $2)
                AND ($3::bigint IS NULL OR producto_id = $3)
                AND ($4::bigint IS NULL OR numero_factura = $4)
                AND ($5::date IS NULL OR fecha >= $5)
                AND ($6::date IS NULL OR fecha <= $6)
            ORDER BY fecha DESC, id DESC
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(filter.tipo.map(|t| t.as_str()))
            .bind(filter.estado)
            .bind(filter.producto_id.map(|p| p.get()))
            .bind(filter.numero_factura)
            .bind(filter.desde)
            .bind(filter.hasta)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_movimientos", e))?;

        rows.iter().map(movimiento_from_row).collect()
    }

    async fn has_movimientos(&self, producto_id: ProductoId) -> StoreResult<bool> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM movimientos WHERE producto_id = $1)")
            .bind(producto_id.get())
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("has_movimientos", e))
    }

    #[instrument(
        skip(self, commit),
        fields(movimiento_id = %commit.movimiento.id, productos = commit.productos.len()),
        err
    )]
    async fn commit_ledger(&self, commit: LedgerCommit) -> StoreResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // Products first so the movement's foreign key always resolves.
        for (producto, expected) in &commit.productos {
            if *expected == ExpectedVersion::New {
                return Err(StoreError::Backend("ledger commits cannot create products".to_string()));
            }
            write_producto(&mut tx, producto, *expected).await?;
        }
        write_movimiento(&mut tx, &commit.movimiento, commit.expected).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}

async fn write_producto(
    tx: &mut Transaction<'_, Postgres>,
    p: &Producto,
    expected: ExpectedVersion,
) -> StoreResult<()> {
    if expected == ExpectedVersion::New {
        sqlx::query(
            r#"
            INSERT INTO productos (id, codigo, descripcion, stock, tipo_cantidad, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(p.id.get())
        .bind(p.codigo)
        .bind(&p.descripcion)
        .bind(p.stock)
        .bind(p.tipo_cantidad.as_str())
        .bind(p.version as i64)
        .bind(p.created_at)
        .bind(p.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_producto", e))?;
        return Ok(());
    }

    let expected_version = match expected {
        ExpectedVersion::Exact(v) => Some(v as i64),
        _ => None,
    };
    let result = sqlx::query(
        r#"
        UPDATE productos
        SET codigo = $2, descripcion = $3, stock = $4, tipo_cantidad = $5, version = $6, updated_at = $7
        WHERE id = $1 AND ($8::bigint IS NULL OR version = $8)
        "#,
    )
    .bind(p.id.get())
    .bind(p.codigo)
    .bind(&p.descripcion)
    .bind(p.stock)
    .bind(p.tipo_cantidad.as_str())
    .bind(p.version as i64)
    .bind(p.updated_at)
    .bind(expected_version)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("update_producto", e))?;

    if result.rows_affected() == 0 {
        return Err(StoreError::Concurrency(format!(
            "producto {}: expected {expected:?}, row changed or missing",
            p.id
        )));
    }
    Ok(())
}

async fn write_movimiento(
    tx: &mut Transaction<'_, Postgres>,
    m: &Movimiento,
    expected: ExpectedVersion,
) -> StoreResult<()> {
    if expected == ExpectedVersion::New {
        sqlx::query(
            r#"
            INSERT INTO movimientos (id, producto_id, tipo, numero_factura, fecha, descripcion, cantidad, estado, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(m.id.get())
        .bind(m.producto_id.get())
        .bind(m.tipo.as_str())
        .bind(m.numero_factura)
        .bind(m.fecha)
        .bind(&m.descripcion)
        .bind(m.cantidad)
        .bind(m.estado)
        .bind(m.version as i64)
        .bind(m.created_at)
        .bind(m.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_movimiento", e))?;
        return Ok(());
    }

    let expected_version = match expected {
        ExpectedVersion::Exact(v) => Some(v as i64),
        _ => None,
    };
    let result = sqlx::query(
        r#"
        UPDATE movimientos
        SET producto_id = $2, cantidad = $3, estado = $4, version = $5, updated_at = $6
        WHERE id = $1 AND ($7::bigint IS NULL OR version = $7)
        "#,
    )
    .bind(m.id.get())
    .bind(m.producto_id.get())
    .bind(m.cantidad)
    .bind(m.estado)
    .bind(m.version as i64)
    .bind(m.updated_at)
    .bind(expected_version)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("update_movimiento", e))?;

    if result.rows_affected() == 0 {
        return Err(StoreError::Concurrency(format!(
            "movimiento {}: expected {expected:?}, row changed or missing",
            m.id
        )));
    }
    Ok(())
}

fn decode<T>(row: &PgRow, column: &str) -> StoreResult<T>
where
    T: for<'r> sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Backend(format!("failed to read column {column}: {e}")))
}

fn user_from_row(row: &PgRow) -> StoreResult<User> {
    Ok(User {
        id: UserId::new(decode(row, "id")?),
        email: decode(row, "email")?,
        password_hash: decode(row, "password_hash")?,
        created_at: decode(row, "created_at")?,
        updated_at: decode(row, "updated_at")?,
    })
}

fn producto_from_row(row: &PgRow) -> StoreResult<Producto> {
    let tipo_cantidad: String = decode(row, "tipo_cantidad")?;
    let tipo_cantidad: UnidadMedida = tipo_cantidad
        .parse()
        .map_err(|e| StoreError::Backend(format!("invalid tipo_cantidad in row: {e}")))?;
    let version: i64 = decode(row, "version")?;

    let mut p = Producto::empty(ProductoId::new(decode(row, "id")?));
    p.codigo = decode(row, "codigo")?;
    p.descripcion = decode(row, "descripcion")?;
    p.stock = decode(row, "stock")?;
    p.tipo_cantidad = tipo_cantidad;
    p.created_at = decode(row, "created_at")?;
    p.updated_at = decode(row, "updated_at")?;
    p.version = version as u64;
    p.created = true;
    Ok(p)
}

fn movimiento_from_row(row: &PgRow) -> StoreResult<Movimiento> {
    let tipo: String = decode(row, "tipo")?;
    let tipo: TipoMovimiento = tipo
        .parse()
        .map_err(|e| StoreError::Backend(format!("invalid tipo in row: {e}")))?;
    let fecha: NaiveDate = decode(row, "fecha")?;
    let version: i64 = decode(row, "version")?;

    let mut m = Movimiento::empty(MovimientoId::new(decode(row, "id")?));
    m.producto_id = ProductoId::new(decode(row, "producto_id")?);
    m.tipo = tipo;
    m.numero_factura = decode(row, "numero_factura")?;
    m.fecha = fecha;
    m.descripcion = decode(row, "descripcion")?;
    m.cantidad = decode(row, "cantidad")?;
    m.estado = decode(row, "estado")?;
    m.created_at = decode(row, "created_at")?;
    m.updated_at = decode(row, "updated_at")?;
    m.version = version as u64;
    m.created = true;
    Ok(m)
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            if db_err.code().as_deref() == Some("23505") {
                match db_err.constraint() {
                    Some("productos_codigo_key") | Some("usuarios_email_key") => {
                        StoreError::Duplicate(msg)
                    }
                    _ => StoreError::Concurrency(msg),
                }
            } else {
                StoreError::Backend(msg)
            }
        }
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {operation}")),
        other => StoreError::Backend(format!("{operation}: {other}")),
    }
}
