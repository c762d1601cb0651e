use std::sync::Arc;

use pescaderia_auth::Hs256JwtValidator;
use pescaderia_core::ProductoId;
use pescaderia_infra::{
    CommandDispatcher, Config, InMemoryStore, PostgresStore, ProductoStore, Store, StoreError,
    StoreResult,
};
use pescaderia_inventory::Movimiento;
use pescaderia_products::Producto;

use crate::app::dto::{self, MovimientoResponse};

/// Backend shared by every handler.
pub type SharedStore = Arc<dyn Store>;

/// Service wiring used by handlers (storage + dispatcher + token signer).
pub struct AppServices {
    pub dispatcher: CommandDispatcher<SharedStore>,
    pub jwt: Arc<Hs256JwtValidator>,
}

impl AppServices {
    pub fn new(store: SharedStore, jwt_secret: &str) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(store),
            jwt: Arc::new(Hs256JwtValidator::new(jwt_secret.as_bytes())),
        }
    }

    pub fn in_memory(jwt_secret: &str) -> Self {
        Self::new(Arc::new(InMemoryStore::new()), jwt_secret)
    }

    pub fn store(&self) -> &SharedStore {
        self.dispatcher.store()
    }

    /// Embed the referenced product into a movement response.
    pub async fn movimiento_response(&self, movimiento: Movimiento) -> StoreResult<MovimientoResponse> {
        let producto = self.store().load_producto(movimiento.producto_id).await?;
        Ok(dto::movimiento_to_response(movimiento, producto.as_ref()))
    }

    /// Like [`Self::movimiento_response`], preferring products already in hand.
    pub async fn movimiento_response_with(
        &self,
        movimiento: Movimiento,
        known: &[Producto],
    ) -> StoreResult<MovimientoResponse> {
        match known.iter().find(|p| p.id == movimiento.producto_id) {
            Some(p) => Ok(dto::movimiento_to_response(movimiento, Some(p))),
            None => self.movimiento_response(movimiento).await,
        }
    }

    /// Map a batch of movements, loading the product catalog once.
    pub async fn movimientos_response(&self, movimientos: Vec<Movimiento>) -> StoreResult<Vec<MovimientoResponse>> {
        let productos = self.store().list_productos().await?;
        Ok(movimientos
            .into_iter()
            .map(|m| {
                let producto = find(&productos, m.producto_id);
                dto::movimiento_to_response(m, producto)
            })
            .collect())
    }
}

fn find(productos: &[Producto], id: ProductoId) -> Option<&Producto> {
    productos.iter().find(|p| p.id == id)
}

/// Build the services for a process.
///
/// `DATABASE_URL` selects Postgres (schema is created on startup); otherwise
/// state lives in memory and is lost on restart.
pub async fn build_services(config: &Config) -> Result<AppServices, StoreError> {
    let store: SharedStore = match &config.database_url {
        Some(url) => {
            let store = PostgresStore::connect(url, config.db_max_connections).await?;
            tracing::info!("using postgres store");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory store");
            Arc::new(InMemoryStore::new())
        }
    };
    Ok(AppServices::new(store, &config.jwt_secret))
}
