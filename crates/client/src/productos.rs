use serde::Serialize;

use pescaderia_core::ProductoId;
use pescaderia_products::{DEFAULT_LOW_STOCK_LIMIT, UnidadMedida};

use crate::error::{ClientError, ClientResult};
use crate::http::ApiClient;
use crate::model::Producto;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductoInput {
    pub codigo: i64,
    pub descripcion: String,
    pub stock: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tipo_cantidad: Option<UnidadMedida>,
}

impl ProductoInput {
    fn validate(&self) -> ClientResult<()> {
        if self.codigo == 0 {
            return Err(ClientError::validation("El código es obligatorio"));
        }
        if self.descripcion.trim().is_empty() {
            return Err(ClientError::validation("La descripción es obligatoria"));
        }
        if self.stock < 0 {
            return Err(ClientError::validation("El stock no puede ser negativo"));
        }
        Ok(())
    }
}

/// Partial update; `None` fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProductoUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codigo: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descripcion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tipo_cantidad: Option<UnidadMedida>,
}

#[derive(Debug, Serialize)]
struct Filtro<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    q: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stock_max: Option<i64>,
}

/// Cached product catalog.
#[derive(Debug, Clone)]
pub struct Productos {
    api: ApiClient,
    cache: Vec<Producto>,
}

impl Productos {
    pub fn new(api: ApiClient) -> Self {
        Self { api, cache: Vec::new() }
    }

    pub fn lista(&self) -> &[Producto] {
        &self.cache
    }

    pub async fn fetch(&mut self) -> ClientResult<&[Producto]> {
        self.cache = self.api.get("/productos", "Error al cargar productos").await?;
        Ok(&self.cache)
    }

    /// Server-side search; does not touch the cache.
    pub async fn buscar(&self, q: Option<&str>, stock_max: Option<i64>) -> ClientResult<Vec<Producto>> {
        self.api
            .get_query("/productos", &Filtro { q, stock_max }, "Error al cargar productos")
            .await
    }

    pub async fn create(&mut self, input: &ProductoInput) -> ClientResult<Producto> {
        input.validate()?;
        let creado = self.api.post("/productos", input, "Error al crear producto").await?;
        self.fetch().await?;
        Ok(creado)
    }

    pub async fn update(&mut self, id: ProductoId, input: &ProductoUpdate) -> ClientResult<Producto> {
        if input.stock.is_some_and(|s| s < 0) {
            return Err(ClientError::validation("El stock no puede ser negativo"));
        }
        let actualizado = self
            .api
            .put(&format!("/productos/{id}"), Some(input), "Error al actualizar producto")
            .await?;
        self.fetch().await?;
        Ok(actualizado)
    }

    pub async fn delete(&mut self, id: ProductoId) -> ClientResult<()> {
        let _: serde_json::Value = self
            .api
            .delete(&format!("/productos/{id}"), "Error al eliminar producto")
            .await?;
        self.fetch().await?;
        Ok(())
    }

    pub fn por_codigo(&self, codigo: i64) -> Option<&Producto> {
        self.cache.iter().find(|p| p.codigo == codigo)
    }

    pub fn por_id(&self, id: ProductoId) -> Option<&Producto> {
        self.cache.iter().find(|p| p.id == id)
    }

    /// Products at or below `limite` (default [`DEFAULT_LOW_STOCK_LIMIT`]).
    pub fn con_stock_bajo(&self, limite: Option<i64>) -> Vec<&Producto> {
        let limite = limite.unwrap_or(DEFAULT_LOW_STOCK_LIMIT);
        self.cache.iter().filter(|p| p.stock <= limite).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> ProductoInput {
        ProductoInput {
            codigo: 12,
            descripcion: "Langostinos".into(),
            stock: 4,
            tipo_cantidad: Some(UnidadMedida::Cajas),
        }
    }

    #[test]
    fn local_checks_match_the_form() {
        assert!(input().validate().is_ok());

        let sin_codigo = ProductoInput { codigo: 0, ..input() };
        assert_eq!(sin_codigo.validate().unwrap_err().to_string(), "El código es obligatorio");

        let sin_descripcion = ProductoInput { descripcion: "  ".into(), ..input() };
        assert_eq!(sin_descripcion.validate().unwrap_err().to_string(), "La descripción es obligatoria");

        let negativo = ProductoInput { stock: -1, ..input() };
        assert_eq!(negativo.validate().unwrap_err().to_string(), "El stock no puede ser negativo");
    }

    #[test]
    fn update_omits_unset_fields() {
        let body = serde_json::to_value(ProductoUpdate {
            stock: Some(3),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({ "stock": 3 }));
    }
}
