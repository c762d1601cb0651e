use chrono::NaiveDate;
use serde::Serialize;
use serde_json::json;

use pescaderia_core::{MovimientoId, ProductoId};
use pescaderia_inventory::{
    Asiento, DESCRIPCION_SALIDA_POR_DEFECTO, Factura, LineaEntrada, TipoMovimiento, activos,
    agrupar_facturas, anulados, consolidar_lineas, detectar_duplicados, por_tipo,
};

use crate::error::{ClientError, ClientResult};
use crate::http::ApiClient;
use crate::model::{FacturaResumen, Movimiento};
use crate::productos::Productos;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntradaInput {
    pub numero_factura: i64,
    pub fecha: NaiveDate,
    pub producto_id: ProductoId,
    pub descripcion: String,
    pub cantidad: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalidaInput {
    pub fecha: NaiveDate,
    pub producto_id: ProductoId,
    pub descripcion: Option<String>,
    pub cantidad: i64,
}

/// A multi-line invoice as drafted by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacturaInput {
    pub numero_factura: i64,
    pub fecha: NaiveDate,
    pub descripcion: String,
    pub lineas: Vec<LineaEntrada>,
}

#[derive(Debug, Serialize)]
struct EntradaBody<'a> {
    producto_id: ProductoId,
    numero_factura: i64,
    fecha: NaiveDate,
    descripcion: &'a str,
    cantidad: i64,
}

#[derive(Debug, Serialize)]
struct SalidaBody<'a> {
    fecha: NaiveDate,
    producto_id: ProductoId,
    descripcion: &'a str,
    cantidad: i64,
}

fn validar_entrada(input: &EntradaInput) -> ClientResult<()> {
    if input.numero_factura <= 0 {
        return Err(ClientError::validation("Número de factura inválido"));
    }
    if !input.producto_id.is_valid() {
        return Err(ClientError::validation("Producto no seleccionado"));
    }
    if input.descripcion.trim().is_empty() {
        return Err(ClientError::validation("Descripción requerida"));
    }
    if input.cantidad <= 0 {
        return Err(ClientError::validation("Cantidad debe ser mayor a 0"));
    }
    Ok(())
}

fn validar_salida(input: &SalidaInput) -> ClientResult<()> {
    if !input.producto_id.is_valid() {
        return Err(ClientError::validation("Producto no seleccionado"));
    }
    if input.cantidad <= 0 {
        return Err(ClientError::validation("Cantidad debe ser mayor a 0"));
    }
    Ok(())
}

fn validar_factura(input: &FacturaInput) -> ClientResult<()> {
    if input.numero_factura <= 0 {
        return Err(ClientError::validation("Número de factura inválido"));
    }
    if input.descripcion.trim().is_empty() {
        return Err(ClientError::validation("Descripción requerida"));
    }
    if input.lineas.is_empty() {
        return Err(ClientError::validation("Debes agregar al menos un producto"));
    }
    if input.lineas.iter().any(|l| !l.producto_id.is_valid()) {
        return Err(ClientError::validation("Todos los productos deben estar seleccionados"));
    }
    if input.lineas.iter().any(|l| l.cantidad <= 0) {
        return Err(ClientError::validation("Todas las cantidades deben ser mayores a 0"));
    }
    Ok(())
}

/// Cached stock ledger.
///
/// When built [`with_productos`](Self::with_productos), every mutation also
/// refreshes the product cache, since stock changed server-side.
#[derive(Debug, Clone)]
pub struct Movimientos {
    api: ApiClient,
    cache: Vec<Movimiento>,
    productos: Option<Productos>,
}

impl Movimientos {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            cache: Vec::new(),
            productos: None,
        }
    }

    pub fn with_productos(mut self, productos: Productos) -> Self {
        self.productos = Some(productos);
        self
    }

    pub fn lista(&self) -> &[Movimiento] {
        &self.cache
    }

    pub fn productos(&self) -> Option<&Productos> {
        self.productos.as_ref()
    }

    pub async fn fetch(&mut self) -> ClientResult<&[Movimiento]> {
        self.cache = self.api.get("/movimientos", "Error al cargar movimientos").await?;
        Ok(&self.cache)
    }

    async fn refrescar(&mut self) -> ClientResult<()> {
        self.fetch().await?;
        if let Some(productos) = self.productos.as_mut() {
            productos.fetch().await?;
        }
        Ok(())
    }

    /// Refresh after a failed request chain. The chain's error is what the
    /// caller needs, so a refresh failure is only logged.
    async fn refrescar_tras_fallo(&mut self) {
        if let Err(e) = self.refrescar().await {
            tracing::warn!(error = %e, "cache refresh after failure did not complete");
        }
    }

    async fn post_entrada(&self, input: &EntradaInput) -> ClientResult<Movimiento> {
        validar_entrada(input)?;
        let body = EntradaBody {
            producto_id: input.producto_id,
            numero_factura: input.numero_factura,
            fecha: input.fecha,
            descripcion: input.descripcion.trim(),
            cantidad: input.cantidad.saturating_abs().max(1),
        };
        self.api
            .post("/movimientos/entrada", &body, "Error al crear entrada")
            .await
    }

    pub async fn create_entrada(&mut self, input: &EntradaInput) -> ClientResult<Movimiento> {
        let creado = self.post_entrada(input).await?;
        self.refrescar().await?;
        Ok(creado)
    }

    pub async fn create_salida(&mut self, input: &SalidaInput) -> ClientResult<Movimiento> {
        validar_salida(input)?;
        let descripcion = input
            .descripcion
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or(DESCRIPCION_SALIDA_POR_DEFECTO);
        let body = SalidaBody {
            fecha: input.fecha,
            producto_id: input.producto_id,
            descripcion,
            cantidad: input.cantidad.saturating_abs(),
        };
        let creado = self
            .api
            .post("/movimientos/salida", &body, "Error al crear salida")
            .await?;
        self.refrescar().await?;
        Ok(creado)
    }

    async fn put_anular(&self, id: MovimientoId) -> ClientResult<Movimiento> {
        self.api
            .put::<(), _>(&format!("/movimientos/{id}/cancelar"), None, "Error al anular movimiento")
            .await
    }

    pub async fn anular(&mut self, id: MovimientoId) -> ClientResult<Movimiento> {
        let anulado = self.put_anular(id).await?;
        self.refrescar().await?;
        Ok(anulado)
    }

    pub async fn editar_cantidad(&mut self, id: MovimientoId, cantidad: i64) -> ClientResult<Movimiento> {
        let editado = self
            .api
            .put(
                &format!("/movimientos/{id}/editar-cantidad"),
                Some(&json!({ "cantidad": cantidad.saturating_abs() })),
                "Error al editar cantidad",
            )
            .await?;
        self.refrescar().await?;
        Ok(editado)
    }

    pub async fn editar_producto(
        &mut self,
        id: MovimientoId,
        producto_id: ProductoId,
        cantidad: i64,
    ) -> ClientResult<Movimiento> {
        let editado = self
            .api
            .put(
                &format!("/movimientos/{id}/editar-producto"),
                Some(&json!({ "producto_id": producto_id, "cantidad": cantidad.saturating_abs() })),
                "Error al editar producto",
            )
            .await?;
        self.refrescar().await?;
        Ok(editado)
    }

    /// Post every line of a drafted invoice, one request at a time.
    ///
    /// Lines repeating a product fail with [`ClientError::Duplicados`] unless
    /// `consolidar` is set, in which case they are merged first. A failure
    /// midway leaves the earlier lines registered; the caches are refreshed
    /// either way.
    pub async fn registrar_factura(&mut self, input: &FacturaInput, consolidar: bool) -> ClientResult<Vec<Movimiento>> {
        validar_factura(input)?;

        let duplicados = detectar_duplicados(&input.lineas);
        let lineas = if duplicados.is_empty() {
            input.lineas.clone()
        } else if consolidar {
            consolidar_lineas(&input.lineas).map_err(|e| ClientError::validation(e.to_string()))?
        } else {
            return Err(ClientError::Duplicados(duplicados));
        };

        let mut creados = Vec::with_capacity(lineas.len());
        let mut fallo = None;
        for linea in &lineas {
            let entrada = EntradaInput {
                numero_factura: input.numero_factura,
                fecha: input.fecha,
                producto_id: linea.producto_id,
                descripcion: input.descripcion.clone(),
                cantidad: linea.cantidad,
            };
            match self.post_entrada(&entrada).await {
                Ok(m) => creados.push(m),
                Err(e) => {
                    fallo = Some(e);
                    break;
                }
            }
        }

        match fallo {
            Some(e) => {
                self.refrescar_tras_fallo().await;
                tracing::warn!(
                    numero_factura = input.numero_factura,
                    registradas = creados.len(),
                    error = %e,
                    "invoice registration stopped"
                );
                Err(e)
            }
            None => {
                self.refrescar().await?;
                Ok(creados)
            }
        }
    }

    /// Void every active line of an invoice, one request at a time.
    pub async fn anular_factura(&mut self, numero_factura: i64, fecha: NaiveDate) -> ClientResult<usize> {
        let ids: Vec<MovimientoId> = self
            .cache
            .iter()
            .filter(|m| {
                m.tipo == TipoMovimiento::Entrada
                    && m.numero_factura == Some(numero_factura)
                    && m.fecha == fecha
                    && m.estado
            })
            .map(|m| m.id)
            .collect();
        if ids.is_empty() {
            return Err(ClientError::validation("Factura no encontrada"));
        }

        let total = ids.len();
        for id in ids {
            if let Err(e) = self.put_anular(id).await {
                self.refrescar_tras_fallo().await;
                return Err(e);
            }
        }
        self.refrescar().await?;
        Ok(total)
    }

    pub fn por_tipo(&self, tipo: TipoMovimiento) -> Vec<&Movimiento> {
        por_tipo(&self.cache, tipo)
    }

    pub fn activos(&self) -> Vec<&Movimiento> {
        activos(&self.cache)
    }

    pub fn anulados(&self) -> Vec<&Movimiento> {
        anulados(&self.cache)
    }

    /// Cached entradas grouped into invoices, newest first.
    pub fn facturas(&self) -> Vec<Factura<Movimiento>> {
        agrupar_facturas(&self.cache)
    }

    /// Invoices as the server groups them (optionally filtered).
    pub async fn fetch_facturas(&self, estado: Option<bool>, q: Option<&str>) -> ClientResult<Vec<FacturaResumen>> {
        #[derive(Serialize)]
        struct Filtro<'a> {
            #[serde(skip_serializing_if = "Option::is_none")]
            estado: Option<bool>,
            #[serde(skip_serializing_if = "Option::is_none")]
            q: Option<&'a str>,
        }
        self.api
            .get_query("/movimientos/facturas", &Filtro { estado, q }, "Error al cargar facturas")
            .await
    }

    /// Net signed quantity per product across the cached active lines.
    pub fn saldo(&self, producto_id: ProductoId) -> i64 {
        self.cache
            .iter()
            .filter(|m| m.activo() && m.producto_id == producto_id)
            .map(|m| m.cantidad)
            .fold(0, i64::saturating_add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fecha() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 10).unwrap()
    }

    fn linea(producto: i64, cantidad: i64) -> LineaEntrada {
        LineaEntrada {
            producto_id: ProductoId::new(producto),
            cantidad,
        }
    }

    #[test]
    fn entrada_checks_run_in_form_order() {
        let ok = EntradaInput {
            numero_factura: 10,
            fecha: fecha(),
            producto_id: ProductoId::new(1),
            descripcion: "Puerto".into(),
            cantidad: 3,
        };
        assert!(validar_entrada(&ok).is_ok());

        let err = validar_entrada(&EntradaInput { numero_factura: 0, producto_id: ProductoId::new(0), ..ok.clone() })
            .unwrap_err();
        assert_eq!(err.to_string(), "Número de factura inválido");

        let err = validar_entrada(&EntradaInput { descripcion: " ".into(), ..ok.clone() }).unwrap_err();
        assert_eq!(err.to_string(), "Descripción requerida");

        let err = validar_entrada(&EntradaInput { cantidad: 0, ..ok }).unwrap_err();
        assert_eq!(err.to_string(), "Cantidad debe ser mayor a 0");
    }

    #[test]
    fn salida_requires_product_and_quantity() {
        let ok = SalidaInput {
            fecha: fecha(),
            producto_id: ProductoId::new(2),
            descripcion: None,
            cantidad: 1,
        };
        assert!(validar_salida(&ok).is_ok());
        assert!(validar_salida(&SalidaInput { producto_id: ProductoId::new(0), ..ok.clone() }).is_err());
        assert!(validar_salida(&SalidaInput { cantidad: -4, ..ok }).is_err());
    }

    #[test]
    fn factura_checks_every_line() {
        let ok = FacturaInput {
            numero_factura: 7,
            fecha: fecha(),
            descripcion: "Mayorista".into(),
            lineas: vec![linea(1, 2), linea(2, 5)],
        };
        assert!(validar_factura(&ok).is_ok());

        let vacia = FacturaInput { lineas: vec![], ..ok.clone() };
        assert_eq!(validar_factura(&vacia).unwrap_err().to_string(), "Debes agregar al menos un producto");

        let sin_producto = FacturaInput { lineas: vec![linea(0, 2)], ..ok.clone() };
        assert_eq!(
            validar_factura(&sin_producto).unwrap_err().to_string(),
            "Todos los productos deben estar seleccionados"
        );

        let sin_cantidad = FacturaInput { lineas: vec![linea(1, 0)], ..ok };
        assert_eq!(
            validar_factura(&sin_cantidad).unwrap_err().to_string(),
            "Todas las cantidades deben ser mayores a 0"
        );
    }
}
