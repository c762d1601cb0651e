//! Catalog queries over a loaded product list.

use pescaderia_core::ProductoId;

use crate::product::Producto;

/// Products at or below this stock are flagged as running low.
pub const DEFAULT_LOW_STOCK_LIMIT: i64 = 10;

pub fn por_codigo(productos: &[Producto], codigo: i64) -> Option<&Producto> {
    productos.iter().find(|p| p.codigo == codigo)
}

pub fn por_id(productos: &[Producto], id: ProductoId) -> Option<&Producto> {
    productos.iter().find(|p| p.id == id)
}

/// Products whose stock is `<= limite`.
pub fn con_stock_bajo(productos: &[Producto], limite: i64) -> Vec<&Producto> {
    productos.iter().filter(|p| p.stock <= limite).collect()
}

/// Case-insensitive search over codigo and descripcion. An empty term matches everything.
pub fn buscar<'a>(productos: &'a [Producto], term: &str) -> Vec<&'a Producto> {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return productos.iter().collect();
    }
    productos
        .iter()
        .filter(|p| p.codigo.to_string().contains(&term) || p.descripcion.to_lowercase().contains(&term))
        .collect()
}
