//! Product catalog domain module.
//!
//! Business rules for products and their stock, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage).

pub mod catalog;
pub mod product;

pub use catalog::{DEFAULT_LOW_STOCK_LIMIT, buscar, con_stock_bajo, por_codigo, por_id};
pub use product::{
    ActualizarProducto, AjustarStock, CrearProducto, EliminarProducto, Producto,
    ProductoActualizado, ProductoCommand, ProductoCreado, ProductoEliminado, ProductoEvent,
    StockAjustado, UnidadMedida,
};
