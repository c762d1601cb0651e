//! Stock ledger domain module.
//!
//! Entradas (inbound invoice lines) and salidas (outbound dispatches) are
//! `Movimiento` aggregates. Their events describe the stock effects the
//! dispatcher applies to products; this crate does no IO.

pub mod invoice;
pub mod ledger;
pub mod movement;

pub use invoice::{
    Duplicado, Factura, LineaEntrada, agrupar_facturas, buscar_facturas, consolidar_lineas,
    detectar_duplicados,
};
pub use ledger::{Asiento, MovimientoFilter, activos, anulados, por_tipo, saldo_por_producto, stock_inicial};
pub use movement::{
    AnularMovimiento, CantidadEditada, EditarCantidad, EditarProducto, Movimiento,
    MovimientoAnulado, MovimientoCommand, MovimientoEvent, MovimientoRegistrado, ProductoCambiado,
    RegistrarEntrada, RegistrarSalida, StockEffect, TipoMovimiento, DESCRIPCION_SALIDA_POR_DEFECTO,
};
