//! Queries over a loaded movement history.
//!
//! The helpers are generic over [`Asiento`] so the same logic runs on
//! domain aggregates here and on API DTOs in the client.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use pescaderia_core::ProductoId;

use crate::movement::{Movimiento, TipoMovimiento};

/// Read-only view of a ledger line.
pub trait Asiento {
    fn producto_id(&self) -> ProductoId;
    fn tipo(&self) -> TipoMovimiento;
    fn numero_factura(&self) -> Option<i64>;
    fn fecha(&self) -> NaiveDate;
    fn descripcion(&self) -> &str;
    /// Signed quantity.
    fn cantidad(&self) -> i64;
    /// `false` once voided.
    fn activo(&self) -> bool;

    /// Codigo of the embedded product, when the line carries one.
    fn producto_codigo(&self) -> Option<i64> {
        None
    }

    /// Descripcion of the embedded product, when the line carries one.
    fn producto_descripcion(&self) -> Option<&str> {
        None
    }
}

impl Asiento for Movimiento {
    fn producto_id(&self) -> ProductoId {
        self.producto_id
    }

    fn tipo(&self) -> TipoMovimiento {
        self.tipo
    }

    fn numero_factura(&self) -> Option<i64> {
        self.numero_factura
    }

    fn fecha(&self) -> NaiveDate {
        self.fecha
    }

    fn descripcion(&self) -> &str {
        &self.descripcion
    }

    fn cantidad(&self) -> i64 {
        self.cantidad
    }

    fn activo(&self) -> bool {
        self.estado
    }
}

/// Optional filters for listing movements. Unset fields match everything;
/// `desde`/`hasta` are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovimientoFilter {
    pub tipo: Option<TipoMovimiento>,
    pub estado: Option<bool>,
    pub producto_id: Option<ProductoId>,
    pub numero_factura: Option<i64>,
    pub desde: Option<NaiveDate>,
    pub hasta: Option<NaiveDate>,
}

impl MovimientoFilter {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn matches<A: Asiento + ?Sized>(&self, asiento: &A) -> bool {
        if self.tipo.is_some_and(|t| t != asiento.tipo()) {
            return false;
        }
        if self.estado.is_some_and(|e| e != asiento.activo()) {
            return false;
        }
        if self.producto_id.is_some_and(|p| p != asiento.producto_id()) {
            return false;
        }
        if self.numero_factura.is_some() && self.numero_factura != asiento.numero_factura() {
            return false;
        }
        if self.desde.is_some_and(|d| asiento.fecha() < d) {
            return false;
        }
        if self.hasta.is_some_and(|h| asiento.fecha() > h) {
            return false;
        }
        true
    }
}

pub fn por_tipo<A: Asiento>(asientos: &[A], tipo: TipoMovimiento) -> Vec<&A> {
    asientos.iter().filter(|a| a.tipo() == tipo).collect()
}

pub fn activos<A: Asiento>(asientos: &[A]) -> Vec<&A> {
    asientos.iter().filter(|a| a.activo()).collect()
}

pub fn anulados<A: Asiento>(asientos: &[A]) -> Vec<&A> {
    asientos.iter().filter(|a| !a.activo()).collect()
}

/// Net stock contributed by active movements, per product.
pub fn saldo_por_producto<A: Asiento>(asientos: &[A]) -> BTreeMap<ProductoId, i64> {
    let mut saldos = BTreeMap::new();
    for a in asientos.iter().filter(|a| a.activo()) {
        let saldo = saldos.entry(a.producto_id()).or_insert(0i64);
        *saldo = saldo.saturating_add(a.cantidad());
    }
    saldos
}

/// Stock a product had before any recorded movement: current stock minus the
/// net of its active movements. Voided lines already had their effect reverted.
pub fn stock_inicial<A: Asiento>(stock_actual: i64, producto_id: ProductoId, asientos: &[A]) -> i64 {
    let neto: i64 = asientos
        .iter()
        .filter(|a| a.activo() && a.producto_id() == producto_id)
        .map(|a| a.cantidad())
        .fold(0, i64::saturating_add);
    stock_actual.saturating_sub(neto)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pescaderia_core::MovimientoId;

    fn fecha(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn mov(id: i64, producto: i64, tipo: TipoMovimiento, cantidad: i64, dia: u32, activo: bool) -> Movimiento {
        let mut m = Movimiento::empty(MovimientoId::new(id));
        m.producto_id = ProductoId::new(producto);
        m.tipo = tipo;
        m.numero_factura = (tipo == TipoMovimiento::Entrada).then_some(100 + id);
        m.fecha = fecha(dia);
        m.descripcion = "x".to_string();
        m.cantidad = tipo.firmar(cantidad);
        m.estado = activo;
        m.created = true;
        m
    }

    fn historial() -> Vec<Movimiento> {
        vec![
            mov(1, 1, TipoMovimiento::Entrada, 20, 1, true),
            mov(2, 1, TipoMovimiento::Salida, 5, 2, true),
            mov(3, 2, TipoMovimiento::Entrada, 7, 3, true),
            mov(4, 1, TipoMovimiento::Salida, 3, 4, false),
        ]
    }

    #[test]
    fn splits_by_type_and_state() {
        let h = historial();
        assert_eq!(por_tipo(&h, TipoMovimiento::Salida).len(), 2);
        assert_eq!(activos(&h).len(), 3);
        assert_eq!(anulados(&h).len(), 1);
    }

    #[test]
    fn saldo_ignores_voided_lines() {
        let saldos = saldo_por_producto(&historial());
        assert_eq!(saldos[&ProductoId::new(1)], 15);
        assert_eq!(saldos[&ProductoId::new(2)], 7);
    }

    #[test]
    fn stock_inicial_subtracts_active_net() {
        assert_eq!(stock_inicial(15, ProductoId::new(1), &historial()), 0);
        assert_eq!(stock_inicial(10, ProductoId::new(2), &historial()), 3);
        assert_eq!(stock_inicial(4, ProductoId::new(9), &historial()), 4);
    }

    #[test]
    fn filter_combines_criteria() {
        let h = historial();
        let filtro = MovimientoFilter {
            producto_id: Some(ProductoId::new(1)),
            estado: Some(true),
            desde: Some(fecha(2)),
            ..Default::default()
        };
        let ids: Vec<i64> = h.iter().filter(|m| filtro.matches(*m)).map(|m| m.id.get()).collect();
        assert_eq!(ids, vec![2]);

        let por_factura = MovimientoFilter {
            numero_factura: Some(103),
            ..Default::default()
        };
        assert_eq!(h.iter().filter(|m| por_factura.matches(*m)).count(), 1);
        assert!(MovimientoFilter::default().is_empty());
    }
}
