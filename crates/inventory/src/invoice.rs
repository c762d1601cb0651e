//! Invoice view over entradas, plus draft-invoice line checks.
//!
//! A factura is not stored: it is the set of entradas sharing
//! `(numero_factura, fecha, estado)`.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use pescaderia_core::{DomainError, ProductoId};

use crate::ledger::Asiento;
use crate::movement::TipoMovimiento;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Factura<A> {
    pub numero_factura: i64,
    pub fecha: NaiveDate,
    /// Descripcion of the first line seen.
    pub descripcion: String,
    pub estado: bool,
    pub lineas: Vec<A>,
}

impl<A: Asiento> Factura<A> {
    /// Sum of absolute line quantities, saturating at `i64::MAX`.
    pub fn total_cantidad(&self) -> i64 {
        self.lineas
            .iter()
            .map(|l| l.cantidad().saturating_abs())
            .fold(0, i64::saturating_add)
    }

    fn coincide(&self, term: &str) -> bool {
        if self.numero_factura.to_string().contains(term) {
            return true;
        }
        self.lineas.iter().any(|l| {
            l.producto_codigo().is_some_and(|c| c.to_string().contains(term))
                || l.producto_descripcion().is_some_and(|d| d.to_lowercase().contains(term))
        })
    }
}

/// Group entradas into facturas, newest fecha first.
///
/// Salidas and entradas without a number are skipped. Facturas on the same
/// fecha keep the order in which their first line appeared.
pub fn agrupar_facturas<A: Asiento + Clone>(asientos: &[A]) -> Vec<Factura<A>> {
    let mut index: HashMap<(i64, NaiveDate, bool), usize> = HashMap::new();
    let mut facturas: Vec<Factura<A>> = Vec::new();

    for a in asientos.iter().filter(|a| a.tipo() == TipoMovimiento::Entrada) {
        let Some(numero) = a.numero_factura() else {
            continue;
        };
        let key = (numero, a.fecha(), a.activo());
        match index.get(&key) {
            Some(&i) => facturas[i].lineas.push(a.clone()),
            None => {
                index.insert(key, facturas.len());
                facturas.push(Factura {
                    numero_factura: numero,
                    fecha: a.fecha(),
                    descripcion: a.descripcion().to_string(),
                    estado: a.activo(),
                    lineas: vec![a.clone()],
                });
            }
        }
    }

    facturas.sort_by(|x, y| y.fecha.cmp(&x.fecha));
    facturas
}

/// Case-insensitive search over the invoice number and the embedded product
/// codigo/descripcion of each line. An empty term keeps everything.
pub fn buscar_facturas<A: Asiento>(facturas: Vec<Factura<A>>, term: &str) -> Vec<Factura<A>> {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return facturas;
    }
    facturas.into_iter().filter(|f| f.coincide(&term)).collect()
}

/// One line of an invoice being drafted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineaEntrada {
    pub producto_id: ProductoId,
    pub cantidad: i64,
}

/// A product that appears on more than one draft line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Duplicado {
    pub producto_id: ProductoId,
    pub cantidad_total: i64,
    pub instancias: usize,
}

/// Products repeated across draft lines, in first-seen order.
pub fn detectar_duplicados(lineas: &[LineaEntrada]) -> Vec<Duplicado> {
    let mut acumulado: Vec<Duplicado> = Vec::new();
    for linea in lineas {
        match acumulado.iter_mut().find(|d| d.producto_id == linea.producto_id) {
            Some(d) => {
                d.cantidad_total = d.cantidad_total.saturating_add(linea.cantidad);
                d.instancias += 1;
            }
            None => acumulado.push(Duplicado {
                producto_id: linea.producto_id,
                cantidad_total: linea.cantidad,
                instancias: 1,
            }),
        }
    }
    acumulado.retain(|d| d.instancias > 1);
    acumulado
}

/// Merge lines for the same product by summing quantities, keeping first-seen order.
///
/// Fails when a merged quantity does not fit in an `i64`.
pub fn consolidar_lineas(lineas: &[LineaEntrada]) -> Result<Vec<LineaEntrada>, DomainError> {
    let mut consolidadas: Vec<LineaEntrada> = Vec::new();
    for linea in lineas {
        match consolidadas.iter_mut().find(|l| l.producto_id == linea.producto_id) {
            Some(l) => {
                l.cantidad = l
                    .cantidad
                    .checked_add(linea.cantidad)
                    .ok_or_else(|| DomainError::validation("La cantidad consolidada excede el máximo permitido"))?;
            }
            None => consolidadas.push(*linea),
        }
    }
    Ok(consolidadas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movement::Movimiento;
    use pescaderia_core::MovimientoId;

    #[derive(Clone)]
    struct Linea {
        m: Movimiento,
        codigo: i64,
        nombre: &'static str,
    }

    impl Asiento for Linea {
        fn producto_id(&self) -> ProductoId {
            self.m.producto_id()
        }
        fn tipo(&self) -> TipoMovimiento {
            self.m.tipo()
        }
        fn numero_factura(&self) -> Option<i64> {
            self.m.numero_factura()
        }
        fn fecha(&self) -> NaiveDate {
            self.m.fecha()
        }
        fn descripcion(&self) -> &str {
            self.m.descripcion()
        }
        fn cantidad(&self) -> i64 {
            self.m.cantidad()
        }
        fn activo(&self) -> bool {
            self.m.activo()
        }
        fn producto_codigo(&self) -> Option<i64> {
            Some(self.codigo)
        }
        fn producto_descripcion(&self) -> Option<&str> {
            Some(self.nombre)
        }
    }

    fn linea(id: i64, numero: Option<i64>, dia: u32, cantidad: i64, activo: bool, codigo: i64, nombre: &'static str) -> Linea {
        let mut m = Movimiento::empty(MovimientoId::new(id));
        m.producto_id = ProductoId::new(codigo);
        m.tipo = if numero.is_some() { TipoMovimiento::Entrada } else { TipoMovimiento::Salida };
        m.numero_factura = numero;
        m.fecha = NaiveDate::from_ymd_opt(2026, 5, dia).unwrap();
        m.descripcion = format!("Proveedor {id}");
        m.cantidad = m.tipo.firmar(cantidad);
        m.estado = activo;
        m.created = true;
        Linea { m, codigo, nombre }
    }

    fn historial() -> Vec<Linea> {
        vec![
            linea(1, Some(77), 2, 10, true, 100, "Merluza"),
            linea(2, Some(77), 2, 5, true, 205, "Langostinos"),
            linea(3, Some(77), 2, 4, false, 100, "Merluza"),
            linea(4, Some(80), 9, 3, true, 310, "Calamar"),
            linea(5, None, 10, 2, true, 100, "Merluza"),
        ]
    }

    #[test]
    fn groups_by_number_date_and_state_newest_first() {
        let facturas = agrupar_facturas(&historial());
        let claves: Vec<(i64, bool, usize)> = facturas
            .iter()
            .map(|f| (f.numero_factura, f.estado, f.lineas.len()))
            .collect();
        assert_eq!(claves, vec![(80, true, 1), (77, true, 2), (77, false, 1)]);
        assert_eq!(facturas[1].descripcion, "Proveedor 1");
        assert_eq!(facturas[1].total_cantidad(), 15);
    }

    #[test]
    fn search_matches_number_and_products() {
        let facturas = agrupar_facturas(&historial());
        assert_eq!(buscar_facturas(facturas.clone(), "80").len(), 1);
        assert_eq!(buscar_facturas(facturas.clone(), "langos").len(), 1);
        assert_eq!(buscar_facturas(facturas.clone(), "310").len(), 1);
        assert_eq!(buscar_facturas(facturas.clone(), "MERLUZA").len(), 2);
        assert_eq!(buscar_facturas(facturas, "").len(), 3);
    }

    fn draft() -> Vec<LineaEntrada> {
        vec![
            LineaEntrada { producto_id: ProductoId::new(1), cantidad: 4 },
            LineaEntrada { producto_id: ProductoId::new(2), cantidad: 1 },
            LineaEntrada { producto_id: ProductoId::new(1), cantidad: 6 },
        ]
    }

    #[test]
    fn detects_repeated_products() {
        assert_eq!(
            detectar_duplicados(&draft()),
            vec![Duplicado { producto_id: ProductoId::new(1), cantidad_total: 10, instancias: 2 }]
        );
        assert!(detectar_duplicados(&draft()[..2]).is_empty());
    }

    #[test]
    fn consolidation_sums_in_first_seen_order() {
        assert_eq!(
            consolidar_lineas(&draft()).unwrap(),
            vec![
                LineaEntrada { producto_id: ProductoId::new(1), cantidad: 10 },
                LineaEntrada { producto_id: ProductoId::new(2), cantidad: 1 },
            ]
        );
    }

    #[test]
    fn consolidation_refuses_quantities_that_overflow() {
        let lineas = vec![
            LineaEntrada { producto_id: ProductoId::new(1), cantidad: i64::MAX },
            LineaEntrada { producto_id: ProductoId::new(1), cantidad: 1 },
        ];
        assert!(matches!(consolidar_lineas(&lineas), Err(DomainError::Validation(_))));
        assert_eq!(detectar_duplicados(&lineas)[0].cantidad_total, i64::MAX);
    }
}
