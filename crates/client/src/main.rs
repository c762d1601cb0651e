use anyhow::{Context, bail};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use pescaderia_client::{
    ApiClient, ClientError, DEFAULT_BASE_URL, EntradaInput, FacturaInput, Movimientos,
    ProductoInput, Productos, SalidaInput, Session,
};
use pescaderia_core::{MovimientoId, ProductoId};
use pescaderia_inventory::LineaEntrada;
use pescaderia_products::UnidadMedida;

#[derive(Parser, Debug)]
#[command(name = "pescaderia", about = "Inventario de la pescadería desde la terminal")]
struct Cli {
    #[arg(long, env = "PESCADERIA_API_URL", default_value = DEFAULT_BASE_URL)]
    api_url: String,

    #[arg(long, env = "PESCADERIA_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and print the session token.
    Login {
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Create an account and print the session token.
    Signup {
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        confirm: String,
    },
    Productos(ProductosCommand),
    /// Register an invoice (one or more entrada lines).
    Entrada {
        #[arg(long)]
        factura: i64,
        #[arg(long, value_parser = parse_fecha)]
        fecha: NaiveDate,
        #[arg(long)]
        descripcion: String,
        /// `producto_id:cantidad`, repeatable.
        #[arg(long = "linea", value_parser = parse_linea, required = true)]
        lineas: Vec<LineaEntrada>,
        /// Merge lines that repeat a product instead of refusing.
        #[arg(long)]
        consolidar: bool,
    },
    Salida {
        #[arg(long, value_parser = parse_fecha)]
        fecha: NaiveDate,
        #[arg(long)]
        producto: i64,
        #[arg(long)]
        cantidad: i64,
        #[arg(long)]
        descripcion: Option<String>,
    },
    /// Void a movement.
    Anular { id: i64 },
    /// List invoices.
    Facturas {
        #[arg(long)]
        q: Option<String>,
        #[arg(long)]
        estado: Option<bool>,
    },
}

#[derive(Args, Debug)]
struct ProductosCommand {
    #[command(subcommand)]
    command: ProductosSubcommand,
}

#[derive(Subcommand, Debug)]
enum ProductosSubcommand {
    List {
        #[arg(long)]
        q: Option<String>,
        #[arg(long)]
        stock_max: Option<i64>,
    },
    Create {
        #[arg(long)]
        codigo: i64,
        #[arg(long)]
        descripcion: String,
        #[arg(long, default_value_t = 0)]
        stock: i64,
        #[arg(long)]
        tipo: Option<String>,
    },
    Delete { id: i64 },
}

fn parse_fecha(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| "Formato de fecha inválido (use AAAA-MM-DD)".to_string())
}

fn parse_linea(raw: &str) -> Result<LineaEntrada, String> {
    let (producto, cantidad) = raw
        .split_once(':')
        .ok_or_else(|| format!("línea inválida `{raw}` (use producto_id:cantidad)"))?;
    Ok(LineaEntrada {
        producto_id: ProductoId::new(producto.trim().parse().map_err(|_| format!("producto inválido `{producto}`"))?),
        cantidad: cantidad.trim().parse().map_err(|_| format!("cantidad inválida `{cantidad}`"))?,
    })
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pescaderia_observability::init();
    let cli = Cli::parse();

    let api = ApiClient::new(&cli.api_url);
    let session = Session::new(api.clone());
    if let Some(token) = &cli.token {
        session.resume(token.clone());
    }

    match cli.command {
        Command::Login { email, password } => {
            session.login(&email, &password).await?;
            println!("{}", session.token().context("login returned no token")?);
        }
        Command::Signup { email, password, confirm } => {
            session.signup(&email, &password, &confirm).await?;
            println!("{}", session.token().context("signup returned no token")?);
        }
        Command::Productos(ProductosCommand { command }) => {
            let mut productos = Productos::new(api);
            match command {
                ProductosSubcommand::List { q, stock_max } => {
                    print_json(&productos.buscar(q.as_deref(), stock_max).await?)?;
                }
                ProductosSubcommand::Create { codigo, descripcion, stock, tipo } => {
                    let tipo_cantidad = tipo.as_deref().map(str::parse::<UnidadMedida>).transpose()?;
                    let creado = productos
                        .create(&ProductoInput { codigo, descripcion, stock, tipo_cantidad })
                        .await?;
                    print_json(&creado)?;
                }
                ProductosSubcommand::Delete { id } => {
                    productos.delete(ProductoId::new(id)).await?;
                    println!("Producto eliminado");
                }
            }
        }
        Command::Entrada { factura, fecha, descripcion, lineas, consolidar } => {
            let mut movimientos = Movimientos::new(api);
            let input = FacturaInput {
                numero_factura: factura,
                fecha,
                descripcion,
                lineas,
            };
            match movimientos.registrar_factura(&input, consolidar).await {
                Ok(creados) => print_json(&creados)?,
                Err(ClientError::Duplicados(duplicados)) => {
                    for d in &duplicados {
                        eprintln!(
                            "producto {} aparece {} veces (total {})",
                            d.producto_id, d.instancias, d.cantidad_total
                        );
                    }
                    bail!("la factura repite productos; use --consolidar para sumarlos");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::Salida { fecha, producto, cantidad, descripcion } => {
            let mut movimientos = Movimientos::new(api);
            let creado = movimientos
                .create_salida(&SalidaInput {
                    fecha,
                    producto_id: ProductoId::new(producto),
                    descripcion,
                    cantidad,
                })
                .await?;
            print_json(&creado)?;
        }
        Command::Anular { id } => {
            let mut movimientos = Movimientos::new(api);
            print_json(&movimientos.anular(MovimientoId::new(id)).await?)?;
        }
        Command::Facturas { q, estado } => {
            let movimientos = Movimientos::new(api);
            print_json(&movimientos.fetch_facturas(estado, q.as_deref()).await?)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lineas_parse_from_pairs() {
        let l = parse_linea("4: 12").unwrap();
        assert_eq!(l.producto_id, ProductoId::new(4));
        assert_eq!(l.cantidad, 12);
        assert!(parse_linea("4").is_err());
        assert!(parse_linea("x:1").is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn entrada_accepts_repeated_lines() {
        let cli = Cli::try_parse_from([
            "pescaderia", "entrada", "--factura", "9", "--fecha", "2024-05-10", "--descripcion", "Puerto",
            "--linea", "1:2", "--linea", "1:3", "--consolidar",
        ])
        .unwrap();
        match cli.command {
            Command::Entrada { lineas, consolidar, .. } => {
                assert_eq!(lineas.len(), 2);
                assert!(consolidar);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
