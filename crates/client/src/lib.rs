//! Typed client for the inventory service.
//!
//! [`ApiClient`] wraps HTTP and the session token; [`Session`],
//! [`Productos`] and [`Movimientos`] keep cached copies of what the server
//! returned and refresh them after every mutation.

pub mod error;
pub mod http;
pub mod model;
pub mod movimientos;
pub mod productos;
pub mod session;

pub use error::{ClientError, ClientResult};
pub use http::{ApiClient, DEFAULT_BASE_URL, SessionSlot};
pub use model::{AuthResponse, FacturaResumen, Movimiento, Producto, User};
pub use movimientos::{EntradaInput, FacturaInput, Movimientos, SalidaInput};
pub use productos::{ProductoInput, ProductoUpdate, Productos};
pub use session::Session;
