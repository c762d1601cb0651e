use thiserror::Error;

use pescaderia_inventory::Duplicado;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Rejected locally; nothing was sent.
    #[error("{0}")]
    Validation(String),

    /// The server answered 401. The session has been cleared.
    #[error("{0}")]
    Unauthorized(String),

    #[error("{message}")]
    Api { status: u16, message: String },

    /// A draft invoice lists the same product more than once.
    #[error("la factura repite {} producto(s)", .0.len())]
    Duplicados(Vec<Duplicado>),

    #[error("error de conexión: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ClientError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Unauthorized(_) => Some(401),
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}
