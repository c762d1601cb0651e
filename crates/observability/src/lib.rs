//! Tracing and logging setup shared by the server and the CLI.

/// Initialize process-wide tracing using `LOG_FORMAT` (`json` or `pretty`).
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    let format = std::env::var("LOG_FORMAT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_default();
    tracing::init(format);
}

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use tracing::LogFormat;
