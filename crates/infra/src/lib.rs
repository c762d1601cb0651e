//! Infrastructure layer: configuration, storage backends and the command
//! dispatcher that ties domain aggregates to them.

pub mod command_dispatcher;
pub mod config;
pub mod store;

pub use command_dispatcher::{CommandDispatcher, DispatchError, LedgerOutcome, MAX_ATTEMPTS};
pub use config::{Config, ConfigError};
pub use store::{
    InMemoryStore, LedgerCommit, MovimientoStore, PostgresStore, ProductoStore, Store, StoreError,
    StoreResult, UserStore,
};
