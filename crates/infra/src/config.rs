//! Process configuration from the environment.
//!
//! A `.env` file in the working directory is loaded first when present; real
//! environment variables win over it.

use std::net::{IpAddr, SocketAddr};

use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
pub const DEV_JWT_SECRET: &str = "dev-secret-change-me";

/// Origins the web client is served from.
pub const DEFAULT_CORS_ORIGINS: &[&str] = &[
    "http://localhost:3000",
    "http://localhost:3001",
    "http://localhost:5173",
    "http://localhost:5137",
    "https://loiaconobruno.github.io",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind_addr: IpAddr,
    pub port: u16,
    /// `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub jwt_secret: String,
    pub cors_origins: Vec<String>,
}

impl Config {
    /// Load `.env` (if any) and read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!(error = %e, "failed to load .env file");
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match get("PORT") {
            Some(v) => v.parse().map_err(|_| ConfigError::Invalid { key: "PORT", value: v })?,
            None => DEFAULT_PORT,
        };
        let bind_addr = match get("BIND_ADDR") {
            Some(v) => v.parse().map_err(|_| ConfigError::Invalid { key: "BIND_ADDR", value: v })?,
            None => IpAddr::from([0, 0, 0, 0]),
        };
        let db_max_connections = match get("DB_MAX_CONNECTIONS") {
            Some(v) => v
                .parse()
                .map_err(|_| ConfigError::Invalid { key: "DB_MAX_CONNECTIONS", value: v })?,
            None => DEFAULT_DB_MAX_CONNECTIONS,
        };
        let cors_origins = match get("CORS_ORIGINS") {
            Some(v) => v
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect(),
            None => DEFAULT_CORS_ORIGINS.iter().map(|o| o.to_string()).collect(),
        };

        Ok(Self {
            bind_addr,
            port,
            database_url: get("DATABASE_URL"),
            db_max_connections,
            jwt_secret: get("JWT_SECRET").unwrap_or_else(|| DEV_JWT_SECRET.to_string()),
            cors_origins,
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_match_local_development() {
        let c = config(&[]).unwrap();
        assert_eq!(c.listen_addr().to_string(), "0.0.0.0:8080");
        assert_eq!(c.database_url, None);
        assert!(c.uses_dev_secret());
        assert_eq!(c.cors_origins.len(), DEFAULT_CORS_ORIGINS.len());
    }

    #[test]
    fn reads_overrides() {
        let c = config(&[
            ("PORT", "9000"),
            ("BIND_ADDR", "127.0.0.1"),
            ("DATABASE_URL", "postgres://localhost/pesca"),
            ("JWT_SECRET", "abc"),
            ("CORS_ORIGINS", "http://a.test, http://b.test,"),
        ])
        .unwrap();
        assert_eq!(c.listen_addr().to_string(), "127.0.0.1:9000");
        assert_eq!(c.database_url.as_deref(), Some("postgres://localhost/pesca"));
        assert!(!c.uses_dev_secret());
        assert_eq!(c.cors_origins, vec!["http://a.test", "http://b.test"]);
    }

    #[test]
    fn rejects_bad_port() {
        assert_eq!(
            config(&[("PORT", "ochenta")]).unwrap_err(),
            ConfigError::Invalid { key: "PORT", value: "ochenta".into() }
        );
    }
}
