// src/config.rs
use std::{fmt::Display, str::FromStr, time::Duration};

use thiserror::Error;
use tracing::info;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be set")]
    Missing { key: &'static str },

    #[error("invalid {key} value `{value}`: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(format!("expected `postgres` or `memory`, got `{other}`")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub storage: StorageBackend,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub eligibility_enabled: bool,
    pub eligibility_base_url: Option<String>,
    pub eligibility_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            storage: StorageBackend::Postgres,
            database_url: None,
            db_max_connections: 5,
            eligibility_enabled: false,
            eligibility_base_url: None,
            eligibility_timeout: Duration::from_millis(1000),
        }
    }
}

impl Config {
    /// Loads `.env` if present, then reads the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let port = try_load(&lookup, "PORT", defaults.port)?;
        let storage = try_load(&lookup, "STORAGE", defaults.storage)?;
        let db_max_connections =
            try_load(&lookup, "DB_MAX_CONNECTIONS", defaults.db_max_connections)?;
        let eligibility_enabled =
            try_load(&lookup, "ELIGIBILITY_ENABLED", defaults.eligibility_enabled)?;
        let timeout_ms: u64 = try_load(&lookup, "ELIGIBILITY_TIMEOUT_MS", 1000)?;

        let database_url = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());
        if storage == StorageBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing {
                key: "DATABASE_URL",
            });
        }

        let eligibility_base_url = lookup("ELIGIBILITY_BASE_URL").filter(|v| !v.trim().is_empty());
        if eligibility_enabled && eligibility_base_url.is_none() {
            return Err(ConfigError::Missing {
                key: "ELIGIBILITY_BASE_URL",
            });
        }

        Ok(Self {
            port,
            storage,
            database_url,
            db_max_connections,
            eligibility_enabled,
            eligibility_base_url,
            eligibility_timeout: Duration::from_millis(timeout_ms),
        })
    }
}

fn try_load<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value,
            reason: e.to_string(),
        }),
        None => {
            info!("{key} not set, using default");
            Ok(default)
        }
    }
}
