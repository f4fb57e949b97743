//! Service configuration from the environment.

use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use reservoir_locks::LockConfig;

const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
const DEFAULT_MEILISEARCH_URL: &str = "http://127.0.0.1:7700";

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: {message}")]
    Invalid { var: &'static str, message: String },
}

/// Everything needed to connect the three collaborator stores.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub database_url: String,
    pub redis_url: String,
    pub meilisearch_url: String,
    pub meilisearch_api_key: Option<String>,
    pub max_db_connections: u32,
    pub lock: LockConfig,
}

impl ServiceConfig {
    /// Read configuration from the environment.
    ///
    /// `DATABASE_URL` is required. `REDIS_URL` and `MEILISEARCH_URL` fall
    /// back to local defaults with a warning. Lock tuning:
    /// `LOCK_TTL_SECS` (default 5), `LOCK_BACKOFF_MS` (default 100),
    /// `LOCK_MAX_ATTEMPTS` (default 50).
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            std::env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;

        let redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| {
            warn!("REDIS_URL not set; using {DEFAULT_REDIS_URL}");
            DEFAULT_REDIS_URL.to_string()
        });

        let meilisearch_url = std::env::var("MEILISEARCH_URL").unwrap_or_else(|_| {
            warn!("MEILISEARCH_URL not set; using {DEFAULT_MEILISEARCH_URL}");
            DEFAULT_MEILISEARCH_URL.to_string()
        });

        let meilisearch_api_key = std::env::var("MEILISEARCH_API_KEY").ok();

        let max_db_connections = parse_or("DB_MAX_CONNECTIONS", 10)?;

        let lock = LockConfig {
            ttl: Duration::from_secs(parse_or("LOCK_TTL_SECS", 5)?),
            backoff: Duration::from_millis(parse_or("LOCK_BACKOFF_MS", 100)?),
            max_attempts: parse_or("LOCK_MAX_ATTEMPTS", 50)?,
        };

        Ok(Self {
            database_url,
            redis_url,
            meilisearch_url,
            meilisearch_api_key,
            max_db_connections,
            lock,
        })
    }
}

fn parse_or<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Ok(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}
