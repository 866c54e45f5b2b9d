//! Database configuration loaded from the environment.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;

const URL_VAR: &str = "STOCKROOM_DATABASE_URL";
const URL_FALLBACK_VAR: &str = "DATABASE_URL";
const MAX_CONNECTIONS_VAR: &str = "STOCKROOM_DB_MAX_CONNECTIONS";
const ACQUIRE_TIMEOUT_VAR: &str = "STOCKROOM_DB_ACQUIRE_TIMEOUT_SECS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    MissingVar(&'static str),

    #[error("invalid value for {var}: {value}")]
    InvalidVar { var: &'static str, value: String },

    #[error("failed to connect: {0}")]
    Connect(#[from] sqlx::Error),
}

/// Connection settings for the withdrawal store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl DatabaseConfig {
    /// Read configuration from the environment.
    ///
    /// `STOCKROOM_DATABASE_URL` takes precedence over `DATABASE_URL`; the
    /// pool size and acquire timeout have defaults suitable for a small
    /// service process.
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = std::env::var(URL_VAR)
            .or_else(|_| std::env::var(URL_FALLBACK_VAR))
            .map_err(|_| ConfigError::MissingVar(URL_VAR))?;

        let max_connections = parse_var(MAX_CONNECTIONS_VAR, std::env::var(MAX_CONNECTIONS_VAR).ok(), 5)?;
        let acquire_secs: u64 = parse_var(ACQUIRE_TIMEOUT_VAR, std::env::var(ACQUIRE_TIMEOUT_VAR).ok(), 10)?;

        Ok(Self {
            url,
            max_connections,
            acquire_timeout: Duration::from_secs(acquire_secs),
        })
    }

    /// Open a connection pool with these settings.
    pub async fn connect(&self) -> Result<PgPool, ConfigError> {
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect(&self.url)
            .await?;
        tracing::info!(max_connections = self.max_connections, "database pool opened");
        Ok(pool)
    }
}

fn parse_var<T: core::str::FromStr>(
    var: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidVar { var, value }),
    }
}
