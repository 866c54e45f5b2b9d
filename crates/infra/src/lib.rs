//! Infrastructure layer: Postgres store, configuration.

pub mod config;
pub mod postgres;

pub use config::{ConfigError, DatabaseConfig};
pub use postgres::PostgresWithdrawalStore;
