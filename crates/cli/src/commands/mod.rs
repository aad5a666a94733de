//! CLI subcommands.

pub mod audit;
pub mod migrate;
pub mod seed;
pub mod token;

use garage_admin::config::{ConfigError, database_url_from_env};
use garage_admin::db::{self, PgInventoryStore};
use garage_admin::services::{InventoryError, InventoryService};
use std::sync::Arc;
use thiserror::Error;

/// CLI connections need few slots.
const CLI_MAX_CONNECTIONS: u32 = 2;

/// Errors shared by the database-backed commands.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid seed file: {0}")]
    Seed(#[from] serde_yaml::Error),

    #[error("{0} item(s) failed reconciliation")]
    Inconsistent(usize),
}

/// Connect to the database named by the environment.
pub async fn connect() -> Result<sqlx::PgPool, CommandError> {
    let database_url = database_url_from_env()?;
    tracing::info!("Connecting to database...");
    Ok(db::create_pool(&database_url, CLI_MAX_CONNECTIONS).await?)
}

/// Inventory service over a `PostgreSQL` pool.
#[must_use]
pub fn inventory_service(pool: sqlx::PgPool) -> InventoryService {
    InventoryService::new(Arc::new(PgInventoryStore::new(pool)))
}
