//! Storage for the inventory catalog and stock ledger.
//!
//! # Tables
//!
//! - `inventory_items` - Catalog with the cached `current_quantity` balance
//! - `inventory_transactions` - Append-only stock ledger
//! - `employees`, `customers`, `orders` - Attribution directory, read only here
//!
//! # Backends
//!
//! - [`PgInventoryStore`] - `PostgreSQL`, row locks via `SELECT ... FOR UPDATE`
//! - [`MemoryInventoryStore`] - single-mutex store for local runs and tests
//!
//! Both apply movements through [`garage_core::plan_movement`] while holding
//! their exclusive lock, so the arithmetic and rejection rules are shared.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/admin/migrations/` and run via:
//! ```bash
//! cargo run -p garage-cli -- migrate
//! ```

pub mod inventory;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use garage_core::{InventoryItemId, LedgerEntry, MovementError};

use crate::models::{
    InventoryItem, InventoryTransaction, NewInventoryItem, NewTransaction, OrderConsumption,
    TransactionHistoryEntry,
};

pub use inventory::PgInventoryStore;
pub use memory::{FaultPoint, MemoryInventoryStore};

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("{0} not found")]
    NotFound(String),

    /// A movement was rejected by the ledger rules; nothing was written.
    #[error("movement rejected for item {item_id}: {source}")]
    Rejected {
        item_id: InventoryItemId,
        source: MovementError,
    },

    /// The store could not complete the write; nothing was committed.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl RepositoryError {
    pub(crate) fn item_not_found(item_id: InventoryItemId) -> Self {
        Self::NotFound(format!("inventory item {item_id}"))
    }
}

/// Catalog and ledger persistence.
///
/// Every write method is atomic: on `Err` the store is unchanged.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Items ordered by name. `active_only` hides deactivated items.
    async fn list_items(&self, active_only: bool) -> Result<Vec<InventoryItem>, RepositoryError>;

    async fn get_item(&self, item_id: InventoryItemId)
    -> Result<Option<InventoryItem>, RepositoryError>;

    /// Insert an item with zero stock, then record `initial_quantity` as an
    /// inward opening-balance row in the same unit of work.
    async fn create_item(&self, item: &NewInventoryItem) -> Result<InventoryItem, RepositoryError>;

    /// Clear `is_active`. Returns `None` for an unknown item.
    async fn deactivate_item(
        &self,
        item_id: InventoryItemId,
    ) -> Result<Option<InventoryItem>, RepositoryError>;

    /// Lock the item, apply the movement, update the balance and append the row.
    async fn record_transaction(
        &self,
        transaction: &NewTransaction,
    ) -> Result<InventoryTransaction, RepositoryError>;

    /// Record every line of `consumption` as outward rows, all or nothing.
    ///
    /// Rows are returned in line order.
    async fn record_consumption(
        &self,
        consumption: &OrderConsumption,
    ) -> Result<Vec<InventoryTransaction>, RepositoryError>;

    /// Ledger rows for an item, newest first. Returns `None` for an unknown item.
    async fn item_history(
        &self,
        item_id: InventoryItemId,
    ) -> Result<Option<Vec<TransactionHistoryEntry>>, RepositoryError>;

    /// An item and its ledger (oldest first) read from one consistent snapshot.
    async fn ledger_snapshot(
        &self,
        item_id: InventoryItemId,
    ) -> Result<Option<(InventoryItem, Vec<LedgerEntry>)>, RepositoryError>;

    /// Verify the store is reachable.
    async fn health_check(&self) -> Result<(), RepositoryError>;
}

/// Create a `PostgreSQL` connection pool.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
/// * `max_connections` - Pool size upper bound
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(
    database_url: &secrecy::SecretString,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(2.min(max_connections))
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
