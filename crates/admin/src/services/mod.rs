//! Business logic services.
//!
//! # Services
//!
//! - `inventory` - Item catalog, stock ledger and reconciliation

pub mod inventory;

pub use inventory::{InventoryError, InventoryService};
