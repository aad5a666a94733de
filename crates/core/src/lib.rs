//! Garage Core - Shared types and ledger arithmetic.
//!
//! This crate provides the types used across all garage back-office components:
//! - `admin` - Back-office API server (inventory, ledger, reporting)
//! - `cli` - Command-line tools for migrations, seeding and audits
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP. Storage backends call into [`ledger`] while holding their
//! own exclusive lock, so every backend applies the same stock arithmetic.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, transaction types, stock status, employee roles
//! - [`ledger`] - Movement planning and ledger replay/reconciliation

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod ledger;
pub mod types;

pub use ledger::{
    LedgerEntry, MAX_QUANTITY, MovementError, Reconciliation, plan_movement, reconcile,
};
pub use types::*;
