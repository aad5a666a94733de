//! Garage Admin library.
//!
//! The back-office API server as a library, so the HTTP surface can be
//! exercised in-process by tests and reused by the CLI.
//!
//! # Layout
//!
//! - [`db`] - Storage backends behind the [`db::InventoryStore`] trait
//! - [`services`] - Validation and orchestration over a store
//! - [`routes`] - JSON API handlers and the router
//! - [`middleware`] - Request IDs, security headers, bearer token extractors

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
