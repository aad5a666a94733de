//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::JwtConfig;
use crate::db::InventoryStore;
use crate::middleware::JwtKeys;
use crate::services::InventoryService;

/// Application state shared across all handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

#[derive(Debug)]
struct AppStateInner {
    inventory: InventoryService,
    jwt: JwtKeys,
}

impl AppState {
    /// Build state over a store and token configuration.
    #[must_use]
    pub fn new(store: Arc<dyn InventoryStore>, jwt: &JwtConfig) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                inventory: InventoryService::new(store),
                jwt: JwtKeys::new(jwt),
            }),
        }
    }

    /// Inventory catalog, ledger and reporting.
    #[must_use]
    pub fn inventory(&self) -> &InventoryService {
        &self.inner.inventory
    }

    /// Bearer token keys.
    #[must_use]
    pub fn jwt(&self) -> &JwtKeys {
        &self.inner.jwt
    }
}
