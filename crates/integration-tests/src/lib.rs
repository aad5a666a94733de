//! Integration test harness for the garage back office.
//!
//! [`TestServer`] runs the real router on an ephemeral port so tests speak
//! HTTP exactly like the admin frontend does.
//!
//! # Running Tests
//!
//! ```bash
//! # In-memory store, no services needed
//! cargo test -p garage-integration-tests
//!
//! # PostgreSQL-backed tests (migrations must be applied)
//! GARAGE_TEST_DATABASE_URL=postgres://... \
//!     cargo test -p garage-integration-tests -- --ignored
//! ```

#![allow(clippy::expect_used, clippy::missing_panics_doc)]

use std::sync::Arc;

use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde_json::Value;

use garage_admin::config::JwtConfig;
use garage_admin::db::{InventoryStore, MemoryInventoryStore};
use garage_admin::routes;
use garage_admin::state::AppState;
use garage_core::{EmployeeId, EmployeeRole};

/// Signing secret used by every test server.
pub const TEST_JWT_SECRET: &str = "k9$Jm2!pX7@qL4#vB8&nR1*tW5^yZ3%c";

/// Employee the default tokens are issued for.
pub const TEST_EMPLOYEE_ID: i32 = 1;

/// A running API server plus a client pointed at it.
pub struct TestServer {
    pub base_url: String,
    pub client: Client,
    state: AppState,
    memory: Option<Arc<MemoryInventoryStore>>,
    _server: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Serve the API over a fresh in-memory store.
    pub async fn spawn() -> Self {
        let memory = Arc::new(MemoryInventoryStore::new());
        let store: Arc<dyn InventoryStore> = memory.clone();
        let mut server = Self::spawn_with_store(store).await;
        server.memory = Some(memory);
        server
    }

    /// Serve the API over any store.
    pub async fn spawn_with_store(store: Arc<dyn InventoryStore>) -> Self {
        let state = AppState::new(
            store,
            &JwtConfig {
                secret: SecretString::from(TEST_JWT_SECRET.to_string()),
                ttl_minutes: 60,
            },
        );
        let app = routes::app(state.clone(), &[]);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("Listener has no address");

        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .await
                .expect("Test server failed");
        });

        Self {
            base_url: format!("http://{addr}"),
            client: Client::new(),
            state,
            memory: None,
            _server: server,
        }
    }

    /// The in-memory store behind this server.
    pub fn memory(&self) -> &MemoryInventoryStore {
        self.memory
            .as_deref()
            .expect("Server was not spawned with the in-memory store")
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Bearer token for the default test employee.
    pub fn token(&self, role: EmployeeRole) -> String {
        self.token_for(TEST_EMPLOYEE_ID, "Ana Silva", role)
    }

    pub fn token_for(&self, employee_id: i32, name: &str, role: EmployeeRole) -> String {
        self.state
            .jwt()
            .issue(EmployeeId::new(employee_id), name, role)
            .expect("Failed to issue test token")
    }

    /// `GET` as the given role, returning status and JSON body.
    pub async fn get(&self, path: &str, role: EmployeeRole) -> (StatusCode, Value) {
        let resp = self
            .client
            .get(self.url(path))
            .bearer_auth(self.token(role))
            .send()
            .await
            .expect("GET request failed");
        into_parts(resp).await
    }

    /// `POST` a JSON body as the given role.
    pub async fn post(&self, path: &str, role: EmployeeRole, body: &Value) -> (StatusCode, Value) {
        let resp = self
            .client
            .post(self.url(path))
            .bearer_auth(self.token(role))
            .json(body)
            .send()
            .await
            .expect("POST request failed");
        into_parts(resp).await
    }

    /// Create an item as a manager and return its ID.
    pub async fn add_item(&self, name: &str, initial: i64, minimum: i64) -> i64 {
        let (status, body) = self
            .post(
                "/api/inventory",
                EmployeeRole::Manager,
                &serde_json::json!({
                    "item_name": name,
                    "initial_quantity": initial,
                    "minimum_quantity": minimum,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "add_item failed: {body}");
        body["item"]["item_id"]
            .as_i64()
            .expect("Created item has no item_id")
    }

    /// Record a movement as an employee.
    pub async fn move_stock(&self, item_id: i64, kind: &str, quantity: Value) -> (StatusCode, Value) {
        self.post(
            "/api/inventory/transaction",
            EmployeeRole::Employee,
            &serde_json::json!({
                "item_id": item_id,
                "transaction_type": kind,
                "quantity": quantity,
            }),
        )
        .await
    }

    /// Ledger rows for an item, newest first.
    pub async fn history(&self, item_id: i64) -> Vec<Value> {
        let (status, body) = self
            .get(
                &format!("/api/inventory/{item_id}/history"),
                EmployeeRole::Employee,
            )
            .await;
        assert_eq!(status, StatusCode::OK, "history failed: {body}");
        body.as_array().cloned().expect("History is not an array")
    }

    /// A single item with its stock status.
    pub async fn item(&self, item_id: i64) -> Value {
        let (status, body) = self
            .get(&format!("/api/inventory/{item_id}"), EmployeeRole::Employee)
            .await;
        assert_eq!(status, StatusCode::OK, "get item failed: {body}");
        body
    }
}

/// Read a decimal field serialized as a JSON string.
pub fn decimal(value: &Value) -> Decimal {
    value
        .as_str()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| panic!("not a decimal string: {value}"))
}

async fn into_parts(resp: reqwest::Response) -> (StatusCode, Value) {
    let status = resp.status();
    let text = resp.text().await.expect("Failed to read response body");
    let body = if text.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).unwrap_or(Value::String(text))
    };
    (status, body)
}
