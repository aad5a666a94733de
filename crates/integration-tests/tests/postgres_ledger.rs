//! Ledger tests against a real `PostgreSQL` database.
//!
//! These tests require:
//! - A running `PostgreSQL` database with migrations applied
//!   (`garage-cli migrate`)
//! - `GARAGE_TEST_DATABASE_URL` pointing at it
//!
//! Run with: cargo test -p garage-integration-tests -- --ignored

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use std::sync::Arc;

use garage_admin::db::{self, InventoryStore, PgInventoryStore};
use garage_admin::models::{NewInventoryItem, NewTransaction};
use garage_admin::services::{InventoryError, InventoryService};
use garage_core::{EmployeeRole, InventoryItemId, TransactionType};
use garage_integration_tests::{TestServer, decimal};
use reqwest::StatusCode;
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde_json::json;
use uuid::Uuid;

async fn pg_store() -> PgInventoryStore {
    let url = std::env::var("GARAGE_TEST_DATABASE_URL")
        .expect("GARAGE_TEST_DATABASE_URL must be set for PostgreSQL tests");
    let pool = db::create_pool(&SecretString::from(url), 10)
        .await
        .expect("Failed to connect to test database");
    PgInventoryStore::new(pool)
}

fn unique_name(prefix: &str) -> String {
    format!("{prefix} {}", Uuid::new_v4())
}

fn outward(item_id: InventoryItemId, quantity: i64) -> NewTransaction {
    NewTransaction {
        item_id,
        transaction_type: TransactionType::Outward,
        quantity: Decimal::from(quantity),
        employee_id: None,
        customer_id: None,
        order_id: None,
        notes: None,
    }
}

async fn seeded_item(service: &InventoryService, quantity: i64) -> InventoryItemId {
    service
        .add_item(NewInventoryItem {
            item_name: unique_name("Wheel nut"),
            item_description: None,
            unit_of_measure: String::new(),
            initial_quantity: Decimal::from(quantity),
            minimum_quantity: Decimal::ZERO,
            item_price: Decimal::ZERO,
        })
        .await
        .unwrap()
        .item
        .item_id
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (GARAGE_TEST_DATABASE_URL)"]
async fn test_concurrent_outward_movements_serialize() {
    let service = InventoryService::new(Arc::new(pg_store().await));
    let item_id = seeded_item(&service, 10).await;

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..8 {
        let service = service.clone();
        tasks.spawn(async move { service.record_transaction(outward(item_id, 3)).await });
    }

    let mut succeeded = 0;
    let mut rejected = 0;
    while let Some(result) = tasks.join_next().await {
        match result.unwrap() {
            Ok(_) => succeeded += 1,
            Err(InventoryError::InsufficientStock { .. }) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(succeeded, 3);
    assert_eq!(rejected, 5);

    let item = service.get_item(item_id).await.unwrap();
    assert_eq!(item.item.current_quantity, Decimal::from(1));

    let report = service.reconcile_item(item_id).await.unwrap();
    assert!(report.report.is_consistent);
    assert_eq!(report.report.transaction_count, 4);
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (GARAGE_TEST_DATABASE_URL)"]
async fn test_overdraw_writes_nothing() {
    let store = pg_store().await;
    let service = InventoryService::new(Arc::new(store.clone()));
    let item_id = seeded_item(&service, 20).await;

    let err = service
        .record_transaction(outward(item_id, 25))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        InventoryError::InsufficientStock { available, requested, .. }
            if available == Decimal::from(20) && requested == Decimal::from(25)
    ));

    let history = store.item_history(item_id).await.unwrap().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(
        service.get_item(item_id).await.unwrap().item.current_quantity,
        Decimal::from(20)
    );
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (GARAGE_TEST_DATABASE_URL)"]
async fn test_ledger_rows_are_immutable() {
    let store = pg_store().await;
    let service = InventoryService::new(Arc::new(store.clone()));
    let item_id = seeded_item(&service, 5).await;

    let update = sqlx::query("UPDATE inventory_transactions SET quantity = 1 WHERE item_id = $1")
        .bind(item_id)
        .execute(store.pool())
        .await;
    assert!(update.is_err());

    let delete = sqlx::query("DELETE FROM inventory_transactions WHERE item_id = $1")
        .bind(item_id)
        .execute(store.pool())
        .await;
    assert!(delete.is_err());

    assert!(service.reconcile_item(item_id).await.unwrap().report.is_consistent);
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (GARAGE_TEST_DATABASE_URL)"]
async fn test_api_over_postgres() {
    let server = TestServer::spawn_with_store(Arc::new(pg_store().await)).await;
    let (status, body) = server
        .post(
            "/api/inventory",
            EmployeeRole::Manager,
            &json!({"item_name": unique_name("Brake pad set"), "initial_quantity": 30, "minimum_quantity": 5}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let item_id = body["item"]["item_id"].as_i64().unwrap();

    let (status, body) = server.move_stock(item_id, "outward", json!(10)).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(decimal(&body["resulting_quantity"]), Decimal::from(20));

    let (status, _) = server.move_stock(item_id, "outward", json!(25)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let history = server.history(item_id).await;
    assert_eq!(history.len(), 2);
    assert_eq!(decimal(&history[0]["resulting_quantity"]), Decimal::from(20));
    assert_eq!(history[0]["employee_name"], "System");

    let (status, _) = server.get("/health/ready", EmployeeRole::Employee).await;
    assert_eq!(status, StatusCode::OK);

    // NUMERIC(14,3) columns read back without padding, as the memory store does
    let (status, body) = server.move_stock(item_id, "outward", json!("1.500")).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["transaction"]["quantity"], "1.5");
    assert_eq!(body["resulting_quantity"], "18.5");
    assert_eq!(server.item(item_id).await["current_quantity"], "18.5");
    assert_eq!(server.history(item_id).await[0]["quantity"], "1.5");
}
