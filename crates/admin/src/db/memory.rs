//! In-memory inventory store.
//!
//! A single `tokio::sync::Mutex` guards the whole store, so writers are
//! serialized exactly like row locks serialize them in `PostgreSQL`. Used for
//! `GARAGE_STORAGE=memory` and by the test suites.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use garage_core::{
    CustomerId, EmployeeId, InventoryItemId, InventoryTransactionId, LedgerEntry, OrderId,
    TransactionType, plan_movement,
};

use super::{InventoryStore, RepositoryError};
use crate::models::inventory::{
    OPENING_BALANCE_NOTE, SYSTEM_EMPLOYEE_NAME, UNKNOWN_CUSTOMER_NAME, display_name,
};
use crate::models::{
    InventoryItem, InventoryTransaction, NewInventoryItem, NewTransaction, OrderConsumption,
    TransactionHistoryEntry,
};

/// Where an injected write failure fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    /// After the item balance is updated, before the ledger row is appended.
    AfterBalanceUpdate,
    /// After the ledger row is appended, before the write commits.
    AfterLedgerAppend,
}

#[derive(Debug, Default)]
struct MemoryState {
    items: BTreeMap<InventoryItemId, InventoryItem>,
    transactions: Vec<InventoryTransaction>,
    employees: HashMap<EmployeeId, String>,
    customers: HashMap<CustomerId, String>,
    orders: HashMap<OrderId, String>,
    last_item_id: i32,
    last_transaction_id: i32,
    last_timestamp: Option<DateTime<Utc>>,
    pending_fault: Option<FaultPoint>,
}

/// State captured at the start of a write, restored if the write fails.
struct Savepoint {
    /// Copies of the items the write may change.
    touched: Vec<InventoryItem>,
    last_item_id: i32,
    transaction_count: usize,
}

impl MemoryState {
    fn savepoint(&self, touched: &[InventoryItemId]) -> Savepoint {
        Savepoint {
            touched: touched
                .iter()
                .filter_map(|id| self.items.get(id).cloned())
                .collect(),
            last_item_id: self.last_item_id,
            transaction_count: self.transactions.len(),
        }
    }

    /// Roll back to `savepoint`. ID counters are not rewound, matching sequences.
    fn rollback(&mut self, savepoint: Savepoint) {
        let last_kept = InventoryItemId::new(savepoint.last_item_id);
        self.items.retain(|id, _| *id <= last_kept);
        for item in savepoint.touched {
            self.items.insert(item.item_id, item);
        }
        self.transactions.truncate(savepoint.transaction_count);
    }

    /// Timestamps never run backwards, so date order and ID order agree.
    fn now(&mut self) -> DateTime<Utc> {
        let now = self
            .last_timestamp
            .map_or_else(Utc::now, |last| Utc::now().max(last));
        self.last_timestamp = Some(now);
        now
    }

    fn check_fault(&mut self, point: FaultPoint) -> Result<(), RepositoryError> {
        if self.pending_fault == Some(point) {
            self.pending_fault = None;
            return Err(RepositoryError::Unavailable(format!(
                "injected failure {point:?}"
            )));
        }
        Ok(())
    }

    fn apply(&mut self, movement: &NewTransaction) -> Result<InventoryTransaction, RepositoryError> {
        let now = self.now();
        let item = self
            .items
            .get_mut(&movement.item_id)
            .ok_or_else(|| RepositoryError::item_not_found(movement.item_id))?;

        let resulting_quantity = plan_movement(
            item.current_quantity,
            movement.transaction_type,
            movement.quantity,
        )
        .map_err(|source| RepositoryError::Rejected {
            item_id: movement.item_id,
            source,
        })?;

        item.current_quantity = resulting_quantity;
        item.updated_at = now;
        self.check_fault(FaultPoint::AfterBalanceUpdate)?;

        self.last_transaction_id += 1;
        let transaction = InventoryTransaction {
            transaction_id: InventoryTransactionId::new(self.last_transaction_id),
            item_id: movement.item_id,
            transaction_type: movement.transaction_type,
            quantity: movement.quantity,
            resulting_quantity,
            transaction_date: now,
            employee_id: movement.employee_id,
            customer_id: movement.customer_id,
            order_id: movement.order_id,
            notes: movement.notes.clone(),
        };
        self.transactions.push(transaction.clone());
        self.check_fault(FaultPoint::AfterLedgerAppend)?;

        Ok(transaction)
    }

    /// Run `write` atomically: any error restores the state it started from.
    ///
    /// `touched` lists the existing items the write may change; items it
    /// creates are dropped on rollback.
    fn atomically<T>(
        &mut self,
        touched: &[InventoryItemId],
        write: impl FnOnce(&mut Self) -> Result<T, RepositoryError>,
    ) -> Result<T, RepositoryError> {
        let savepoint = self.savepoint(touched);
        let result = write(self);
        if result.is_err() {
            self.rollback(savepoint);
        }
        result
    }

    fn history_entry(&self, transaction: &InventoryTransaction) -> TransactionHistoryEntry {
        TransactionHistoryEntry {
            employee_name: transaction
                .employee_id
                .and_then(|id| self.employees.get(&id).cloned())
                .unwrap_or_else(|| SYSTEM_EMPLOYEE_NAME.to_string()),
            customer_name: transaction
                .customer_id
                .and_then(|id| self.customers.get(&id).cloned())
                .unwrap_or_else(|| UNKNOWN_CUSTOMER_NAME.to_string()),
            order_reference: transaction
                .order_id
                .and_then(|id| self.orders.get(&id).cloned()),
            transaction: transaction.clone(),
        }
    }
}

/// Inventory store held entirely in process memory.
#[derive(Debug, Default)]
pub struct MemoryInventoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryInventoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next write fail at `point` and roll back.
    pub async fn fail_next_write(&self, point: FaultPoint) {
        self.state.lock().await.pending_fault = Some(point);
    }

    /// Add an employee to the attribution directory.
    pub async fn register_employee(&self, id: EmployeeId, first_name: &str, last_name: &str) {
        if let Some(name) = display_name(first_name, last_name) {
            self.state.lock().await.employees.insert(id, name);
        }
    }

    /// Add a customer to the attribution directory.
    pub async fn register_customer(&self, id: CustomerId, first_name: &str, last_name: &str) {
        if let Some(name) = display_name(first_name, last_name) {
            self.state.lock().await.customers.insert(id, name);
        }
    }

    /// Add an order and its public hash to the attribution directory.
    pub async fn register_order(&self, id: OrderId, order_hash: &str) {
        self.state
            .lock()
            .await
            .orders
            .insert(id, order_hash.to_string());
    }
}

#[async_trait]
impl InventoryStore for MemoryInventoryStore {
    async fn list_items(&self, active_only: bool) -> Result<Vec<InventoryItem>, RepositoryError> {
        let state = self.state.lock().await;
        let mut items: Vec<_> = state
            .items
            .values()
            .filter(|item| !active_only || item.is_active)
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            a.item_name
                .cmp(&b.item_name)
                .then(a.item_id.cmp(&b.item_id))
        });
        Ok(items)
    }

    async fn get_item(
        &self,
        item_id: InventoryItemId,
    ) -> Result<Option<InventoryItem>, RepositoryError> {
        Ok(self.state.lock().await.items.get(&item_id).cloned())
    }

    async fn create_item(&self, new: &NewInventoryItem) -> Result<InventoryItem, RepositoryError> {
        let mut state = self.state.lock().await;
        state.atomically(&[], |state| {
            let now = state.now();
            state.last_item_id += 1;
            let item_id = InventoryItemId::new(state.last_item_id);
            state.items.insert(
                item_id,
                InventoryItem {
                    item_id,
                    item_name: new.item_name.clone(),
                    item_description: new.item_description.clone(),
                    unit_of_measure: new.unit_of_measure.clone(),
                    current_quantity: Decimal::ZERO,
                    minimum_quantity: new.minimum_quantity,
                    item_price: new.item_price,
                    is_active: true,
                    created_at: now,
                    updated_at: now,
                },
            );

            if new.initial_quantity > Decimal::ZERO {
                state.apply(&NewTransaction {
                    item_id,
                    transaction_type: TransactionType::Inward,
                    quantity: new.initial_quantity,
                    employee_id: None,
                    customer_id: None,
                    order_id: None,
                    notes: Some(OPENING_BALANCE_NOTE.to_string()),
                })?;
            }

            state
                .items
                .get(&item_id)
                .cloned()
                .ok_or_else(|| RepositoryError::item_not_found(item_id))
        })
    }

    async fn deactivate_item(
        &self,
        item_id: InventoryItemId,
    ) -> Result<Option<InventoryItem>, RepositoryError> {
        let mut state = self.state.lock().await;
        let now = state.now();
        Ok(state.items.get_mut(&item_id).map(|item| {
            if item.is_active {
                item.is_active = false;
                item.updated_at = now;
            }
            item.clone()
        }))
    }

    async fn record_transaction(
        &self,
        transaction: &NewTransaction,
    ) -> Result<InventoryTransaction, RepositoryError> {
        let mut state = self.state.lock().await;
        state.atomically(&[transaction.item_id], |state| state.apply(transaction))
    }

    async fn record_consumption(
        &self,
        consumption: &OrderConsumption,
    ) -> Result<Vec<InventoryTransaction>, RepositoryError> {
        let item_ids = consumption.lock_order();
        let mut state = self.state.lock().await;
        state.atomically(&item_ids, |state| {
            // Resolve every item before writing so a missing one fails cleanly
            for &item_id in &item_ids {
                if !state.items.contains_key(&item_id) {
                    return Err(RepositoryError::item_not_found(item_id));
                }
            }
            consumption
                .movements()
                .iter()
                .map(|movement| state.apply(movement))
                .collect()
        })
    }

    async fn item_history(
        &self,
        item_id: InventoryItemId,
    ) -> Result<Option<Vec<TransactionHistoryEntry>>, RepositoryError> {
        let state = self.state.lock().await;
        if !state.items.contains_key(&item_id) {
            return Ok(None);
        }
        let mut rows: Vec<_> = state
            .transactions
            .iter()
            .filter(|t| t.item_id == item_id)
            .collect();
        rows.sort_by(|a, b| {
            b.transaction_date
                .cmp(&a.transaction_date)
                .then(b.transaction_id.cmp(&a.transaction_id))
        });
        Ok(Some(rows.into_iter().map(|t| state.history_entry(t)).collect()))
    }

    async fn ledger_snapshot(
        &self,
        item_id: InventoryItemId,
    ) -> Result<Option<(InventoryItem, Vec<LedgerEntry>)>, RepositoryError> {
        let state = self.state.lock().await;
        let Some(item) = state.items.get(&item_id).cloned() else {
            return Ok(None);
        };
        let mut rows: Vec<_> = state
            .transactions
            .iter()
            .filter(|t| t.item_id == item_id)
            .collect();
        rows.sort_by(|a, b| {
            a.transaction_date
                .cmp(&b.transaction_date)
                .then(a.transaction_id.cmp(&b.transaction_id))
        });
        let entries = rows.into_iter().map(InventoryTransaction::ledger_entry).collect();
        Ok(Some((item, entries)))
    }

    async fn health_check(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use garage_core::{MovementError, reconcile};

    fn new_item(name: &str, initial: i64) -> NewInventoryItem {
        NewInventoryItem {
            item_name: name.to_string(),
            item_description: None,
            unit_of_measure: "pcs".to_string(),
            initial_quantity: Decimal::from(initial),
            minimum_quantity: Decimal::from(5),
            item_price: Decimal::ZERO,
        }
    }

    fn movement(item_id: InventoryItemId, t: TransactionType, qty: i64) -> NewTransaction {
        NewTransaction {
            item_id,
            transaction_type: t,
            quantity: Decimal::from(qty),
            employee_id: None,
            customer_id: None,
            order_id: None,
            notes: None,
        }
    }

    async fn assert_reconciles(store: &MemoryInventoryStore, item_id: InventoryItemId) {
        let (item, entries) = store.ledger_snapshot(item_id).await.unwrap().unwrap();
        let report = reconcile(&entries, item.current_quantity);
        assert!(report.is_consistent, "{report:?}");
    }

    #[tokio::test]
    async fn test_create_item_writes_opening_balance_row() {
        let store = MemoryInventoryStore::new();
        let item = store.create_item(&new_item("Oil filter", 30)).await.unwrap();
        assert_eq!(item.current_quantity, Decimal::from(30));

        let history = store.item_history(item.item_id).await.unwrap().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].transaction.transaction_type, TransactionType::Inward);
        assert_eq!(history[0].transaction.resulting_quantity, Decimal::from(30));
        assert_eq!(history[0].transaction.notes.as_deref(), Some(OPENING_BALANCE_NOTE));
        assert_reconciles(&store, item.item_id).await;
    }

    #[tokio::test]
    async fn test_create_item_without_stock_has_empty_ledger() {
        let store = MemoryInventoryStore::new();
        let item = store.create_item(&new_item("Wiper", 0)).await.unwrap();
        assert!(store.item_history(item.item_id).await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_outward_leaves_no_trace() {
        let store = MemoryInventoryStore::new();
        let item = store.create_item(&new_item("Coolant", 20)).await.unwrap();

        let err = store
            .record_transaction(&movement(item.item_id, TransactionType::Outward, 25))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::Rejected {
                source: MovementError::InsufficientStock { .. },
                ..
            }
        ));

        let after = store.get_item(item.item_id).await.unwrap().unwrap();
        assert_eq!(after.current_quantity, Decimal::from(20));
        assert_eq!(store.item_history(item.item_id).await.unwrap().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fault_after_balance_update_rolls_back() {
        let store = MemoryInventoryStore::new();
        let item = store.create_item(&new_item("Spark plug", 30)).await.unwrap();

        store.fail_next_write(FaultPoint::AfterBalanceUpdate).await;
        let err = store
            .record_transaction(&movement(item.item_id, TransactionType::Outward, 10))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Unavailable(_)));

        let after = store.get_item(item.item_id).await.unwrap().unwrap();
        assert_eq!(after.current_quantity, Decimal::from(30));
        assert_eq!(store.item_history(item.item_id).await.unwrap().unwrap().len(), 1);
        assert_reconciles(&store, item.item_id).await;
    }

    #[tokio::test]
    async fn test_fault_after_ledger_append_rolls_back() {
        let store = MemoryInventoryStore::new();
        let item = store.create_item(&new_item("Fuse", 30)).await.unwrap();

        store.fail_next_write(FaultPoint::AfterLedgerAppend).await;
        assert!(
            store
                .record_transaction(&movement(item.item_id, TransactionType::Inward, 5))
                .await
                .is_err()
        );

        let after = store.get_item(item.item_id).await.unwrap().unwrap();
        assert_eq!(after.current_quantity, Decimal::from(30));
        assert_eq!(store.item_history(item.item_id).await.unwrap().unwrap().len(), 1);

        // The fault is one-shot
        let ok = store
            .record_transaction(&movement(item.item_id, TransactionType::Inward, 5))
            .await
            .unwrap();
        assert_eq!(ok.resulting_quantity, Decimal::from(35));
        assert_reconciles(&store, item.item_id).await;
    }

    #[tokio::test]
    async fn test_fault_during_create_removes_item() {
        let store = MemoryInventoryStore::new();
        store.fail_next_write(FaultPoint::AfterLedgerAppend).await;
        assert!(store.create_item(&new_item("Bulb", 3)).await.is_err());
        assert!(store.list_items(false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_consumption_is_all_or_nothing() {
        let store = MemoryInventoryStore::new();
        let pads = store.create_item(&new_item("Brake pads", 10)).await.unwrap();
        let fluid = store.create_item(&new_item("Brake fluid", 1)).await.unwrap();

        let consumption = OrderConsumption {
            order_id: OrderId::new(1),
            customer_id: None,
            employee_id: None,
            notes: None,
            materials: vec![
                crate::models::ConsumptionLine {
                    item_id: pads.item_id,
                    quantity: Decimal::from(4),
                },
                crate::models::ConsumptionLine {
                    item_id: fluid.item_id,
                    quantity: Decimal::from(2),
                },
            ],
        };
        assert!(store.record_consumption(&consumption).await.is_err());

        let pads_after = store.get_item(pads.item_id).await.unwrap().unwrap();
        assert_eq!(pads_after.current_quantity, Decimal::from(10));
        assert_eq!(store.item_history(pads.item_id).await.unwrap().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_consumption_restores_only_touched_items() {
        let store = MemoryInventoryStore::new();
        let pads = store.create_item(&new_item("Brake pads", 10)).await.unwrap();
        let fluid = store.create_item(&new_item("Brake fluid", 6)).await.unwrap();
        let filter = store.create_item(&new_item("Cabin filter", 3)).await.unwrap();

        let consumption = OrderConsumption {
            order_id: OrderId::new(5),
            customer_id: None,
            employee_id: None,
            notes: None,
            materials: vec![
                crate::models::ConsumptionLine {
                    item_id: pads.item_id,
                    quantity: Decimal::from(4),
                },
                crate::models::ConsumptionLine {
                    item_id: fluid.item_id,
                    quantity: Decimal::from(7),
                },
            ],
        };

        {
            let state = store.state.lock().await;
            let savepoint = state.savepoint(&consumption.lock_order());
            assert_eq!(savepoint.touched.len(), 2);
            assert!(savepoint.touched.iter().all(|item| item.item_id != filter.item_id));
        }

        // The fluid line overdraws after the pads line has already moved stock
        assert!(store.record_consumption(&consumption).await.is_err());

        for (item, quantity) in [(&pads, 10), (&fluid, 6), (&filter, 3)] {
            let after = store.get_item(item.item_id).await.unwrap().unwrap();
            assert_eq!(after.current_quantity, Decimal::from(quantity));
            assert_reconciles(&store, item.item_id).await;
        }
        assert_eq!(store.list_items(false).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_consumption_lines_on_same_item_see_running_balance() {
        let store = MemoryInventoryStore::new();
        let rags = store.create_item(&new_item("Shop rags", 10)).await.unwrap();
        let line = crate::models::ConsumptionLine {
            item_id: rags.item_id,
            quantity: Decimal::from(4),
        };
        let consumption = OrderConsumption {
            order_id: OrderId::new(2),
            customer_id: None,
            employee_id: None,
            notes: None,
            materials: vec![line, line],
        };
        let rows = store.record_consumption(&consumption).await.unwrap();
        assert_eq!(rows[0].resulting_quantity, Decimal::from(6));
        assert_eq!(rows[1].resulting_quantity, Decimal::from(2));

        let over = OrderConsumption {
            materials: vec![line],
            ..consumption
        };
        assert!(store.record_consumption(&over).await.is_err());
        assert_reconciles(&store, rags.item_id).await;
    }

    #[tokio::test]
    async fn test_history_resolves_directory_names() {
        let store = MemoryInventoryStore::new();
        store.register_employee(EmployeeId::new(1), "Ana", "Silva").await;
        store.register_customer(CustomerId::new(2), "Joe", "Bloggs").await;
        store.register_order(OrderId::new(3), "ORD-7F3A").await;
        let item = store.create_item(&new_item("Tyre", 8)).await.unwrap();

        store
            .record_transaction(&NewTransaction {
                employee_id: Some(EmployeeId::new(1)),
                customer_id: Some(CustomerId::new(2)),
                order_id: Some(OrderId::new(3)),
                ..movement(item.item_id, TransactionType::Outward, 4)
            })
            .await
            .unwrap();
        store
            .record_transaction(&NewTransaction {
                employee_id: Some(EmployeeId::new(99)),
                order_id: Some(OrderId::new(98)),
                ..movement(item.item_id, TransactionType::Outward, 1)
            })
            .await
            .unwrap();

        let history = store.item_history(item.item_id).await.unwrap().unwrap();
        assert_eq!(history.len(), 3);

        // Newest first: unresolvable attribution falls back
        assert_eq!(history[0].employee_name, SYSTEM_EMPLOYEE_NAME);
        assert_eq!(history[0].customer_name, UNKNOWN_CUSTOMER_NAME);
        assert_eq!(history[0].order_reference, None);

        assert_eq!(history[1].employee_name, "Ana Silva");
        assert_eq!(history[1].customer_name, "Joe Bloggs");
        assert_eq!(history[1].order_reference.as_deref(), Some("ORD-7F3A"));

        assert_eq!(history[2].employee_name, SYSTEM_EMPLOYEE_NAME);
    }

    #[tokio::test]
    async fn test_unknown_item() {
        let store = MemoryInventoryStore::new();
        let missing = InventoryItemId::new(404);
        assert!(store.item_history(missing).await.unwrap().is_none());
        assert!(store.deactivate_item(missing).await.unwrap().is_none());
        assert!(matches!(
            store
                .record_transaction(&movement(missing, TransactionType::Inward, 1))
                .await,
            Err(RepositoryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_deactivate_hides_item_from_active_listing() {
        let store = MemoryInventoryStore::new();
        let a = store.create_item(&new_item("Alpha", 1)).await.unwrap();
        store.create_item(&new_item("Beta", 1)).await.unwrap();

        let deactivated = store.deactivate_item(a.item_id).await.unwrap().unwrap();
        assert!(!deactivated.is_active);
        assert!(!store.deactivate_item(a.item_id).await.unwrap().unwrap().is_active);

        let active = store.list_items(true).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].item_name, "Beta");
        assert_eq!(store.list_items(false).await.unwrap().len(), 2);
    }
}
