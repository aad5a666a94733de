//! Inventory catalog, stock ledger and reporting operations.
//!
//! The service validates input, delegates persistence to an
//! [`InventoryStore`], and translates storage failures into
//! [`InventoryError`] kinds. Stock arithmetic itself lives in
//! [`garage_core::ledger`] and runs inside the store's lock.

use std::sync::Arc;

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::instrument;

use garage_core::{InventoryItemId, MAX_QUANTITY, MovementError, reconcile};

use crate::db::{InventoryStore, RepositoryError};
use crate::models::inventory::DEFAULT_UNIT_OF_MEASURE;
use crate::models::{
    InventoryTransaction, ItemReconciliation, ItemSummary, NewInventoryItem, NewTransaction,
    OrderConsumption, TransactionHistoryEntry,
};

/// Decimal places stored for quantities (`NUMERIC(14,3)`).
const QUANTITY_SCALE: u32 = 3;

/// Decimal places stored for prices (`NUMERIC(12,2)`).
const PRICE_SCALE: u32 = 2;

/// Largest price a `NUMERIC(12,2)` column can hold.
const MAX_PRICE: Decimal = Decimal::from_parts(0xD4A5_0FFF, 232, 0, false, 2);

/// Errors returned by inventory operations.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// Malformed input: missing name, negative or non-numeric quantity.
    #[error("{0}")]
    Validation(String),

    /// The referenced item does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// An outward movement would drive the balance below zero.
    #[error(
        "insufficient stock for item {item_id}: {available} available, {requested} requested"
    )]
    InsufficientStock {
        item_id: InventoryItemId,
        available: Decimal,
        requested: Decimal,
    },

    /// The store failed; nothing was committed and the call may be retried.
    #[error("persistence error: {0}")]
    Persistence(RepositoryError),
}

impl From<RepositoryError> for InventoryError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(what) => Self::NotFound(what),
            RepositoryError::Rejected { item_id, source } => match source {
                MovementError::InsufficientStock {
                    available,
                    requested,
                } => Self::InsufficientStock {
                    item_id,
                    available,
                    requested,
                },
                MovementError::NonPositiveQuantity(_) | MovementError::OutOfRange => {
                    Self::Validation(source.to_string())
                }
            },
            other => Self::Persistence(other),
        }
    }
}

fn item_not_found(item_id: InventoryItemId) -> InventoryError {
    InventoryError::NotFound(format!("inventory item {item_id}"))
}

fn validate_amount(
    value: Decimal,
    field: &str,
    scale: u32,
    max: Decimal,
) -> Result<(), InventoryError> {
    if value < Decimal::ZERO {
        return Err(InventoryError::Validation(format!(
            "{field} cannot be negative"
        )));
    }
    if value.normalize().scale() > scale {
        return Err(InventoryError::Validation(format!(
            "{field} supports at most {scale} decimal places"
        )));
    }
    if value > max {
        return Err(InventoryError::Validation(format!(
            "{field} cannot exceed {max}"
        )));
    }
    Ok(())
}

/// A positive movement magnitude the ledger can store exactly.
fn validate_movement_quantity(quantity: Decimal) -> Result<(), InventoryError> {
    if quantity <= Decimal::ZERO {
        return Err(InventoryError::Validation(
            MovementError::NonPositiveQuantity(quantity).to_string(),
        ));
    }
    validate_amount(quantity, "quantity", QUANTITY_SCALE, MAX_QUANTITY)
}

/// Inventory operations over a shared store.
#[derive(Clone)]
pub struct InventoryService {
    store: Arc<dyn InventoryStore>,
}

impl std::fmt::Debug for InventoryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InventoryService").finish_non_exhaustive()
    }
}

impl InventoryService {
    /// Create a service over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn InventoryStore>) -> Self {
        Self { store }
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    /// List catalog items with their derived stock status.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError::Persistence` if the store fails.
    #[instrument(skip(self))]
    pub async fn list_items(&self, active_only: bool) -> Result<Vec<ItemSummary>, InventoryError> {
        let items = self.store.list_items(active_only).await?;
        Ok(items.into_iter().map(ItemSummary::from).collect())
    }

    /// Active items that are low or out of stock, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError::Persistence` if the store fails.
    #[instrument(skip(self))]
    pub async fn list_low_stock(&self) -> Result<Vec<ItemSummary>, InventoryError> {
        let items = self.list_items(true).await?;
        Ok(items
            .into_iter()
            .filter(|summary| summary.stock_status.needs_restock())
            .collect())
    }

    /// Fetch one item.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError::NotFound` for an unknown item.
    #[instrument(skip_all, fields(item_id = %item_id))]
    pub async fn get_item(&self, item_id: InventoryItemId) -> Result<ItemSummary, InventoryError> {
        self.store
            .get_item(item_id)
            .await?
            .map(ItemSummary::from)
            .ok_or_else(|| item_not_found(item_id))
    }

    /// Add a catalog item. A positive initial quantity becomes an inward
    /// opening-balance ledger row.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError::Validation` for a blank name or a negative,
    /// oversized or over-precise quantity or price.
    #[instrument(skip(self, item), fields(item_name = %item.item_name))]
    pub async fn add_item(&self, item: NewInventoryItem) -> Result<ItemSummary, InventoryError> {
        let item = Self::validate_new_item(item)?;
        let created = self.store.create_item(&item).await?;
        tracing::info!(
            item_id = %created.item_id,
            initial_quantity = %created.current_quantity,
            "Inventory item added"
        );
        Ok(created.into())
    }

    fn validate_new_item(item: NewInventoryItem) -> Result<NewInventoryItem, InventoryError> {
        let item_name = item.item_name.trim().to_string();
        if item_name.is_empty() {
            return Err(InventoryError::Validation(
                "item_name is required".to_string(),
            ));
        }

        validate_amount(
            item.initial_quantity,
            "initial_quantity",
            QUANTITY_SCALE,
            MAX_QUANTITY,
        )?;
        validate_amount(
            item.minimum_quantity,
            "minimum_quantity",
            QUANTITY_SCALE,
            MAX_QUANTITY,
        )?;
        validate_amount(item.item_price, "item_price", PRICE_SCALE, MAX_PRICE)?;

        let unit_of_measure = match item.unit_of_measure.trim() {
            "" => DEFAULT_UNIT_OF_MEASURE.to_string(),
            unit => unit.to_string(),
        };
        let item_description = item
            .item_description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        Ok(NewInventoryItem {
            item_name,
            item_description,
            unit_of_measure,
            ..item
        })
    }

    /// Deactivate an item. Idempotent; its ledger is untouched.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError::NotFound` for an unknown item.
    #[instrument(skip_all, fields(item_id = %item_id))]
    pub async fn deactivate_item(
        &self,
        item_id: InventoryItemId,
    ) -> Result<ItemSummary, InventoryError> {
        let item = self
            .store
            .deactivate_item(item_id)
            .await?
            .ok_or_else(|| item_not_found(item_id))?;
        tracing::info!(item_id = %item_id, "Inventory item deactivated");
        Ok(item.into())
    }

    // =========================================================================
    // Ledger
    // =========================================================================

    /// Record one stock movement and return the appended ledger row.
    ///
    /// # Errors
    ///
    /// - `InventoryError::NotFound` for an unknown item
    /// - `InventoryError::Validation` for a non-positive quantity
    /// - `InventoryError::InsufficientStock` if an outward movement exceeds the balance
    /// - `InventoryError::Persistence` if the write fails (nothing is committed)
    #[instrument(
        skip(self, transaction),
        fields(
            item_id = %transaction.item_id,
            transaction_type = %transaction.transaction_type,
            quantity = %transaction.quantity,
        )
    )]
    pub async fn record_transaction(
        &self,
        transaction: NewTransaction,
    ) -> Result<InventoryTransaction, InventoryError> {
        // Non-positive quantities are rejected by the ledger after the item
        // lookup, so an unknown item still reports NotFound first.
        if transaction.quantity > Decimal::ZERO {
            validate_movement_quantity(transaction.quantity)?;
        }

        let recorded = self.store.record_transaction(&transaction).await?;
        tracing::info!(
            transaction_id = %recorded.transaction_id,
            resulting_quantity = %recorded.resulting_quantity,
            "Inventory transaction recorded"
        );
        Ok(recorded)
    }

    /// Record the materials consumed by a service order, all or nothing.
    ///
    /// # Errors
    ///
    /// Same as [`Self::record_transaction`], for any line. An empty material
    /// list is `InventoryError::Validation`.
    #[instrument(
        skip(self, consumption),
        fields(order_id = %consumption.order_id, lines = consumption.materials.len())
    )]
    pub async fn record_consumption(
        &self,
        consumption: OrderConsumption,
    ) -> Result<Vec<InventoryTransaction>, InventoryError> {
        if consumption.materials.is_empty() {
            return Err(InventoryError::Validation(
                "materials must list at least one item".to_string(),
            ));
        }
        for line in &consumption.materials {
            if line.quantity > Decimal::ZERO {
                validate_movement_quantity(line.quantity)?;
            }
        }

        let recorded = self.store.record_consumption(&consumption).await?;
        tracing::info!(rows = recorded.len(), "Order consumption recorded");
        Ok(recorded)
    }

    // =========================================================================
    // Reporting
    // =========================================================================

    /// An item's ledger, newest first, with attribution resolved to names.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError::NotFound` for an unknown item.
    #[instrument(skip_all, fields(item_id = %item_id))]
    pub async fn item_history(
        &self,
        item_id: InventoryItemId,
    ) -> Result<Vec<TransactionHistoryEntry>, InventoryError> {
        self.store
            .item_history(item_id)
            .await?
            .ok_or_else(|| item_not_found(item_id))
    }

    /// Replay an item's ledger and compare it with the cached balance.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError::NotFound` for an unknown item.
    #[instrument(skip_all, fields(item_id = %item_id))]
    pub async fn reconcile_item(
        &self,
        item_id: InventoryItemId,
    ) -> Result<ItemReconciliation, InventoryError> {
        let (item, entries) = self
            .store
            .ledger_snapshot(item_id)
            .await?
            .ok_or_else(|| item_not_found(item_id))?;

        let report = reconcile(&entries, item.current_quantity);
        if !report.is_consistent {
            tracing::warn!(
                item_id = %item_id,
                replayed = %report.replayed_quantity,
                recorded = %report.recorded_quantity,
                first_divergence = ?report.first_divergence,
                "Inventory ledger does not reconcile"
            );
        }

        Ok(ItemReconciliation {
            item_id,
            item_name: item.item_name,
            report,
        })
    }

    /// Reconcile every item, including deactivated ones.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError::Persistence` if the store fails.
    #[instrument(skip(self))]
    pub async fn reconcile_all(&self) -> Result<Vec<ItemReconciliation>, InventoryError> {
        let items = self.store.list_items(false).await?;
        let mut reports = Vec::with_capacity(items.len());
        for item in items {
            match self.reconcile_item(item.item_id).await {
                Ok(report) => reports.push(report),
                // Cannot happen today since items are never deleted
                Err(InventoryError::NotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(reports)
    }

    /// Check that the store is reachable.
    ///
    /// # Errors
    ///
    /// Returns `InventoryError::Persistence` if it is not.
    pub async fn health_check(&self) -> Result<(), InventoryError> {
        self.store
            .health_check()
            .await
            .map_err(InventoryError::Persistence)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::db::{FaultPoint, MemoryInventoryStore};
    use crate::models::ConsumptionLine;
    use garage_core::{OrderId, StockStatus, TransactionType};

    fn service() -> (InventoryService, Arc<MemoryInventoryStore>) {
        let store = Arc::new(MemoryInventoryStore::new());
        (InventoryService::new(store.clone()), store)
    }

    fn new_item(name: &str, initial: Decimal, minimum: Decimal) -> NewInventoryItem {
        NewInventoryItem {
            item_name: name.to_string(),
            item_description: None,
            unit_of_measure: String::new(),
            initial_quantity: initial,
            minimum_quantity: minimum,
            item_price: Decimal::ZERO,
        }
    }

    fn movement(item_id: InventoryItemId, t: TransactionType, qty: Decimal) -> NewTransaction {
        NewTransaction {
            item_id,
            transaction_type: t,
            quantity: qty,
            employee_id: None,
            customer_id: None,
            order_id: None,
            notes: None,
        }
    }

    fn d(n: i64) -> Decimal {
        Decimal::from(n)
    }

    #[tokio::test]
    async fn test_scenario_outward_within_stock() {
        let (svc, _) = service();
        let item = svc.add_item(new_item("Oil filter", d(30), d(5))).await.unwrap();

        let row = svc
            .record_transaction(movement(item.item.item_id, TransactionType::Outward, d(10)))
            .await
            .unwrap();
        assert_eq!(row.resulting_quantity, d(20));

        let after = svc.get_item(item.item.item_id).await.unwrap();
        assert_eq!(after.item.current_quantity, d(20));
        assert_eq!(after.stock_status, StockStatus::InStock);

        let history = svc.item_history(item.item.item_id).await.unwrap();
        let outward: Vec<_> = history
            .iter()
            .filter(|h| h.transaction.transaction_type == TransactionType::Outward)
            .collect();
        assert_eq!(outward.len(), 1);
        assert_eq!(outward[0].transaction.resulting_quantity, d(20));
    }

    #[tokio::test]
    async fn test_scenario_outward_beyond_stock() {
        let (svc, _) = service();
        let item = svc.add_item(new_item("Coolant", d(20), d(5))).await.unwrap();
        let id = item.item.item_id;

        let err = svc
            .record_transaction(movement(id, TransactionType::Outward, d(25)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            InventoryError::InsufficientStock { available, requested, .. }
                if available == d(20) && requested == d(25)
        ));
        assert_eq!(svc.get_item(id).await.unwrap().item.current_quantity, d(20));
        assert_eq!(svc.item_history(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_scenario_status_thresholds() {
        let (svc, _) = service();
        let empty = svc.add_item(new_item("Empty", d(0), d(5))).await.unwrap();
        let low = svc.add_item(new_item("Low", d(4), d(5))).await.unwrap();
        assert_eq!(empty.stock_status, StockStatus::OutOfStock);
        assert_eq!(low.stock_status, StockStatus::LowStock);

        let low_stock = svc.list_low_stock().await.unwrap();
        assert_eq!(low_stock.len(), 2);
    }

    #[tokio::test]
    async fn test_scenario_negative_inward_is_validation_error() {
        let (svc, _) = service();
        let item = svc.add_item(new_item("Fuse", d(10), d(0))).await.unwrap();
        let id = item.item.item_id;

        let err = svc
            .record_transaction(movement(id, TransactionType::Inward, d(-5)))
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::Validation(_)));
        assert_eq!(svc.get_item(id).await.unwrap().item.current_quantity, d(10));
        assert_eq!(svc.item_history(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_item_reports_not_found_before_validation() {
        let (svc, _) = service();
        let err = svc
            .record_transaction(movement(
                InventoryItemId::new(77),
                TransactionType::Inward,
                d(-5),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_add_item_validation() {
        let (svc, _) = service();
        let cases = [
            new_item("   ", d(1), d(0)),
            new_item("Bolt", d(-1), d(0)),
            new_item("Bolt", d(1), d(-1)),
            NewInventoryItem {
                item_price: d(-1),
                ..new_item("Bolt", d(1), d(0))
            },
            new_item("Bolt", Decimal::new(1, 4), d(0)),
            NewInventoryItem {
                item_price: Decimal::new(1001, 3),
                ..new_item("Bolt", d(1), d(0))
            },
        ];
        for case in cases {
            assert!(
                matches!(svc.add_item(case.clone()).await, Err(InventoryError::Validation(_))),
                "{case:?}"
            );
        }
        assert!(svc.list_items(false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_item_normalizes_text_fields() {
        let (svc, _) = service();
        let item = svc
            .add_item(NewInventoryItem {
                item_description: Some("  ".to_string()),
                ..new_item("  Hose clamp ", d(3), d(1))
            })
            .await
            .unwrap();
        assert_eq!(item.item.item_name, "Hose clamp");
        assert_eq!(item.item.unit_of_measure, DEFAULT_UNIT_OF_MEASURE);
        assert_eq!(item.item.item_description, None);
    }

    #[tokio::test]
    async fn test_over_precise_quantity_is_rejected() {
        let (svc, _) = service();
        let item = svc.add_item(new_item("Grease", d(1), d(0))).await.unwrap();
        let err = svc
            .record_transaction(movement(
                item.item.item_id,
                TransactionType::Inward,
                Decimal::new(1, 4),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::Validation(_)));
    }

    #[tokio::test]
    async fn test_persistence_failure_is_reported_and_rolled_back() {
        let (svc, store) = service();
        let item = svc.add_item(new_item("Bulb", d(30), d(5))).await.unwrap();
        let id = item.item.item_id;

        store.fail_next_write(FaultPoint::AfterBalanceUpdate).await;
        let err = svc
            .record_transaction(movement(id, TransactionType::Outward, d(10)))
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::Persistence(_)));

        assert_eq!(svc.get_item(id).await.unwrap().item.current_quantity, d(30));
        assert!(svc.reconcile_item(id).await.unwrap().report.is_consistent);
    }

    #[tokio::test]
    async fn test_consumption_requires_materials() {
        let (svc, _) = service();
        let err = svc
            .record_consumption(OrderConsumption {
                order_id: OrderId::new(1),
                customer_id: None,
                employee_id: None,
                notes: None,
                materials: vec![],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::Validation(_)));
    }

    #[tokio::test]
    async fn test_consumption_with_unknown_item_writes_nothing() {
        let (svc, _) = service();
        let pads = svc.add_item(new_item("Pads", d(10), d(2))).await.unwrap();
        let err = svc
            .record_consumption(OrderConsumption {
                order_id: OrderId::new(1),
                customer_id: None,
                employee_id: None,
                notes: None,
                materials: vec![
                    ConsumptionLine {
                        item_id: pads.item.item_id,
                        quantity: d(2),
                    },
                    ConsumptionLine {
                        item_id: InventoryItemId::new(999),
                        quantity: d(1),
                    },
                ],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::NotFound(_)));
        assert_eq!(
            svc.get_item(pads.item.item_id).await.unwrap().item.current_quantity,
            d(10)
        );
    }

    #[tokio::test]
    async fn test_reconcile_all_after_mixed_activity() {
        let (svc, _) = service();
        let a = svc.add_item(new_item("A", d(10), d(0))).await.unwrap();
        let b = svc.add_item(new_item("B", d(0), d(0))).await.unwrap();
        svc.record_transaction(movement(a.item.item_id, TransactionType::Outward, d(3)))
            .await
            .unwrap();
        svc.record_transaction(movement(b.item.item_id, TransactionType::Inward, d(7)))
            .await
            .unwrap();
        svc.deactivate_item(b.item.item_id).await.unwrap();

        let reports = svc.reconcile_all().await.unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.report.is_consistent));
        assert_eq!(reports[0].report.replayed_quantity, d(7));
        assert_eq!(reports[1].report.replayed_quantity, d(7));
    }

    #[tokio::test]
    async fn test_repeated_listing_is_stable() {
        let (svc, _) = service();
        svc.add_item(new_item("X", d(4), d(5))).await.unwrap();
        svc.add_item(new_item("Y", d(9), d(5))).await.unwrap();
        let first = svc.list_items(true).await.unwrap();
        let second = svc.list_items(true).await.unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_repository_error_mapping() {
        let err = InventoryError::from(RepositoryError::Rejected {
            item_id: InventoryItemId::new(1),
            source: MovementError::NonPositiveQuantity(Decimal::ZERO),
        });
        assert!(matches!(err, InventoryError::Validation(_)));

        let err = InventoryError::from(RepositoryError::Unavailable("down".to_string()));
        assert!(matches!(err, InventoryError::Persistence(_)));

        let err = InventoryError::from(RepositoryError::NotFound("inventory item 4".to_string()));
        assert_eq!(err.to_string(), "inventory item 4 not found");
    }

    #[test]
    fn test_max_price_matches_column() {
        assert_eq!(MAX_PRICE.to_string(), "9999999999.99");
    }
}
