//! `PostgreSQL` inventory store.
//!
//! Writes run inside one sqlx transaction. The item row is locked with
//! `SELECT ... FOR UPDATE` before the balance is read, so concurrent writers
//! for the same item queue up instead of reading a stale balance. Returning
//! early with `?` drops the transaction, which rolls it back.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

use garage_core::{
    CustomerId, EmployeeId, InventoryItemId, InventoryTransactionId, LedgerEntry, OrderId,
    TransactionType, plan_movement,
};

use super::{InventoryStore, RepositoryError};
use crate::models::inventory::OPENING_BALANCE_NOTE;
use crate::models::{
    InventoryItem, InventoryTransaction, NewInventoryItem, NewTransaction, OrderConsumption,
    TransactionHistoryEntry,
};

const ITEM_COLUMNS: &str = "item_id, item_name, item_description, unit_of_measure, \
     current_quantity, minimum_quantity, item_price, is_active, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "transaction_id, item_id, transaction_type, quantity, \
     resulting_quantity, transaction_date, employee_id, customer_id, order_id, notes";

// =============================================================================
// Internal Row Types
// =============================================================================

// NUMERIC columns come back padded to their declared scale ("960.000"); rows
// are normalized so both stores serialize the same decimal text.

#[derive(Debug, sqlx::FromRow)]
struct ItemRow {
    item_id: i32,
    item_name: String,
    item_description: Option<String>,
    unit_of_measure: String,
    current_quantity: Decimal,
    minimum_quantity: Decimal,
    item_price: Decimal,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ItemRow> for InventoryItem {
    fn from(row: ItemRow) -> Self {
        Self {
            item_id: InventoryItemId::new(row.item_id),
            item_name: row.item_name,
            item_description: row.item_description,
            unit_of_measure: row.unit_of_measure,
            current_quantity: row.current_quantity.normalize(),
            minimum_quantity: row.minimum_quantity.normalize(),
            item_price: row.item_price.normalize(),
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    transaction_id: i32,
    item_id: i32,
    transaction_type: String,
    quantity: Decimal,
    resulting_quantity: Decimal,
    transaction_date: DateTime<Utc>,
    employee_id: Option<i32>,
    customer_id: Option<i32>,
    order_id: Option<i32>,
    notes: Option<String>,
}

fn parse_transaction_type(raw: &str) -> Result<TransactionType, RepositoryError> {
    raw.parse().map_err(RepositoryError::DataCorruption)
}

impl TryFrom<TransactionRow> for InventoryTransaction {
    type Error = RepositoryError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            transaction_id: InventoryTransactionId::new(row.transaction_id),
            item_id: InventoryItemId::new(row.item_id),
            transaction_type: parse_transaction_type(&row.transaction_type)?,
            quantity: row.quantity.normalize(),
            resulting_quantity: row.resulting_quantity.normalize(),
            transaction_date: row.transaction_date,
            employee_id: row.employee_id.map(EmployeeId::new),
            customer_id: row.customer_id.map(CustomerId::new),
            order_id: row.order_id.map(OrderId::new),
            notes: row.notes,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct HistoryRow {
    #[sqlx(flatten)]
    transaction: TransactionRow,
    employee_name: String,
    customer_name: String,
    order_reference: Option<String>,
}

impl TryFrom<HistoryRow> for TransactionHistoryEntry {
    type Error = RepositoryError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            transaction: row.transaction.try_into()?,
            employee_name: row.employee_name,
            customer_name: row.customer_name,
            order_reference: row.order_reference,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LedgerRow {
    transaction_id: i32,
    transaction_type: String,
    quantity: Decimal,
    resulting_quantity: Decimal,
}

impl TryFrom<LedgerRow> for LedgerEntry {
    type Error = RepositoryError;

    fn try_from(row: LedgerRow) -> Result<Self, Self::Error> {
        Ok(Self {
            transaction_id: InventoryTransactionId::new(row.transaction_id),
            transaction_type: parse_transaction_type(&row.transaction_type)?,
            quantity: row.quantity.normalize(),
            resulting_quantity: row.resulting_quantity.normalize(),
        })
    }
}

// =============================================================================
// Statement helpers (run on a connection inside an open transaction)
// =============================================================================

/// Lock an item row for the rest of the transaction.
async fn lock_item(
    conn: &mut PgConnection,
    item_id: InventoryItemId,
) -> Result<InventoryItem, RepositoryError> {
    let row = sqlx::query_as::<_, ItemRow>(&format!(
        "SELECT {ITEM_COLUMNS} FROM inventory_items WHERE item_id = $1 FOR UPDATE"
    ))
    .bind(item_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(Into::into)
        .ok_or_else(|| RepositoryError::item_not_found(item_id))
}

/// Apply one movement to a locked item whose balance is `current_quantity`.
///
/// Returns the appended ledger row; its `resulting_quantity` is the new balance.
async fn apply_movement(
    conn: &mut PgConnection,
    current_quantity: Decimal,
    movement: &NewTransaction,
) -> Result<InventoryTransaction, RepositoryError> {
    let resulting_quantity = plan_movement(
        current_quantity,
        movement.transaction_type,
        movement.quantity,
    )
    .map_err(|source| RepositoryError::Rejected {
        item_id: movement.item_id,
        source,
    })?;

    sqlx::query(
        "UPDATE inventory_items SET current_quantity = $2, updated_at = NOW() WHERE item_id = $1",
    )
    .bind(movement.item_id)
    .bind(resulting_quantity)
    .execute(&mut *conn)
    .await?;

    // clock_timestamp(), not NOW(): a writer that waited on the row lock must
    // sort after the writer it waited for.
    let row = sqlx::query_as::<_, TransactionRow>(&format!(
        "INSERT INTO inventory_transactions (
            item_id, transaction_type, quantity, resulting_quantity,
            employee_id, customer_id, order_id, notes, transaction_date
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, clock_timestamp())
        RETURNING {TRANSACTION_COLUMNS}"
    ))
    .bind(movement.item_id)
    .bind(movement.transaction_type.as_str())
    .bind(movement.quantity)
    .bind(resulting_quantity)
    .bind(movement.employee_id)
    .bind(movement.customer_id)
    .bind(movement.order_id)
    .bind(movement.notes.as_deref())
    .fetch_one(&mut *conn)
    .await?;

    row.try_into()
}

// =============================================================================
// Store
// =============================================================================

/// Inventory store backed by a `PostgreSQL` pool.
#[derive(Debug, Clone)]
pub struct PgInventoryStore {
    pool: PgPool,
}

impl PgInventoryStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl InventoryStore for PgInventoryStore {
    async fn list_items(&self, active_only: bool) -> Result<Vec<InventoryItem>, RepositoryError> {
        let rows = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM inventory_items
             WHERE (NOT $1 OR is_active)
             ORDER BY item_name, item_id"
        ))
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_item(
        &self,
        item_id: InventoryItemId,
    ) -> Result<Option<InventoryItem>, RepositoryError> {
        let row = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM inventory_items WHERE item_id = $1"
        ))
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn create_item(&self, new: &NewInventoryItem) -> Result<InventoryItem, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, ItemRow>(&format!(
            "INSERT INTO inventory_items (
                item_name, item_description, unit_of_measure,
                current_quantity, minimum_quantity, item_price
            )
            VALUES ($1, $2, $3, 0, $4, $5)
            RETURNING {ITEM_COLUMNS}"
        ))
        .bind(&new.item_name)
        .bind(new.item_description.as_deref())
        .bind(&new.unit_of_measure)
        .bind(new.minimum_quantity)
        .bind(new.item_price)
        .fetch_one(&mut *tx)
        .await?;
        let mut item = InventoryItem::from(row);

        if new.initial_quantity > Decimal::ZERO {
            let opening = apply_movement(
                &mut tx,
                item.current_quantity,
                &NewTransaction {
                    item_id: item.item_id,
                    transaction_type: TransactionType::Inward,
                    quantity: new.initial_quantity,
                    employee_id: None,
                    customer_id: None,
                    order_id: None,
                    notes: Some(OPENING_BALANCE_NOTE.to_string()),
                },
            )
            .await?;
            item.current_quantity = opening.resulting_quantity;
            item.updated_at = opening.transaction_date;
        }

        tx.commit().await?;
        Ok(item)
    }

    async fn deactivate_item(
        &self,
        item_id: InventoryItemId,
    ) -> Result<Option<InventoryItem>, RepositoryError> {
        // Only touch updated_at when the flag actually changes
        let row = sqlx::query_as::<_, ItemRow>(&format!(
            "UPDATE inventory_items
             SET is_active = FALSE,
                 updated_at = CASE WHEN is_active THEN NOW() ELSE updated_at END
             WHERE item_id = $1
             RETURNING {ITEM_COLUMNS}"
        ))
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    #[tracing::instrument(skip(self, transaction), fields(item_id = %transaction.item_id))]
    async fn record_transaction(
        &self,
        transaction: &NewTransaction,
    ) -> Result<InventoryTransaction, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let item = lock_item(&mut tx, transaction.item_id).await?;
        let row = apply_movement(&mut tx, item.current_quantity, transaction).await?;

        tx.commit().await?;
        Ok(row)
    }

    #[tracing::instrument(skip(self, consumption), fields(order_id = %consumption.order_id))]
    async fn record_consumption(
        &self,
        consumption: &OrderConsumption,
    ) -> Result<Vec<InventoryTransaction>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // Ascending lock order keeps concurrent consumptions from deadlocking
        let mut balances = HashMap::new();
        for item_id in consumption.lock_order() {
            let item = lock_item(&mut tx, item_id).await?;
            balances.insert(item_id, item.current_quantity);
        }

        let mut rows = Vec::with_capacity(consumption.materials.len());
        for movement in consumption.movements() {
            let current = balances
                .get(&movement.item_id)
                .copied()
                .ok_or_else(|| RepositoryError::item_not_found(movement.item_id))?;
            let row = apply_movement(&mut tx, current, &movement).await?;
            balances.insert(movement.item_id, row.resulting_quantity);
            rows.push(row);
        }

        tx.commit().await?;
        Ok(rows)
    }

    async fn item_history(
        &self,
        item_id: InventoryItemId,
    ) -> Result<Option<Vec<TransactionHistoryEntry>>, RepositoryError> {
        if self.get_item(item_id).await?.is_none() {
            return Ok(None);
        }

        let rows = sqlx::query_as::<_, HistoryRow>(
            "SELECT
                t.transaction_id, t.item_id, t.transaction_type, t.quantity,
                t.resulting_quantity, t.transaction_date,
                t.employee_id, t.customer_id, t.order_id, t.notes,
                COALESCE(NULLIF(btrim(concat_ws(' ', btrim(e.first_name), btrim(e.last_name))), ''), 'System')
                    AS employee_name,
                COALESCE(NULLIF(btrim(concat_ws(' ', btrim(c.first_name), btrim(c.last_name))), ''), 'N/A')
                    AS customer_name,
                o.order_hash AS order_reference
            FROM inventory_transactions t
            LEFT JOIN employees e ON e.employee_id = t.employee_id
            LEFT JOIN customers c ON c.customer_id = t.customer_id
            LEFT JOIN orders o ON o.order_id = t.order_id
            WHERE t.item_id = $1
            ORDER BY t.transaction_date DESC, t.transaction_id DESC",
        )
        .bind(item_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(TransactionHistoryEntry::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    async fn ledger_snapshot(
        &self,
        item_id: InventoryItemId,
    ) -> Result<Option<(InventoryItem, Vec<LedgerEntry>)>, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let item = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM inventory_items WHERE item_id = $1"
        ))
        .bind(item_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(item) = item else {
            return Ok(None);
        };

        let rows = sqlx::query_as::<_, LedgerRow>(
            "SELECT transaction_id, transaction_type, quantity, resulting_quantity
             FROM inventory_transactions
             WHERE item_id = $1
             ORDER BY transaction_date, transaction_id",
        )
        .bind(item_id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let entries = rows
            .into_iter()
            .map(LedgerEntry::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some((item.into(), entries)))
    }

    async fn health_check(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
