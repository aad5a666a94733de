//! Inventory catalog and ledger domain models.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::{self, Deserializer, MapAccess, Unexpected, Visitor, value::MapAccessDeserializer};
use serde::{Deserialize, Serialize};

use garage_core::{
    CustomerId, EmployeeId, InventoryItemId, InventoryTransactionId, LedgerEntry, OrderId,
    Reconciliation, StockStatus, TransactionType,
};

/// Unit recorded when an item is added without one.
pub const DEFAULT_UNIT_OF_MEASURE: &str = "pcs";

/// Note attached to the inward row that carries an item's initial stock.
pub const OPENING_BALANCE_NOTE: &str = "Opening balance";

/// Display name for ledger rows without a resolvable employee.
pub const SYSTEM_EMPLOYEE_NAME: &str = "System";

/// Display name for ledger rows without a resolvable customer.
pub const UNKNOWN_CUSTOMER_NAME: &str = "N/A";

/// A stocked material or consumable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub item_id: InventoryItemId,
    pub item_name: String,
    pub item_description: Option<String>,
    pub unit_of_measure: String,
    /// Cached running balance of the item's ledger.
    pub current_quantity: Decimal,
    /// Reorder threshold.
    pub minimum_quantity: Decimal,
    pub item_price: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryItem {
    /// Stock level classification, derived on every call.
    #[must_use]
    pub fn stock_status(&self) -> StockStatus {
        StockStatus::classify(self.current_quantity, self.minimum_quantity)
    }
}

/// An item as returned to clients, with its derived stock status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemSummary {
    #[serde(flatten)]
    pub item: InventoryItem,
    pub stock_status: StockStatus,
}

impl From<InventoryItem> for ItemSummary {
    fn from(item: InventoryItem) -> Self {
        let stock_status = item.stock_status();
        Self { item, stock_status }
    }
}

/// One immutable row of the stock ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryTransaction {
    pub transaction_id: InventoryTransactionId,
    pub item_id: InventoryItemId,
    pub transaction_type: TransactionType,
    /// Positive movement magnitude.
    pub quantity: Decimal,
    /// Item balance immediately after this movement.
    pub resulting_quantity: Decimal,
    pub transaction_date: DateTime<Utc>,
    pub employee_id: Option<EmployeeId>,
    pub customer_id: Option<CustomerId>,
    pub order_id: Option<OrderId>,
    pub notes: Option<String>,
}

impl InventoryTransaction {
    /// The fields ledger replay needs.
    #[must_use]
    pub const fn ledger_entry(&self) -> LedgerEntry {
        LedgerEntry {
            transaction_id: self.transaction_id,
            transaction_type: self.transaction_type,
            quantity: self.quantity,
            resulting_quantity: self.resulting_quantity,
        }
    }
}

/// A ledger row with attribution resolved to display names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionHistoryEntry {
    #[serde(flatten)]
    pub transaction: InventoryTransaction,
    pub employee_name: String,
    pub customer_name: String,
    pub order_reference: Option<String>,
}

/// Join a first and last name, returning `None` when both are blank.
#[must_use]
pub fn display_name(first_name: &str, last_name: &str) -> Option<String> {
    let joined = format!("{} {}", first_name.trim(), last_name.trim());
    let joined = joined.trim();
    (!joined.is_empty()).then(|| joined.to_string())
}

/// Validated input for adding a catalog item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInventoryItem {
    pub item_name: String,
    pub item_description: Option<String>,
    pub unit_of_measure: String,
    pub initial_quantity: Decimal,
    pub minimum_quantity: Decimal,
    pub item_price: Decimal,
}

/// A single stock movement to record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub item_id: InventoryItemId,
    pub transaction_type: TransactionType,
    pub quantity: Decimal,
    pub employee_id: Option<EmployeeId>,
    pub customer_id: Option<CustomerId>,
    pub order_id: Option<OrderId>,
    pub notes: Option<String>,
}

/// Materials consumed by a service order, written as one unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderConsumption {
    pub order_id: OrderId,
    pub customer_id: Option<CustomerId>,
    pub employee_id: Option<EmployeeId>,
    pub notes: Option<String>,
    pub materials: Vec<ConsumptionLine>,
}

impl OrderConsumption {
    /// Outward movements for each line, in request order.
    #[must_use]
    pub fn movements(&self) -> Vec<NewTransaction> {
        self.materials
            .iter()
            .map(|line| NewTransaction {
                item_id: line.item_id,
                transaction_type: TransactionType::Outward,
                quantity: line.quantity,
                employee_id: self.employee_id,
                customer_id: self.customer_id,
                order_id: Some(self.order_id),
                notes: self.notes.clone(),
            })
            .collect()
    }

    /// Distinct item IDs in ascending order, the order rows are locked in.
    #[must_use]
    pub fn lock_order(&self) -> Vec<InventoryItemId> {
        let mut ids: Vec<_> = self.materials.iter().map(|line| line.item_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

/// One consumed material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumptionLine {
    pub item_id: InventoryItemId,
    pub quantity: Decimal,
}

/// Reconciliation report for one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemReconciliation {
    pub item_id: InventoryItemId,
    pub item_name: String,
    #[serde(flatten)]
    pub report: Reconciliation,
}

// =============================================================================
// Request bodies
// =============================================================================

/// A quantity as sent by clients: either a JSON number or a decimal string.
///
/// JSON numbers keep their source text, so `1.0000000000000001` is not
/// rounded through `f64` on the way in.
#[derive(Debug, Clone, PartialEq)]
pub enum QuantityInput {
    Number(serde_json::Number),
    Text(String),
}

impl<'de> Deserialize<'de> for QuantityInput {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(QuantityVisitor)
    }
}

struct QuantityVisitor;

impl<'de> Visitor<'de> for QuantityVisitor {
    type Value = QuantityInput;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a number or a decimal string")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(QuantityInput::Number(v.into()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(QuantityInput::Number(v.into()))
    }

    // Only non-JSON sources (YAML seed files) arrive here.
    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        serde_json::Number::from_f64(v)
            .map(QuantityInput::Number)
            .ok_or_else(|| E::invalid_value(Unexpected::Float(v), &self))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(QuantityInput::Text(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
        Ok(QuantityInput::Text(v))
    }

    // serde_json hands exact-precision numbers over as a single-entry map.
    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Self::Value, A::Error> {
        serde_json::Number::deserialize(MapAccessDeserializer::new(map)).map(QuantityInput::Number)
    }
}

impl QuantityInput {
    /// Parse into an exact decimal.
    ///
    /// # Errors
    ///
    /// Returns a message naming `field` if the value is not a finite decimal.
    pub fn to_decimal(&self, field: &str) -> Result<Decimal, String> {
        let raw = match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.trim().to_string(),
        };
        // Decimal::from_str skips digit separators; clients must not send them.
        if raw.contains('_') {
            return Err(format!("{field} must be a number (got {raw:?})"));
        }
        raw.parse::<Decimal>()
            .or_else(|_| Decimal::from_scientific(&raw))
            .map(|d| d.normalize())
            .map_err(|_| format!("{field} must be a number (got {raw:?})"))
    }
}

/// Parse an optional quantity, defaulting to zero.
///
/// # Errors
///
/// Returns a message naming `field` if the value is present but not a decimal.
pub fn optional_decimal(input: Option<&QuantityInput>, field: &str) -> Result<Decimal, String> {
    input.map_or(Ok(Decimal::ZERO), |q| q.to_decimal(field))
}

/// Body of `POST /api/inventory`.
#[derive(Debug, Clone, Deserialize)]
pub struct AddItemRequest {
    pub item_name: Option<String>,
    pub item_description: Option<String>,
    pub unit_of_measure: Option<String>,
    #[serde(alias = "current_quantity")]
    pub initial_quantity: Option<QuantityInput>,
    pub minimum_quantity: Option<QuantityInput>,
    pub item_price: Option<QuantityInput>,
}

/// Body of `POST /api/inventory/transaction`.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionRequest {
    pub item_id: InventoryItemId,
    pub transaction_type: String,
    pub quantity: QuantityInput,
    pub employee_id: Option<EmployeeId>,
    pub customer_id: Option<CustomerId>,
    pub order_id: Option<OrderId>,
    pub notes: Option<String>,
}

/// Body of `POST /api/inventory/consumption`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsumptionRequest {
    pub order_id: OrderId,
    pub customer_id: Option<CustomerId>,
    pub employee_id: Option<EmployeeId>,
    pub notes: Option<String>,
    #[serde(default)]
    pub materials: Vec<ConsumptionLineRequest>,
}

/// One line of a [`ConsumptionRequest`].
#[derive(Debug, Clone, Deserialize)]
pub struct ConsumptionLineRequest {
    pub item_id: InventoryItemId,
    pub quantity: QuantityInput,
}

/// Query string of `GET /api/inventory`.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ListItemsQuery {
    #[serde(default)]
    pub include_inactive: bool,
}
