//! Domain models for the garage back office.

pub mod inventory;

pub use inventory::{
    AddItemRequest, ConsumptionLine, ConsumptionLineRequest, ConsumptionRequest,
    InventoryItem, InventoryTransaction, ItemReconciliation, ItemSummary, ListItemsQuery,
    NewInventoryItem, NewTransaction, OrderConsumption, QuantityInput, TransactionHistoryEntry,
    TransactionRequest,
};
