//! Inventory catalog, ledger and reporting route handlers.

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::instrument;

use garage_core::{InventoryItemId, TransactionType};

use crate::{
    error::AppError,
    middleware::{CurrentEmployee, RequireEmployee, RequireManager},
    models::{
        AddItemRequest, ConsumptionLine, ConsumptionRequest, InventoryTransaction,
        ItemReconciliation, ItemSummary, ListItemsQuery, NewInventoryItem, NewTransaction,
        OrderConsumption, TransactionHistoryEntry, TransactionRequest,
        inventory::optional_decimal,
    },
    services::InventoryError,
    state::AppState,
};

/// Response for item creation and deactivation.
#[derive(Debug, Serialize)]
pub struct ItemResponse {
    pub message: &'static str,
    pub item: ItemSummary,
}

/// Response for a recorded stock movement.
#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub message: &'static str,
    pub resulting_quantity: Decimal,
    pub transaction: InventoryTransaction,
}

/// Response for a recorded order consumption.
#[derive(Debug, Serialize)]
pub struct ConsumptionResponse {
    pub message: &'static str,
    pub transactions: Vec<InventoryTransaction>,
}

// =============================================================================
// Request conversion
// =============================================================================

fn validation(message: String) -> AppError {
    AppError::Inventory(InventoryError::Validation(message))
}

fn new_item(request: AddItemRequest) -> Result<NewInventoryItem, AppError> {
    Ok(NewInventoryItem {
        item_name: request.item_name.unwrap_or_default(),
        item_description: request.item_description,
        unit_of_measure: request.unit_of_measure.unwrap_or_default(),
        initial_quantity: optional_decimal(request.initial_quantity.as_ref(), "initial_quantity")
            .map_err(validation)?,
        minimum_quantity: optional_decimal(request.minimum_quantity.as_ref(), "minimum_quantity")
            .map_err(validation)?,
        item_price: optional_decimal(request.item_price.as_ref(), "item_price")
            .map_err(validation)?,
    })
}

/// The signed-in employee is recorded when the body names nobody.
fn new_transaction(
    request: TransactionRequest,
    employee: &CurrentEmployee,
) -> Result<NewTransaction, AppError> {
    let transaction_type = request
        .transaction_type
        .trim()
        .to_ascii_lowercase()
        .parse::<TransactionType>()
        .map_err(|_| {
            validation("transaction_type must be 'inward' or 'outward'".to_string())
        })?;

    Ok(NewTransaction {
        item_id: request.item_id,
        transaction_type,
        quantity: request.quantity.to_decimal("quantity").map_err(validation)?,
        employee_id: request.employee_id.or(Some(employee.employee_id)),
        customer_id: request.customer_id,
        order_id: request.order_id,
        notes: request.notes,
    })
}

fn order_consumption(
    request: ConsumptionRequest,
    employee: &CurrentEmployee,
) -> Result<OrderConsumption, AppError> {
    let materials = request
        .materials
        .iter()
        .map(|line| {
            Ok(ConsumptionLine {
                item_id: line.item_id,
                quantity: line.quantity.to_decimal("quantity").map_err(validation)?,
            })
        })
        .collect::<Result<Vec<_>, AppError>>()?;

    Ok(OrderConsumption {
        order_id: request.order_id,
        customer_id: request.customer_id,
        employee_id: request.employee_id.or(Some(employee.employee_id)),
        notes: request.notes,
        materials,
    })
}

// =============================================================================
// Catalog
// =============================================================================

/// `GET /api/inventory` - all active items (or all items) with stock status.
#[instrument(skip_all)]
pub async fn list_items(
    RequireEmployee(_employee): RequireEmployee,
    State(state): State<AppState>,
    query: Result<Query<ListItemsQuery>, QueryRejection>,
) -> Result<Json<Vec<ItemSummary>>, AppError> {
    let Query(query) = query?;
    let items = state.inventory().list_items(!query.include_inactive).await?;
    Ok(Json(items))
}

/// `GET /api/inventory/low-stock` - active items at or below their minimum.
#[instrument(skip_all)]
pub async fn list_low_stock(
    RequireEmployee(_employee): RequireEmployee,
    State(state): State<AppState>,
) -> Result<Json<Vec<ItemSummary>>, AppError> {
    Ok(Json(state.inventory().list_low_stock().await?))
}

/// `GET /api/inventory/{item_id}`
#[instrument(skip_all)]
pub async fn get_item(
    RequireEmployee(_employee): RequireEmployee,
    State(state): State<AppState>,
    item_id: Result<Path<InventoryItemId>, PathRejection>,
) -> Result<Json<ItemSummary>, AppError> {
    let Path(item_id) = item_id?;
    Ok(Json(state.inventory().get_item(item_id).await?))
}

/// `POST /api/inventory` - add a catalog item.
#[instrument(skip_all, fields(employee_id = %employee.employee_id))]
pub async fn add_item(
    RequireManager(employee): RequireManager,
    State(state): State<AppState>,
    body: Result<Json<AddItemRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ItemResponse>), AppError> {
    let Json(request) = body?;
    let item = state.inventory().add_item(new_item(request)?).await?;
    Ok((
        StatusCode::CREATED,
        Json(ItemResponse {
            message: "Inventory item added successfully",
            item,
        }),
    ))
}

/// `POST /api/inventory/{item_id}/deactivate`
#[instrument(skip_all, fields(employee_id = %employee.employee_id))]
pub async fn deactivate_item(
    RequireManager(employee): RequireManager,
    State(state): State<AppState>,
    item_id: Result<Path<InventoryItemId>, PathRejection>,
) -> Result<Json<ItemResponse>, AppError> {
    let Path(item_id) = item_id?;
    let item = state.inventory().deactivate_item(item_id).await?;
    Ok(Json(ItemResponse {
        message: "Inventory item deactivated",
        item,
    }))
}

// =============================================================================
// Ledger
// =============================================================================

/// `POST /api/inventory/transaction` - record one stock movement.
#[instrument(skip_all, fields(employee_id = %employee.employee_id))]
pub async fn record_transaction(
    RequireEmployee(employee): RequireEmployee,
    State(state): State<AppState>,
    body: Result<Json<TransactionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TransactionResponse>), AppError> {
    let Json(request) = body?;
    let transaction = state
        .inventory()
        .record_transaction(new_transaction(request, &employee)?)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(TransactionResponse {
            message: "Transaction recorded successfully",
            resulting_quantity: transaction.resulting_quantity,
            transaction,
        }),
    ))
}

/// `POST /api/inventory/consumption` - record materials used by an order.
#[instrument(skip_all, fields(employee_id = %employee.employee_id))]
pub async fn record_consumption(
    RequireEmployee(employee): RequireEmployee,
    State(state): State<AppState>,
    body: Result<Json<ConsumptionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ConsumptionResponse>), AppError> {
    let Json(request) = body?;
    let transactions = state
        .inventory()
        .record_consumption(order_consumption(request, &employee)?)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ConsumptionResponse {
            message: "Materials consumption recorded successfully",
            transactions,
        }),
    ))
}

// =============================================================================
// Reporting
// =============================================================================

/// `GET /api/inventory/{item_id}/history` - ledger rows, newest first.
#[instrument(skip_all)]
pub async fn item_history(
    RequireEmployee(_employee): RequireEmployee,
    State(state): State<AppState>,
    item_id: Result<Path<InventoryItemId>, PathRejection>,
) -> Result<Json<Vec<TransactionHistoryEntry>>, AppError> {
    let Path(item_id) = item_id?;
    Ok(Json(state.inventory().item_history(item_id).await?))
}

/// `GET /api/inventory/{item_id}/reconciliation`
#[instrument(skip_all)]
pub async fn reconcile_item(
    RequireManager(_employee): RequireManager,
    State(state): State<AppState>,
    item_id: Result<Path<InventoryItemId>, PathRejection>,
) -> Result<Json<ItemReconciliation>, AppError> {
    let Path(item_id) = item_id?;
    Ok(Json(state.inventory().reconcile_item(item_id).await?))
}

/// `GET /api/inventory/reconciliation` - every item, including inactive ones.
#[instrument(skip_all)]
pub async fn reconcile_all(
    RequireManager(_employee): RequireManager,
    State(state): State<AppState>,
) -> Result<Json<Vec<ItemReconciliation>>, AppError> {
    Ok(Json(state.inventory().reconcile_all().await?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use garage_core::{EmployeeId, EmployeeRole};

    fn employee() -> CurrentEmployee {
        CurrentEmployee {
            employee_id: EmployeeId::new(5),
            name: "Ana".to_string(),
            role: EmployeeRole::Employee,
        }
    }

    fn transaction_request(json: &str) -> TransactionRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_transaction_defaults_to_signed_in_employee() {
        let request = transaction_request(
            r#"{"item_id": 1, "transaction_type": "Outward", "quantity": "2.5"}"#,
        );
        let tx = new_transaction(request, &employee()).unwrap();
        assert_eq!(tx.transaction_type, TransactionType::Outward);
        assert_eq!(tx.quantity, Decimal::new(25, 1));
        assert_eq!(tx.employee_id, Some(EmployeeId::new(5)));
    }

    #[test]
    fn test_transaction_keeps_explicit_employee() {
        let request = transaction_request(
            r#"{"item_id": 1, "transaction_type": "inward", "quantity": 3, "employee_id": 9}"#,
        );
        let tx = new_transaction(request, &employee()).unwrap();
        assert_eq!(tx.employee_id, Some(EmployeeId::new(9)));
    }

    #[test]
    fn test_transaction_rejects_unknown_type_and_bad_quantity() {
        let bad_type = transaction_request(
            r#"{"item_id": 1, "transaction_type": "transfer", "quantity": 1}"#,
        );
        assert!(matches!(
            new_transaction(bad_type, &employee()),
            Err(AppError::Inventory(InventoryError::Validation(_)))
        ));

        let bad_qty = transaction_request(
            r#"{"item_id": 1, "transaction_type": "inward", "quantity": "lots"}"#,
        );
        assert!(matches!(
            new_transaction(bad_qty, &employee()),
            Err(AppError::Inventory(InventoryError::Validation(_)))
        ));
    }

    #[test]
    fn test_add_item_request_defaults() {
        let request: AddItemRequest =
            serde_json::from_str(r#"{"item_name": "Gasket", "current_quantity": "12"}"#).unwrap();
        let item = new_item(request).unwrap();
        assert_eq!(item.initial_quantity, Decimal::from(12));
        assert_eq!(item.minimum_quantity, Decimal::ZERO);
        assert_eq!(item.item_price, Decimal::ZERO);
        assert_eq!(item.unit_of_measure, "");
    }
}
