//! Ledger audit: replay every item's movements and compare with the cached
//! balance. Exits non-zero when any item drifts.

use tracing::{error, info};

use garage_admin::models::ItemReconciliation;
use garage_core::InventoryItemId;

use super::{CommandError, connect, inventory_service};

/// Audit one item or the whole catalog.
///
/// # Errors
///
/// Returns `CommandError::Inconsistent` if any item fails reconciliation,
/// or a lookup/database error.
pub async fn run(item_id: Option<i32>) -> Result<(), CommandError> {
    let service = inventory_service(connect().await?);

    let reports = match item_id {
        Some(id) => vec![service.reconcile_item(InventoryItemId::new(id)).await?],
        None => service.reconcile_all().await?,
    };

    let failures = log_reports(&reports);
    info!(
        items = reports.len(),
        inconsistent = failures,
        "Audit complete"
    );

    if failures > 0 {
        return Err(CommandError::Inconsistent(failures));
    }
    Ok(())
}

fn log_reports(reports: &[ItemReconciliation]) -> usize {
    let mut failures = 0;
    for entry in reports {
        let report = &entry.report;
        if report.is_consistent {
            info!(
                item_id = %entry.item_id,
                item_name = %entry.item_name,
                quantity = %report.recorded_quantity,
                transactions = report.transaction_count,
                "OK"
            );
        } else {
            failures += 1;
            error!(
                item_id = %entry.item_id,
                item_name = %entry.item_name,
                recorded = %report.recorded_quantity,
                replayed = %report.replayed_quantity,
                first_divergence = ?report.first_divergence,
                "Ledger drift"
            );
        }
    }
    failures
}
