//! Stock movement arithmetic and ledger replay.
//!
//! Every storage backend applies a movement the same way:
//!
//! 1. lock the item row (or the whole store),
//! 2. call [`plan_movement`] with the locked balance,
//! 3. write the returned balance and append a ledger row carrying it.
//!
//! [`reconcile`] is the inverse check: replaying an item's rows from zero must
//! reproduce every `resulting_quantity` and the cached balance.

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::types::{InventoryTransactionId, TransactionType};

/// Largest balance a `NUMERIC(14,3)` column can hold: `99999999999.999`.
pub const MAX_QUANTITY: Decimal = Decimal::from_parts(0x107A_3FFF, 0x5AF3, 0, false, 3);

/// Reasons a movement is rejected before anything is written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MovementError {
    /// Zero or negative movement magnitude.
    #[error("quantity must be greater than zero (got {0})")]
    NonPositiveQuantity(Decimal),

    /// Outward movement larger than the available balance.
    #[error("insufficient stock: {available} available, {requested} requested")]
    InsufficientStock {
        /// Balance before the movement.
        available: Decimal,
        /// Requested outward magnitude.
        requested: Decimal,
    },

    /// Resulting balance exceeds [`MAX_QUANTITY`].
    #[error("quantity out of range")]
    OutOfRange,
}

/// Compute the balance after applying a movement to `current_quantity`.
///
/// Inward movements are unbounded; outward movements may not drive the
/// balance below zero.
///
/// # Errors
///
/// Returns `MovementError::NonPositiveQuantity` if `quantity <= 0`,
/// `MovementError::InsufficientStock` if an outward movement exceeds the
/// balance, and `MovementError::OutOfRange` if the balance would exceed
/// [`MAX_QUANTITY`].
pub fn plan_movement(
    current_quantity: Decimal,
    transaction_type: TransactionType,
    quantity: Decimal,
) -> Result<Decimal, MovementError> {
    if quantity <= Decimal::ZERO {
        return Err(MovementError::NonPositiveQuantity(quantity));
    }

    let new_quantity = match transaction_type {
        TransactionType::Inward => current_quantity.checked_add(quantity),
        TransactionType::Outward => current_quantity.checked_sub(quantity),
    }
    .ok_or(MovementError::OutOfRange)?;

    if new_quantity < Decimal::ZERO {
        return Err(MovementError::InsufficientStock {
            available: current_quantity,
            requested: quantity,
        });
    }
    if new_quantity > MAX_QUANTITY {
        return Err(MovementError::OutOfRange);
    }

    Ok(new_quantity.normalize())
}

/// The part of a ledger row that replay needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerEntry {
    pub transaction_id: InventoryTransactionId,
    pub transaction_type: TransactionType,
    pub quantity: Decimal,
    pub resulting_quantity: Decimal,
}

/// Outcome of replaying one item's ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    /// Balance obtained by summing signed quantities from zero.
    pub replayed_quantity: Decimal,
    /// Cached `current_quantity` on the item.
    pub recorded_quantity: Decimal,
    /// Number of ledger rows replayed.
    pub transaction_count: usize,
    /// First row whose `resulting_quantity` disagrees with the replay.
    pub first_divergence: Option<InventoryTransactionId>,
    /// True when every row and the cached balance agree with the replay.
    pub is_consistent: bool,
}

/// Replay ledger rows (oldest first) and compare against the cached balance.
#[must_use]
pub fn reconcile<'a>(
    entries: impl IntoIterator<Item = &'a LedgerEntry>,
    recorded_quantity: Decimal,
) -> Reconciliation {
    let mut running = Decimal::ZERO;
    let mut transaction_count = 0;
    let mut first_divergence = None;

    for entry in entries {
        running += entry.transaction_type.signed(entry.quantity);
        transaction_count += 1;
        if first_divergence.is_none() && running != entry.resulting_quantity {
            first_divergence = Some(entry.transaction_id);
        }
    }

    Reconciliation {
        replayed_quantity: running.normalize(),
        recorded_quantity,
        transaction_count,
        first_divergence,
        is_consistent: first_divergence.is_none() && running == recorded_quantity,
    }
}
