//! Status enums for inventory entities.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of a stock movement.
///
/// Stored as the lowercase text `inward` / `outward` in `inventory_transactions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Stock received (purchase, return, opening balance).
    Inward,
    /// Stock consumed or removed (service consumption, write-off).
    Outward,
}

impl TransactionType {
    /// Database / wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Inward => "inward",
            Self::Outward => "outward",
        }
    }

    /// Apply this movement's sign to a positive magnitude.
    #[must_use]
    pub fn signed(&self, quantity: Decimal) -> Decimal {
        match self {
            Self::Inward => quantity,
            Self::Outward => -quantity,
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inward" => Ok(Self::Inward),
            "outward" => Ok(Self::Outward),
            _ => Err(format!("invalid transaction type: {s}")),
        }
    }
}

/// Stock level classification shown next to every item.
///
/// Always derived from the current and minimum quantities on read; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StockStatus {
    #[serde(rename = "Out of Stock")]
    OutOfStock,
    #[serde(rename = "Low Stock")]
    LowStock,
    #[serde(rename = "In Stock")]
    InStock,
}

impl StockStatus {
    /// Classify a stock level against its reorder threshold.
    ///
    /// `current <= 0` is out of stock, `current <= minimum` is low, otherwise in stock.
    #[must_use]
    pub fn classify(current_quantity: Decimal, minimum_quantity: Decimal) -> Self {
        if current_quantity <= Decimal::ZERO {
            Self::OutOfStock
        } else if current_quantity <= minimum_quantity {
            Self::LowStock
        } else {
            Self::InStock
        }
    }

    /// Whether the item needs attention (low or out of stock).
    #[must_use]
    pub const fn needs_restock(&self) -> bool {
        matches!(self, Self::OutOfStock | Self::LowStock)
    }

    /// Human-readable label, identical to the serialized form.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::OutOfStock => "Out of Stock",
            Self::LowStock => "Low Stock",
            Self::InStock => "In Stock",
        }
    }
}

impl std::fmt::Display for StockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Employee role carried in access tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmployeeRole {
    /// Full access, including catalog management.
    Admin,
    /// Catalog management and all ledger operations.
    Manager,
    /// Ledger operations and read access.
    Employee,
}

impl EmployeeRole {
    /// Whether this role may add or deactivate catalog items and run audits.
    #[must_use]
    pub const fn can_manage_catalog(&self) -> bool {
        matches!(self, Self::Admin | Self::Manager)
    }
}

impl std::fmt::Display for EmployeeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::Manager => write!(f, "manager"),
            Self::Employee => write!(f, "employee"),
        }
    }
}

impl std::str::FromStr for EmployeeRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "manager" => Ok(Self::Manager),
            "employee" => Ok(Self::Employee),
            _ => Err(format!("invalid employee role: {s}")),
        }
    }
}
