//! Seed the database with employees and catalog items from YAML.
//!
//! ```yaml
//! employees:
//!   - first_name: Ana
//!     last_name: Silva
//! materials:
//!   - item_name: Brake pad set
//!     unit_of_measure: set
//!     initial_quantity: 12
//!     minimum_quantity: 4
//!     item_price: "38.50"
//! ```
//!
//! Items go through the inventory service, so opening balances land in the
//! ledger. Rows whose name already exists are skipped, which makes re-running
//! a seed file safe.

use std::collections::HashSet;

use serde::Deserialize;
use tracing::{info, warn};

use garage_admin::models::{NewInventoryItem, QuantityInput, inventory::optional_decimal};
use garage_admin::services::InventoryError;

use super::{CommandError, connect, inventory_service};

#[derive(Debug, Default, Deserialize)]
struct SeedFile {
    #[serde(default)]
    employees: Vec<SeedEmployee>,
    #[serde(default)]
    materials: Vec<SeedMaterial>,
}

#[derive(Debug, Deserialize)]
struct SeedEmployee {
    first_name: String,
    last_name: String,
}

#[derive(Debug, Deserialize)]
struct SeedMaterial {
    item_name: String,
    item_description: Option<String>,
    unit_of_measure: Option<String>,
    initial_quantity: Option<QuantityInput>,
    minimum_quantity: Option<QuantityInput>,
    item_price: Option<QuantityInput>,
}

impl SeedMaterial {
    fn into_new_item(self) -> Result<NewInventoryItem, InventoryError> {
        let amount = |input: Option<&QuantityInput>, field: &str| {
            optional_decimal(input, field).map_err(InventoryError::Validation)
        };
        Ok(NewInventoryItem {
            initial_quantity: amount(self.initial_quantity.as_ref(), "initial_quantity")?,
            minimum_quantity: amount(self.minimum_quantity.as_ref(), "minimum_quantity")?,
            item_price: amount(self.item_price.as_ref(), "item_price")?,
            item_name: self.item_name,
            item_description: self.item_description,
            unit_of_measure: self.unit_of_measure.unwrap_or_default(),
        })
    }
}

fn parse_seed_file(content: &str) -> Result<SeedFile, CommandError> {
    Ok(serde_yaml::from_str(content)?)
}

/// Load a seed file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or if an item
/// fails validation.
pub async fn materials(file_path: &str) -> Result<(), CommandError> {
    let content = tokio::fs::read_to_string(file_path)
        .await
        .map_err(|source| CommandError::Io {
            path: file_path.to_string(),
            source,
        })?;
    let seed = parse_seed_file(&content)?;
    info!(
        employees = seed.employees.len(),
        materials = seed.materials.len(),
        "Parsed seed file"
    );

    let pool = connect().await?;
    let service = inventory_service(pool.clone());

    let mut employees_inserted = 0;
    for employee in &seed.employees {
        let inserted = sqlx::query(
            r"
            INSERT INTO employees (first_name, last_name)
            SELECT $1, $2
            WHERE NOT EXISTS (
                SELECT 1 FROM employees WHERE first_name = $1 AND last_name = $2
            )
            ",
        )
        .bind(employee.first_name.trim())
        .bind(employee.last_name.trim())
        .execute(&pool)
        .await?
        .rows_affected();
        employees_inserted += inserted;
    }

    let mut existing: HashSet<String> = service
        .list_items(false)
        .await?
        .into_iter()
        .map(|summary| summary.item.item_name.to_lowercase())
        .collect();

    let mut items_inserted = 0;
    let mut items_skipped = 0;
    for material in seed.materials {
        let key = material.item_name.trim().to_lowercase();
        if existing.contains(&key) {
            warn!(item_name = %material.item_name, "Item already exists, skipping");
            items_skipped += 1;
            continue;
        }
        let created = service.add_item(material.into_new_item()?).await?;
        info!(
            item_id = %created.item.item_id,
            item_name = %created.item.item_name,
            quantity = %created.item.current_quantity,
            "Seeded item"
        );
        existing.insert(key);
        items_inserted += 1;
    }

    info!("Seeding complete!");
    info!("  Employees inserted: {employees_inserted}");
    info!("  Items inserted: {items_inserted}");
    info!("  Items skipped (already exist): {items_skipped}");
    Ok(())
}
