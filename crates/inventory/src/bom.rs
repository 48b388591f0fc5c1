//! Bill of material value object owned by manufactured items.

use std::collections::HashSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use ordercash_core::DomainError;

use crate::item::InventoryItemId;

/// One component requirement: `quantity_per_unit` of `component_id` per produced unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomLine {
    pub component_id: InventoryItemId,
    pub quantity_per_unit: Decimal,
}

impl BomLine {
    pub fn new(component_id: InventoryItemId, quantity_per_unit: Decimal) -> Self {
        Self {
            component_id,
            quantity_per_unit,
        }
    }
}

/// Active bill of material of a manufactured item.
///
/// `labor_cost` is added once per produced unit during cost roll-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillOfMaterial {
    pub lines: Vec<BomLine>,
    pub labor_cost: Decimal,
}

impl BillOfMaterial {
    pub fn new(lines: Vec<BomLine>, labor_cost: Decimal) -> Self {
        Self { lines, labor_cost }
    }

    /// Local checks only. Transitive cycles need the whole component graph and are rejected
    /// by the manufacturing layer before a definition is committed.
    pub fn validate(&self, owner: InventoryItemId) -> Result<(), DomainError> {
        if self.lines.is_empty() {
            return Err(DomainError::validation(
                "bill of material needs at least one line",
            ));
        }
        if self.labor_cost < Decimal::ZERO {
            return Err(DomainError::validation("labor_cost cannot be negative"));
        }

        let mut seen = HashSet::with_capacity(self.lines.len());
        for line in &self.lines {
            if line.quantity_per_unit <= Decimal::ZERO {
                return Err(DomainError::validation(format!(
                    "quantity_per_unit for component {} must be positive",
                    line.component_id
                )));
            }
            if line.component_id == owner {
                return Err(DomainError::CyclicBom {
                    path: vec![owner.0, owner.0],
                });
            }
            if !seen.insert(line.component_id) {
                return Err(DomainError::validation(format!(
                    "component {} listed more than once",
                    line.component_id
                )));
            }
        }

        Ok(())
    }

    pub fn component_ids(&self) -> impl Iterator<Item = InventoryItemId> + '_ {
        self.lines.iter().map(|l| l.component_id)
    }
}
