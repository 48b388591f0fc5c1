//! Inventory ledger (event-sourced).
//!
//! Items, their stock ledger and their bills of material, implemented purely as
//! deterministic domain logic (no IO, no storage).

pub mod bom;
pub mod item;
pub mod replenishment;

pub use bom::{BillOfMaterial, BomLine};
pub use item::{
    AdjustStock, AdjustmentReason, BomDefined, BomRetired, CreateItem, DefineBom,
    InventoryCommand, InventoryEvent, InventoryItem, InventoryItemId, ItemCreated, ItemType,
    RetireBom, StockAdjusted,
};
pub use replenishment::{ReplenishmentAlert, compute_replenishment_alerts, replenishment_alert};
