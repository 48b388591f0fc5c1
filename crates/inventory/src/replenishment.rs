//! Reorder-point checks over the current item states.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::item::{InventoryItem, InventoryItemId, ItemType};

/// Raw material at or below its reorder point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplenishmentAlert {
    pub item_id: InventoryItemId,
    pub sku: String,
    pub quantity_on_hand: Decimal,
    pub reorder_point: Decimal,
    pub suggested_quantity: Decimal,
}

/// Alert for a single item, if it needs one.
///
/// Only raw materials are purchased, so manufactured and service items never alert. The
/// suggestion is the configured reorder quantity, raised if that alone would not lift stock
/// back to the reorder point.
pub fn replenishment_alert(item: &InventoryItem) -> Option<ReplenishmentAlert> {
    if !item.is_created() || item.item_type() != ItemType::RawMaterial {
        return None;
    }
    if item.quantity_on_hand() > item.reorder_point() {
        return None;
    }

    let shortfall = item.reorder_point() - item.quantity_on_hand();
    Some(ReplenishmentAlert {
        item_id: item.id_typed(),
        sku: item.sku().to_string(),
        quantity_on_hand: item.quantity_on_hand(),
        reorder_point: item.reorder_point(),
        suggested_quantity: item.reorder_quantity().max(shortfall),
    })
}

/// All alerts for `items`, ordered by SKU.
pub fn compute_replenishment_alerts<'a, I>(items: I) -> Vec<ReplenishmentAlert>
where
    I: IntoIterator<Item = &'a InventoryItem>,
{
    let mut alerts: Vec<_> = items.into_iter().filter_map(replenishment_alert).collect();
    alerts.sort_by(|a, b| a.sku.cmp(&b.sku));
    alerts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{AdjustStock, AdjustmentReason, CreateItem, InventoryCommand};
    use chrono::Utc;
    use ordercash_core::{Aggregate, TenantId};

    fn item(sku: &str, item_type: ItemType, on_hand: i64, reorder_point: i64, reorder_qty: i64) -> InventoryItem {
        let tenant_id = TenantId::new();
        let item_id = InventoryItemId::generate();
        let mut item = InventoryItem::empty(item_id);
        let mut commands = vec![InventoryCommand::CreateItem(CreateItem {
            tenant_id,
            item_id,
            sku: sku.to_string(),
            name: sku.to_string(),
            item_type,
            reorder_point: Decimal::from(reorder_point),
            reorder_quantity: Decimal::from(reorder_qty),
            unit_cost: Decimal::ONE,
            sales_price: Decimal::ZERO,
            occurred_at: Utc::now(),
        })];
        if on_hand > 0 {
            commands.push(InventoryCommand::AdjustStock(AdjustStock {
                tenant_id,
                item_id,
                delta: Decimal::from(on_hand),
                reason: AdjustmentReason::manual("opening balance"),
                occurred_at: Utc::now(),
            }));
        }
        for cmd in commands {
            for e in item.handle(&cmd).unwrap() {
                item.apply(&e);
            }
        }
        item
    }

    #[test]
    fn alerts_at_or_below_reorder_point() {
        let at = item("B-AT", ItemType::RawMaterial, 5, 5, 20);
        let above = item("C-ABOVE", ItemType::RawMaterial, 6, 5, 20);
        let below = item("A-BELOW", ItemType::RawMaterial, 0, 5, 20);

        let alerts = compute_replenishment_alerts([&at, &above, &below]);
        let skus: Vec<_> = alerts.iter().map(|a| a.sku.as_str()).collect();
        assert_eq!(skus, vec!["A-BELOW", "B-AT"]);
        assert_eq!(alerts[1].suggested_quantity, Decimal::from(20));
    }

    #[test]
    fn suggestion_covers_the_shortfall() {
        let low = item("RM", ItemType::RawMaterial, 0, 50, 10);
        let alert = replenishment_alert(&low).unwrap();
        assert_eq!(alert.suggested_quantity, Decimal::from(50));
    }

    #[test]
    fn non_raw_materials_never_alert() {
        let fg = item("FG", ItemType::Manufactured, 0, 5, 5);
        let svc = item("SVC", ItemType::Service, 0, 5, 5);
        assert!(compute_replenishment_alerts([&fg, &svc]).is_empty());
    }
}
