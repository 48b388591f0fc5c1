//! Inventory ledger operations. `apply_adjustment` is the only path that changes stock.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, instrument};

use ordercash_core::{AggregateRoot, DomainError, TenantId};
use ordercash_events::{EventBus, JsonEnvelope};
use ordercash_inventory::{
    AdjustStock, AdjustmentReason, CreateItem, InventoryCommand, InventoryItem, InventoryItemId,
    ItemType, ReplenishmentAlert, compute_replenishment_alerts,
};

use super::OrderToCashEngine;
use crate::error::EngineResult;
use crate::event_store::EventStore;
use crate::unit_of_work::UnitOfWork;

/// Registration data for a new item. Stock always starts at zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    pub sku: String,
    pub name: String,
    pub item_type: ItemType,
    pub reorder_point: Decimal,
    pub reorder_quantity: Decimal,
    pub unit_cost: Decimal,
    pub sales_price: Decimal,
}

impl<S, B> OrderToCashEngine<S, B>
where
    S: EventStore,
    B: EventBus<JsonEnvelope>,
{
    #[instrument(skip(self, item), fields(tenant_id = %tenant_id, sku = %item.sku), err)]
    pub fn create_item(&self, tenant_id: TenantId, item: NewItem) -> EngineResult<InventoryItemId> {
        let sku = item.sku.trim();
        // Best-effort: two concurrent registrations of one sku can both pass this scan.
        if self
            .all_items(tenant_id)?
            .iter()
            .any(|existing| existing.sku() == sku)
        {
            return Err(DomainError::conflict(format!("sku '{sku}' already registered")).into());
        }

        let item_id = InventoryItemId::generate();
        let mut uow = self.begin(tenant_id);
        let mut aggregate = uow.load(item_id.0, || InventoryItem::empty(item_id))?;
        uow.execute(
            &mut aggregate,
            &InventoryCommand::CreateItem(CreateItem {
                tenant_id,
                item_id,
                sku: sku.to_string(),
                name: item.name,
                item_type: item.item_type,
                reorder_point: item.reorder_point,
                reorder_quantity: item.reorder_quantity,
                unit_cost: item.unit_cost,
                sales_price: item.sales_price,
                occurred_at: Utc::now(),
            }),
        )?;
        self.finish(uow)?;

        info!(item_id = %item_id, "item registered");
        Ok(item_id)
    }

    /// Manual stock entry. Returns the new quantity on hand.
    #[instrument(skip(self, reason), fields(tenant_id = %tenant_id, item_id = %item_id), err)]
    pub fn adjust_stock(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
        delta: Decimal,
        reason: AdjustmentReason,
    ) -> EngineResult<Decimal> {
        let mut uow = self.begin(tenant_id);
        let quantity = apply_adjustment(&mut uow, item_id, delta, reason)?;
        self.finish(uow)?;
        Ok(quantity)
    }

    /// Read-only; takes no locks and writes nothing.
    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    pub fn compute_replenishment_alerts(
        &self,
        tenant_id: TenantId,
    ) -> EngineResult<Vec<ReplenishmentAlert>> {
        let items = self.all_items(tenant_id)?;
        let alerts = compute_replenishment_alerts(&items);
        info!(alerts = alerts.len(), "replenishment alerts computed");
        Ok(alerts)
    }

    pub fn item(&self, tenant_id: TenantId, item_id: InventoryItemId) -> EngineResult<InventoryItem> {
        self.read(tenant_id, item_id.0, || InventoryItem::empty(item_id))
    }

    fn all_items(&self, tenant_id: TenantId) -> EngineResult<Vec<InventoryItem>> {
        self.store
            .stream_ids(tenant_id, InventoryItem::AGGREGATE_TYPE)?
            .into_iter()
            .map(|id| {
                let item_id = InventoryItemId::new(id);
                self.item(tenant_id, item_id)
            })
            .collect()
    }
}

/// Run one ledger adjustment inside an enclosing unit of work.
///
/// The item's stream is version-guarded by the unit of work, so the non-negativity check and
/// the write land atomically with respect to any other adjustment of the same item.
pub(crate) fn apply_adjustment<S>(
    uow: &mut UnitOfWork<'_, S>,
    item_id: InventoryItemId,
    delta: Decimal,
    reason: AdjustmentReason,
) -> EngineResult<Decimal>
where
    S: EventStore + ?Sized,
{
    let tenant_id = uow.tenant_id();
    let mut item = uow.load_existing(item_id.0, || InventoryItem::empty(item_id))?;
    uow.execute(
        &mut item,
        &InventoryCommand::AdjustStock(AdjustStock {
            tenant_id,
            item_id,
            delta,
            reason,
            occurred_at: Utc::now(),
        }),
    )?;

    info!(
        item_id = %item_id,
        delta = %delta,
        quantity_on_hand = %item.quantity_on_hand(),
        "stock adjusted"
    );
    Ok(item.quantity_on_hand())
}
