//! Bill-of-material maintenance and the read-only explosion/cost queries.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, instrument};

use ordercash_core::{DomainError, TenantId};
use ordercash_events::{EventBus, JsonEnvelope};
use ordercash_inventory::{
    BillOfMaterial, DefineBom, InventoryCommand, InventoryItem, InventoryItemId, RetireBom,
};
use ordercash_manufacturing::{BomGraph, BomNode, MaterialRequirements};

use super::OrderToCashEngine;
use crate::error::{EngineError, EngineResult};
use crate::event_store::EventStore;
use crate::unit_of_work::UnitOfWork;

impl<S, B> OrderToCashEngine<S, B>
where
    S: EventStore,
    B: EventBus<JsonEnvelope>,
{
    /// Replace the item's active BOM. The candidate graph must be acyclic before anything is
    /// written.
    #[instrument(skip(self, bom), fields(tenant_id = %tenant_id, item_id = %item_id), err)]
    pub fn define_bom(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
        bom: BillOfMaterial,
    ) -> EngineResult<()> {
        bom.validate(item_id)?;

        let mut uow = self.begin(tenant_id);
        let mut item = uow.load_existing(item_id.0, || InventoryItem::empty(item_id))?;
        if !item.is_manufactured() {
            return Err(DomainError::validation(format!(
                "item {item_id} is not manufactured and cannot own a bill of material"
            ))
            .into());
        }

        let mut owner_only = BomGraph::new();
        owner_only.insert(item_id, BomNode::from(&item));
        let mut candidate = owner_only.with_bom(item_id, bom.clone())?;
        resolve_components(&mut uow, &mut candidate).map_err(|e| match e {
            EngineError::Domain(DomainError::NotFound) => {
                DomainError::validation("bill of material references an unknown item").into()
            }
            other => other,
        })?;
        candidate.check_acyclic(item_id)?;

        let lines = bom.lines.len();
        uow.execute(
            &mut item,
            &InventoryCommand::DefineBom(DefineBom {
                tenant_id,
                item_id,
                bom,
                occurred_at: Utc::now(),
            }),
        )?;
        self.finish(uow)?;

        info!(lines, "bill of material defined");
        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, item_id = %item_id), err)]
    pub fn retire_bom(&self, tenant_id: TenantId, item_id: InventoryItemId) -> EngineResult<()> {
        let mut uow = self.begin(tenant_id);
        let mut item = uow.load_existing(item_id.0, || InventoryItem::empty(item_id))?;
        uow.execute(
            &mut item,
            &InventoryCommand::RetireBom(RetireBom {
                tenant_id,
                item_id,
                occurred_at: Utc::now(),
            }),
        )?;
        self.finish(uow)?;

        info!("bill of material retired");
        Ok(())
    }

    /// Raw-material quantities needed for `units` of a manufactured item. Pure query.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, item_id = %item_id), err)]
    pub fn explode(
        &self,
        tenant_id: TenantId,
        item_id: InventoryItemId,
        units: Decimal,
    ) -> EngineResult<MaterialRequirements> {
        let mut uow = self.begin(tenant_id);
        let graph = load_graph(&mut uow, [item_id])?;
        Ok(graph.explode(item_id, units)?)
    }

    /// Unit cost of an item rolled up through its BOM, unrounded.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, item_id = %item_id), err)]
    pub fn roll_up_cost(&self, tenant_id: TenantId, item_id: InventoryItemId) -> EngineResult<Decimal> {
        let mut uow = self.begin(tenant_id);
        let graph = load_graph(&mut uow, [item_id])?;
        Ok(graph.roll_up_cost(item_id)?)
    }
}

/// Load `roots` and everything their active BOMs reach.
///
/// Every item is loaded through `uow`, so a commit made from the same unit of work also
/// guards the BOMs its decisions were based on.
pub(crate) fn load_graph<S>(
    uow: &mut UnitOfWork<'_, S>,
    roots: impl IntoIterator<Item = InventoryItemId>,
) -> EngineResult<BomGraph>
where
    S: EventStore + ?Sized,
{
    let mut graph = BomGraph::new();
    for id in roots {
        if !graph.contains(id) {
            let item = uow.load_existing(id.0, || InventoryItem::empty(id))?;
            graph.insert(id, BomNode::from(&item));
        }
    }
    resolve_components(uow, &mut graph)?;
    Ok(graph)
}

fn resolve_components<S>(uow: &mut UnitOfWork<'_, S>, graph: &mut BomGraph) -> EngineResult<()>
where
    S: EventStore + ?Sized,
{
    loop {
        let missing = graph.unresolved();
        if missing.is_empty() {
            return Ok(());
        }
        for id in missing {
            let item = uow.load_existing(id.0, || InventoryItem::empty(id))?;
            graph.insert(id, BomNode::from(&item));
        }
    }
}
