//! Order lifecycle operations, including the stock side effects of production and
//! cancellation.

use std::collections::BTreeMap;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, instrument};

use ordercash_core::{CustomerId, DomainError, TenantId};
use ordercash_events::{EventBus, JsonEnvelope};
use ordercash_inventory::{AdjustmentReason, InventoryItem, InventoryItemId, ItemType};
use ordercash_sales::{
    AddLine, CancelOrder, ConfirmOrder, CreateOrder, DeliverOrder, NewOrderLine, OrderLine,
    OrderStatus, OrderTransition, SalesOrder, SalesOrderCommand, SalesOrderEvent, SalesOrderId,
    ShipOrder, StartProduction, StockMovement, TransitionPlan,
};

use super::OrderToCashEngine;
use super::bom::load_graph;
use super::ledger::apply_adjustment;
use crate::error::EngineResult;
use crate::event_store::EventStore;

impl<S, B> OrderToCashEngine<S, B>
where
    S: EventStore,
    B: EventBus<JsonEnvelope>,
{
    /// Open a new order in `DRAFT`. Every line must reference a registered item.
    #[instrument(skip(self, lines), fields(tenant_id = %tenant_id, customer_id = %customer_id), err)]
    pub fn create_order(
        &self,
        tenant_id: TenantId,
        customer_id: CustomerId,
        lines: Vec<NewOrderLine>,
    ) -> EngineResult<SalesOrderId> {
        for line in &lines {
            self.item(tenant_id, line.item_id)?;
        }

        let order_id = SalesOrderId::generate();
        let mut uow = self.begin(tenant_id);
        let mut order = uow.load(order_id.0, || SalesOrder::empty(order_id))?;
        uow.execute(
            &mut order,
            &SalesOrderCommand::CreateOrder(CreateOrder {
                tenant_id,
                order_id,
                customer_id,
                lines,
                occurred_at: Utc::now(),
            }),
        )?;
        self.finish(uow)?;

        info!(order_id = %order_id, lines = order.lines().len(), "order created");
        Ok(order_id)
    }

    #[instrument(skip(self, line), fields(tenant_id = %tenant_id, order_id = %order_id), err)]
    pub fn add_order_line(
        &self,
        tenant_id: TenantId,
        order_id: SalesOrderId,
        line: NewOrderLine,
    ) -> EngineResult<OrderLine> {
        self.item(tenant_id, line.item_id)?;

        let mut uow = self.begin(tenant_id);
        let mut order = uow.load_existing(order_id.0, || SalesOrder::empty(order_id))?;
        let events = uow.execute(
            &mut order,
            &SalesOrderCommand::AddLine(AddLine {
                tenant_id,
                order_id,
                line,
                occurred_at: Utc::now(),
            }),
        )?;
        self.finish(uow)?;

        events
            .into_iter()
            .find_map(|e| match e {
                SalesOrderEvent::LineAdded(added) => Some(added.line),
                _ => None,
            })
            .ok_or_else(|| DomainError::invariant("line was not added").into())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, order_id = %order_id), err)]
    pub fn confirm_order(&self, tenant_id: TenantId, order_id: SalesOrderId) -> EngineResult<OrderStatus> {
        self.transition(
            tenant_id,
            order_id,
            SalesOrderCommand::ConfirmOrder(ConfirmOrder {
                tenant_id,
                order_id,
                occurred_at: Utc::now(),
            }),
        )
    }

    /// `CONFIRMED -> IN_PRODUCTION`: consume stock for every line, all or nothing.
    ///
    /// Manufactured lines consume their exploded raw materials; raw-material lines consume the
    /// ordered quantity; service lines consume nothing. Requirements for the same item are
    /// summed before the ledger is touched. Returns the consumption recorded on the order.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, order_id = %order_id), err)]
    pub fn start_production(
        &self,
        tenant_id: TenantId,
        order_id: SalesOrderId,
    ) -> EngineResult<Vec<StockMovement>> {
        let mut uow = self.begin(tenant_id);
        let mut order = uow.load_existing(order_id.0, || SalesOrder::empty(order_id))?;

        if order.plan(OrderTransition::StartProduction)? == TransitionPlan::AlreadyApplied {
            info!("production already started; nothing consumed");
            return Ok(order.consumed().to_vec());
        }

        let mut requirements: BTreeMap<InventoryItemId, Decimal> = BTreeMap::new();
        let mut manufactured = Vec::new();
        for line in order.lines() {
            let item = uow.load_existing(line.item_id.0, || InventoryItem::empty(line.item_id))?;
            match item.item_type() {
                ItemType::Manufactured => manufactured.push((line.item_id, line.quantity)),
                ItemType::RawMaterial => {
                    add_requirement(&mut requirements, line.item_id, line.quantity)?;
                }
                ItemType::Service => {}
            }
        }

        if !manufactured.is_empty() {
            let graph = load_graph(&mut uow, manufactured.iter().map(|(id, _)| *id))?;
            for (item_id, units) in &manufactured {
                for (raw_id, quantity) in graph.explode(*item_id, *units)? {
                    add_requirement(&mut requirements, raw_id, quantity)?;
                }
            }
        }

        let consumption: Vec<StockMovement> = requirements
            .into_iter()
            .map(|(item_id, quantity)| StockMovement { item_id, quantity })
            .collect();

        uow.execute(
            &mut order,
            &SalesOrderCommand::StartProduction(StartProduction {
                tenant_id,
                order_id,
                consumption: consumption.clone(),
                occurred_at: Utc::now(),
            }),
        )?;
        for movement in &consumption {
            apply_adjustment(
                &mut uow,
                movement.item_id,
                -movement.quantity,
                AdjustmentReason::ProductionConsumption {
                    order_id: order_id.0,
                },
            )?;
        }
        self.finish(uow)?;

        info!(items = consumption.len(), "production started, stock consumed");
        Ok(consumption)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, order_id = %order_id), err)]
    pub fn ship_order(&self, tenant_id: TenantId, order_id: SalesOrderId) -> EngineResult<OrderStatus> {
        self.transition(
            tenant_id,
            order_id,
            SalesOrderCommand::ShipOrder(ShipOrder {
                tenant_id,
                order_id,
                occurred_at: Utc::now(),
            }),
        )
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, order_id = %order_id), err)]
    pub fn deliver_order(&self, tenant_id: TenantId, order_id: SalesOrderId) -> EngineResult<OrderStatus> {
        self.transition(
            tenant_id,
            order_id,
            SalesOrderCommand::DeliverOrder(DeliverOrder {
                tenant_id,
                order_id,
                occurred_at: Utc::now(),
            }),
        )
    }

    /// Cancel from `DRAFT`, `CONFIRMED` or `IN_PRODUCTION`. Stock consumed by production is
    /// put back with the exact inverse adjustments, in the same commit.
    #[instrument(skip(self, reason), fields(tenant_id = %tenant_id, order_id = %order_id), err)]
    pub fn cancel_order(
        &self,
        tenant_id: TenantId,
        order_id: SalesOrderId,
        reason: Option<String>,
    ) -> EngineResult<OrderStatus> {
        let mut uow = self.begin(tenant_id);
        let mut order = uow.load_existing(order_id.0, || SalesOrder::empty(order_id))?;
        let events = uow.execute(
            &mut order,
            &SalesOrderCommand::CancelOrder(CancelOrder {
                tenant_id,
                order_id,
                reason,
                occurred_at: Utc::now(),
            }),
        )?;

        let mut restocked = 0usize;
        for event in &events {
            if let SalesOrderEvent::OrderCancelled(cancelled) = event {
                for movement in &cancelled.restocked {
                    apply_adjustment(
                        &mut uow,
                        movement.item_id,
                        movement.quantity,
                        AdjustmentReason::ProductionReversal {
                            order_id: order_id.0,
                        },
                    )?;
                    restocked += 1;
                }
            }
        }
        self.finish(uow)?;

        info!(restocked, status = ?order.status(), "order cancelled");
        Ok(order.status())
    }

    pub fn order(&self, tenant_id: TenantId, order_id: SalesOrderId) -> EngineResult<SalesOrder> {
        self.read(tenant_id, order_id.0, || SalesOrder::empty(order_id))
    }

    /// Status-only transitions with no stock effect.
    fn transition(
        &self,
        tenant_id: TenantId,
        order_id: SalesOrderId,
        command: SalesOrderCommand,
    ) -> EngineResult<OrderStatus> {
        let mut uow = self.begin(tenant_id);
        let mut order = uow.load_existing(order_id.0, || SalesOrder::empty(order_id))?;
        let from = order.status();
        uow.execute(&mut order, &command)?;
        self.finish(uow)?;

        info!(from = ?from, to = ?order.status(), "order transitioned");
        Ok(order.status())
    }
}

fn add_requirement(
    requirements: &mut BTreeMap<InventoryItemId, Decimal>,
    item_id: InventoryItemId,
    quantity: Decimal,
) -> Result<(), DomainError> {
    let total = requirements.entry(item_id).or_insert(Decimal::ZERO);
    *total = total.checked_add(quantity).ok_or_else(DomainError::overflow)?;
    Ok(())
}
