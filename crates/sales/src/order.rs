use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use ordercash_core::{
    Aggregate, AggregateId, AggregateRoot, CustomerId, DomainError, TenantId, typed_aggregate_id,
};
use ordercash_events::Event;
use ordercash_inventory::InventoryItemId;

use crate::transition::{OrderStatus, OrderTransition, SideEffect, TransitionPlan, plan};

typed_aggregate_id!(
    /// Sales order identifier (tenant-scoped via `tenant_id` fields in events/commands).
    SalesOrderId
);

/// Order line: item, quantity, unit price and flat VAT rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub line_no: u32,
    pub item_id: InventoryItemId,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub vat_rate_percent: Decimal,
}

/// Line as supplied by the caller; `line_no` is assigned by the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderLine {
    pub item_id: InventoryItemId,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub vat_rate_percent: Decimal,
}

impl NewOrderLine {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.quantity <= Decimal::ZERO {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if self.unit_price < Decimal::ZERO {
            return Err(DomainError::validation("unit_price cannot be negative"));
        }
        if self.vat_rate_percent < Decimal::ZERO || self.vat_rate_percent > Decimal::ONE_HUNDRED {
            return Err(DomainError::validation(
                "vat_rate_percent must be between 0 and 100",
            ));
        }
        Ok(())
    }
}

/// Stock taken from one item when production started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub item_id: InventoryItemId,
    pub quantity: Decimal,
}

/// Aggregate root: SalesOrder.
///
/// `status` is the single record of which side effects have already run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalesOrder {
    id: SalesOrderId,
    tenant_id: Option<TenantId>,
    customer_id: Option<CustomerId>,
    status: OrderStatus,
    lines: Vec<OrderLine>,
    consumed: Vec<StockMovement>,
    invoice_id: Option<AggregateId>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl SalesOrder {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: SalesOrderId) -> Self {
        Self {
            id,
            tenant_id: None,
            customer_id: None,
            status: OrderStatus::Draft,
            lines: Vec::new(),
            consumed: Vec::new(),
            invoice_id: None,
            created_at: None,
            updated_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> SalesOrderId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn customer_id(&self) -> Option<CustomerId> {
        self.customer_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    /// Consumption recorded at production start and not yet reversed.
    pub fn consumed(&self) -> &[StockMovement] {
        &self.consumed
    }

    pub fn invoice_id(&self) -> Option<AggregateId> {
        self.invoice_id
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn is_modifiable(&self) -> bool {
        matches!(self.status, OrderStatus::Draft)
    }

    /// What `transition` would do from the current status.
    pub fn plan(&self, transition: OrderTransition) -> Result<TransitionPlan, DomainError> {
        plan(self.status, transition)
    }
}

impl AggregateRoot for SalesOrder {
    type Id = SalesOrderId;

    const AGGREGATE_TYPE: &'static str = "sales.order";

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn aggregate_id(&self) -> AggregateId {
        self.id.0
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrder {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub customer_id: CustomerId,
    pub lines: Vec<NewOrderLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddLine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLine {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub line: NewOrderLine,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConfirmOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmOrder {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: StartProduction.
///
/// `consumption` is the aggregated stock the ledger has to give up for this order. It is
/// recorded so a later cancellation can reverse it exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartProduction {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub consumption: Vec<StockMovement>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ShipOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipOrder {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeliverOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverOrder {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkInvoiced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkInvoiced {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub invoice_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SalesOrderCommand {
    CreateOrder(CreateOrder),
    AddLine(AddLine),
    ConfirmOrder(ConfirmOrder),
    StartProduction(StartProduction),
    ShipOrder(ShipOrder),
    DeliverOrder(DeliverOrder),
    CancelOrder(CancelOrder),
    MarkInvoiced(MarkInvoiced),
}

/// Event: OrderCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub customer_id: CustomerId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAdded {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub line: OrderLine,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderConfirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderConfirmed {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductionStarted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionStarted {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub consumption: Vec<StockMovement>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderShipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderShipped {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderDelivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDelivered {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub previous_status: OrderStatus,
    /// Movements the ledger must put back; empty unless production had started.
    pub restocked: Vec<StockMovement>,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderInvoiced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderInvoiced {
    pub tenant_id: TenantId,
    pub order_id: SalesOrderId,
    pub invoice_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SalesOrderEvent {
    OrderCreated(OrderCreated),
    LineAdded(LineAdded),
    OrderConfirmed(OrderConfirmed),
    ProductionStarted(ProductionStarted),
    OrderShipped(OrderShipped),
    OrderDelivered(OrderDelivered),
    OrderCancelled(OrderCancelled),
    OrderInvoiced(OrderInvoiced),
}

impl Event for SalesOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SalesOrderEvent::OrderCreated(_) => "sales.order.created",
            SalesOrderEvent::LineAdded(_) => "sales.order.line_added",
            SalesOrderEvent::OrderConfirmed(_) => "sales.order.confirmed",
            SalesOrderEvent::ProductionStarted(_) => "sales.order.production_started",
            SalesOrderEvent::OrderShipped(_) => "sales.order.shipped",
            SalesOrderEvent::OrderDelivered(_) => "sales.order.delivered",
            SalesOrderEvent::OrderCancelled(_) => "sales.order.cancelled",
            SalesOrderEvent::OrderInvoiced(_) => "sales.order.invoiced",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SalesOrderEvent::OrderCreated(e) => e.occurred_at,
            SalesOrderEvent::LineAdded(e) => e.occurred_at,
            SalesOrderEvent::OrderConfirmed(e) => e.occurred_at,
            SalesOrderEvent::ProductionStarted(e) => e.occurred_at,
            SalesOrderEvent::OrderShipped(e) => e.occurred_at,
            SalesOrderEvent::OrderDelivered(e) => e.occurred_at,
            SalesOrderEvent::OrderCancelled(e) => e.occurred_at,
            SalesOrderEvent::OrderInvoiced(e) => e.occurred_at,
        }
    }
}

impl Aggregate for SalesOrder {
    type Command = SalesOrderCommand;
    type Event = SalesOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SalesOrderEvent::OrderCreated(e) => {
                self.id = e.order_id;
                self.tenant_id = Some(e.tenant_id);
                self.customer_id = Some(e.customer_id);
                self.status = OrderStatus::Draft;
                self.lines.clear();
                self.consumed.clear();
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            SalesOrderEvent::LineAdded(e) => {
                self.lines.push(e.line.clone());
            }
            SalesOrderEvent::OrderConfirmed(_) => {
                self.status = OrderStatus::Confirmed;
            }
            SalesOrderEvent::ProductionStarted(e) => {
                self.status = OrderStatus::InProduction;
                self.consumed = e.consumption.clone();
            }
            SalesOrderEvent::OrderShipped(_) => {
                self.status = OrderStatus::Shipped;
            }
            SalesOrderEvent::OrderDelivered(_) => {
                self.status = OrderStatus::Delivered;
            }
            SalesOrderEvent::OrderCancelled(_) => {
                self.status = OrderStatus::Cancelled;
                self.consumed.clear();
            }
            SalesOrderEvent::OrderInvoiced(e) => {
                self.status = OrderStatus::Invoiced;
                self.invoice_id = Some(e.invoice_id);
            }
        }

        self.updated_at = Some(event.occurred_at());
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SalesOrderCommand::CreateOrder(cmd) => self.handle_create(cmd),
            SalesOrderCommand::AddLine(cmd) => self.handle_add_line(cmd),
            SalesOrderCommand::ConfirmOrder(cmd) => self.handle_confirm(cmd),
            SalesOrderCommand::StartProduction(cmd) => self.handle_start_production(cmd),
            SalesOrderCommand::ShipOrder(cmd) => self.handle_ship(cmd),
            SalesOrderCommand::DeliverOrder(cmd) => self.handle_deliver(cmd),
            SalesOrderCommand::CancelOrder(cmd) => self.handle_cancel(cmd),
            SalesOrderCommand::MarkInvoiced(cmd) => self.handle_mark_invoiced(cmd),
        }
    }
}

impl SalesOrder {
    fn ensure_target(&self, tenant_id: TenantId, order_id: SalesOrderId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn next_line(&self, offset: usize, line: &NewOrderLine) -> Result<OrderLine, DomainError> {
        line.validate()?;
        Ok(OrderLine {
            line_no: (self.lines.len() + offset) as u32 + 1,
            item_id: line.item_id,
            quantity: line.quantity,
            unit_price: line.unit_price,
            vat_rate_percent: line.vat_rate_percent,
        })
    }

    fn handle_create(&self, cmd: &CreateOrder) -> Result<Vec<SalesOrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("sales order already exists"));
        }

        let mut events = vec![SalesOrderEvent::OrderCreated(OrderCreated {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            customer_id: cmd.customer_id,
            occurred_at: cmd.occurred_at,
        })];
        for (offset, line) in cmd.lines.iter().enumerate() {
            events.push(SalesOrderEvent::LineAdded(LineAdded {
                tenant_id: cmd.tenant_id,
                order_id: cmd.order_id,
                line: self.next_line(offset, line)?,
                occurred_at: cmd.occurred_at,
            }));
        }

        Ok(events)
    }

    fn handle_add_line(&self, cmd: &AddLine) -> Result<Vec<SalesOrderEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.order_id)?;

        if !self.is_modifiable() {
            return Err(DomainError::invariant(
                "cannot modify order once it has left draft",
            ));
        }

        Ok(vec![SalesOrderEvent::LineAdded(LineAdded {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            line: self.next_line(0, &cmd.line)?,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_confirm(&self, cmd: &ConfirmOrder) -> Result<Vec<SalesOrderEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.order_id)?;

        if self.plan(OrderTransition::Confirm)? == TransitionPlan::AlreadyApplied {
            return Ok(vec![]);
        }
        if self.lines.is_empty() {
            return Err(DomainError::validation("cannot confirm order without lines"));
        }

        Ok(vec![SalesOrderEvent::OrderConfirmed(OrderConfirmed {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_start_production(
        &self,
        cmd: &StartProduction,
    ) -> Result<Vec<SalesOrderEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.order_id)?;

        // Already in production: the stock was consumed once and must not be taken again.
        if self.plan(OrderTransition::StartProduction)? == TransitionPlan::AlreadyApplied {
            return Ok(vec![]);
        }
        if cmd.consumption.iter().any(|m| m.quantity <= Decimal::ZERO) {
            return Err(DomainError::validation("consumed quantities must be positive"));
        }

        Ok(vec![SalesOrderEvent::ProductionStarted(ProductionStarted {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            consumption: cmd.consumption.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_ship(&self, cmd: &ShipOrder) -> Result<Vec<SalesOrderEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.order_id)?;

        if self.plan(OrderTransition::Ship)? == TransitionPlan::AlreadyApplied {
            return Ok(vec![]);
        }

        Ok(vec![SalesOrderEvent::OrderShipped(OrderShipped {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deliver(&self, cmd: &DeliverOrder) -> Result<Vec<SalesOrderEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.order_id)?;

        if self.plan(OrderTransition::Deliver)? == TransitionPlan::AlreadyApplied {
            return Ok(vec![]);
        }

        Ok(vec![SalesOrderEvent::OrderDelivered(OrderDelivered {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelOrder) -> Result<Vec<SalesOrderEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.order_id)?;

        let restocked = match self.plan(OrderTransition::Cancel)? {
            TransitionPlan::AlreadyApplied => return Ok(vec![]),
            TransitionPlan::Apply { effects, .. } => {
                if effects.contains(&SideEffect::RestoreStock) {
                    self.consumed.clone()
                } else {
                    Vec::new()
                }
            }
        };

        Ok(vec![SalesOrderEvent::OrderCancelled(OrderCancelled {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            previous_status: self.status,
            restocked,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_invoiced(&self, cmd: &MarkInvoiced) -> Result<Vec<SalesOrderEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.order_id)?;

        if self.plan(OrderTransition::MarkInvoiced)? == TransitionPlan::AlreadyApplied {
            if self.invoice_id == Some(cmd.invoice_id) {
                return Ok(vec![]);
            }
            return Err(DomainError::conflict("order is already invoiced"));
        }

        Ok(vec![SalesOrderEvent::OrderInvoiced(OrderInvoiced {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            invoice_id: cmd.invoice_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
