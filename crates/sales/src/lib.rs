//! Sales order lifecycle (event-sourced).
//!
//! The transition table decides what is legal; the `SalesOrder` aggregate records it. Stock
//! effects are planned here and carried out by the caller through the inventory ledger.

pub mod order;
pub mod transition;

pub use order::{
    AddLine, CancelOrder, ConfirmOrder, CreateOrder, DeliverOrder, LineAdded, MarkInvoiced,
    NewOrderLine, OrderCancelled, OrderConfirmed, OrderCreated, OrderDelivered, OrderInvoiced,
    OrderLine, OrderShipped, ProductionStarted, SalesOrder, SalesOrderCommand, SalesOrderEvent,
    SalesOrderId, ShipOrder, StartProduction, StockMovement,
};
pub use transition::{
    OrderStatus, OrderTransition, SideEffect, TRANSITION_TABLE, TransitionPlan, TransitionRule,
    plan,
};
