//! Order lifecycle as an explicit transition table.
//!
//! `(current status, transition) -> (next status, side effects)`. Anything not in the table is
//! an `InvalidTransition`; asking for the status the order is already in is a no-op.

use serde::{Deserialize, Serialize};

use ordercash_core::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Draft,
    Confirmed,
    InProduction,
    Shipped,
    Delivered,
    Invoiced,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Invoiced | OrderStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderTransition {
    Confirm,
    StartProduction,
    Ship,
    Deliver,
    Cancel,
    /// Only issued by invoice creation, never by a user.
    MarkInvoiced,
}

impl OrderTransition {
    pub fn target(self) -> OrderStatus {
        match self {
            OrderTransition::Confirm => OrderStatus::Confirmed,
            OrderTransition::StartProduction => OrderStatus::InProduction,
            OrderTransition::Ship => OrderStatus::Shipped,
            OrderTransition::Deliver => OrderStatus::Delivered,
            OrderTransition::Cancel => OrderStatus::Cancelled,
            OrderTransition::MarkInvoiced => OrderStatus::Invoiced,
        }
    }
}

/// Ledger work a transition requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SideEffect {
    /// Consume raw materials and stock items for every order line.
    ConsumeStock,
    /// Issue the exact inverse of every consumption previously recorded.
    RestoreStock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRule {
    pub from: OrderStatus,
    pub transition: OrderTransition,
    pub to: OrderStatus,
    pub effects: &'static [SideEffect],
}

pub const TRANSITION_TABLE: &[TransitionRule] = &[
    TransitionRule {
        from: OrderStatus::Draft,
        transition: OrderTransition::Confirm,
        to: OrderStatus::Confirmed,
        effects: &[],
    },
    TransitionRule {
        from: OrderStatus::Confirmed,
        transition: OrderTransition::StartProduction,
        to: OrderStatus::InProduction,
        effects: &[SideEffect::ConsumeStock],
    },
    TransitionRule {
        from: OrderStatus::InProduction,
        transition: OrderTransition::Ship,
        to: OrderStatus::Shipped,
        effects: &[],
    },
    TransitionRule {
        from: OrderStatus::Shipped,
        transition: OrderTransition::Deliver,
        to: OrderStatus::Delivered,
        effects: &[],
    },
    TransitionRule {
        from: OrderStatus::Delivered,
        transition: OrderTransition::MarkInvoiced,
        to: OrderStatus::Invoiced,
        effects: &[],
    },
    TransitionRule {
        from: OrderStatus::Draft,
        transition: OrderTransition::Cancel,
        to: OrderStatus::Cancelled,
        effects: &[],
    },
    TransitionRule {
        from: OrderStatus::Confirmed,
        transition: OrderTransition::Cancel,
        to: OrderStatus::Cancelled,
        effects: &[],
    },
    TransitionRule {
        from: OrderStatus::InProduction,
        transition: OrderTransition::Cancel,
        to: OrderStatus::Cancelled,
        effects: &[SideEffect::RestoreStock],
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPlan {
    /// The order is already in the requested status; nothing to do.
    AlreadyApplied,
    Apply {
        to: OrderStatus,
        effects: &'static [SideEffect],
    },
}

pub fn plan(from: OrderStatus, transition: OrderTransition) -> Result<TransitionPlan, DomainError> {
    if from == transition.target() {
        return Ok(TransitionPlan::AlreadyApplied);
    }

    TRANSITION_TABLE
        .iter()
        .find(|rule| rule.from == from && rule.transition == transition)
        .map(|rule| TransitionPlan::Apply {
            to: rule.to,
            effects: rule.effects,
        })
        .ok_or_else(|| DomainError::invalid_transition(from, transition.target()))
}
