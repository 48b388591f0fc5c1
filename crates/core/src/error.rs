//! Domain error model.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::id::AggregateId;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Which half of a credited line exceeded its remaining balance.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CreditComponent {
    Amount,
    Vat,
}

impl core::fmt::Display for CreditComponent {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CreditComponent::Amount => f.write_str("amount"),
            CreditComponent::Vat => f.write_str("vat"),
        }
    }
}

/// Domain-level error.
///
/// Every variant aborts the enclosing operation; nothing is clamped or retried on the
/// caller's behalf. Only `ConcurrencyConflict` signals transient contention.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// Creation of something that already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Illegal state change requested.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Adjustment would drive an item's quantity on hand below zero.
    #[error("insufficient stock for item {item_id}: on hand {on_hand}, requested {requested}")]
    InsufficientStock {
        item_id: AggregateId,
        on_hand: Decimal,
        requested: Decimal,
    },

    /// Component graph contains a cycle; `path` ends with the repeated item.
    #[error("bill of material cycle through {}", format_path(.path))]
    CyclicBom { path: Vec<AggregateId> },

    /// Manufactured item referenced without an active bill of material.
    #[error("manufactured item {item_id} has no active bill of material")]
    IncompleteBom { item_id: AggregateId },

    /// Credit note would exceed what is still creditable on an invoice line.
    #[error("credit {component} {requested} on invoice line {line_no} exceeds remaining {remaining}")]
    OverCredit {
        line_no: u32,
        component: CreditComponent,
        requested: Decimal,
        remaining: Decimal,
    },

    /// Lock/version contention detected by the store; safe to retry after re-reading.
    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),
}

fn format_path(path: &[AggregateId]) -> String {
    path.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn concurrency(msg: impl Into<String>) -> Self {
        Self::ConcurrencyConflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    /// A quantity or cost left the representable decimal range.
    pub fn overflow() -> Self {
        Self::Validation("quantity overflow".to_string())
    }

    pub fn invalid_transition(from: impl core::fmt::Debug, to: impl core::fmt::Debug) -> Self {
        Self::InvalidTransition {
            from: format!("{from:?}"),
            to: format!("{to:?}"),
        }
    }

    /// True only for transient contention; every other kind needs new caller input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict(_))
    }
}
