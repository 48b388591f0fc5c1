//! `ordercash-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns): the aggregate
//! traits, the error model shared by every order-to-cash component, typed identifiers and
//! money rounding.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod money;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{CreditComponent, DomainError, DomainResult};
pub use id::{AggregateId, CustomerId, TenantId};
pub use money::{MONEY_SCALE, percent_of, round_money, rounded_sum};
