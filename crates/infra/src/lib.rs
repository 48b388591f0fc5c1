//! Infrastructure layer: event store, unit of work, configuration, and the order-to-cash
//! engine that ties the domain crates together.

pub mod config;
pub mod engine;
pub mod error;
pub mod event_store;
pub mod unit_of_work;


pub use config::{ConfigError, EngineConfig};
pub use engine::{NewItem, OrderToCashEngine};
pub use error::{EngineError, EngineResult};
pub use event_store::{EventStore, EventStoreError, InMemoryEventStore, StoredEvent};
#[cfg(feature = "postgres")]
pub use event_store::PostgresEventStore;
pub use unit_of_work::UnitOfWork;
