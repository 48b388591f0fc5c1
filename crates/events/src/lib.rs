//! Event primitives: the `Event` trait implemented by every aggregate's event enum, the
//! envelope committed events travel in, and the pub/sub bus used to notify collaborators
//! (document generation, email) after a successful commit.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::{EventEnvelope, JsonEnvelope};
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
