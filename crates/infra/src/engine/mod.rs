//! `OrderToCashEngine`: the synchronous facade every caller goes through.
//!
//! Each public operation is one transaction: it opens a [`UnitOfWork`], loads what it needs,
//! runs commands, and ends in a single atomic commit. Committed events are then published to
//! the bus for downstream collaborators (documents, email); a publish failure is logged and
//! never undoes the commit.

mod bom;
mod invoicing;
mod ledger;
mod orders;

use tracing::{debug, warn};

use ordercash_core::{Aggregate, AggregateId, DomainError, TenantId};
use ordercash_events::{Event, EventBus, JsonEnvelope};
use serde::de::DeserializeOwned;

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::event_store::{EventStore, StoredEvent};
use crate::unit_of_work::UnitOfWork;

pub use ledger::NewItem;

#[derive(Debug)]
pub struct OrderToCashEngine<S, B> {
    store: S,
    bus: B,
    config: EngineConfig,
}

impl<S, B> OrderToCashEngine<S, B> {
    pub fn new(store: S, bus: B, config: EngineConfig) -> Self {
        Self { store, bus, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl<S, B> OrderToCashEngine<S, B>
where
    S: EventStore,
    B: EventBus<JsonEnvelope>,
{
    fn begin(&self, tenant_id: TenantId) -> UnitOfWork<'_, S> {
        UnitOfWork::new(&self.store, tenant_id)
    }

    /// Commit, then publish. Publication is best-effort.
    fn finish(&self, uow: UnitOfWork<'_, S>) -> EngineResult<Vec<StoredEvent>> {
        let committed = uow.commit()?;
        for stored in &committed {
            if let Err(e) = self.bus.publish(stored.to_envelope()) {
                warn!(
                    event_id = %stored.event_id,
                    event_type = %stored.event_type,
                    error = ?e,
                    "event committed but not published"
                );
            }
        }
        debug!(events = committed.len(), "operation committed");
        Ok(committed)
    }

    /// Current state of one aggregate, outside any write.
    fn read<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        make: impl FnOnce() -> A,
    ) -> EngineResult<A>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: Event + DeserializeOwned,
    {
        self.begin(tenant_id).load_existing(aggregate_id, make)
    }
}
