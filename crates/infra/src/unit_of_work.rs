//! One engine operation's transaction.
//!
//! A `UnitOfWork` loads aggregates from the store, runs commands against them and buffers the
//! decided events. Nothing reaches the store until [`UnitOfWork::commit`], which appends every
//! buffered event in a single multi-stream commit. Each loaded stream is guarded by the version
//! it had when loaded, so a concurrent writer on any of them fails the whole operation with
//! `ConcurrencyConflict` and nothing is written.
//!
//! ```text
//! load (history, tenant-checked) -> rehydrate -> handle -> apply + buffer -> commit (atomic)
//! ```

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use uuid::Uuid;

use ordercash_core::{Aggregate, AggregateId, DomainError, ExpectedVersion, TenantId};
use ordercash_events::Event;

use crate::error::{EngineError, EngineResult};
use crate::event_store::{
    EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent,
};

#[derive(Debug)]
struct PendingStream {
    aggregate_id: AggregateId,
    aggregate_type: &'static str,
    loaded_version: u64,
    pending: Vec<UncommittedEvent>,
}

#[derive(Debug)]
pub struct UnitOfWork<'a, S: ?Sized> {
    store: &'a S,
    tenant_id: TenantId,
    streams: Vec<PendingStream>,
}

impl<'a, S> UnitOfWork<'a, S>
where
    S: EventStore + ?Sized,
{
    pub fn new(store: &'a S, tenant_id: TenantId) -> Self {
        Self {
            store,
            tenant_id,
            streams: Vec::new(),
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Rehydrate an aggregate, including events already buffered for it in this unit of work.
    ///
    /// A stream that does not exist yet yields the aggregate produced by `make` (version 0).
    pub fn load<A>(&mut self, aggregate_id: AggregateId, make: impl FnOnce() -> A) -> EngineResult<A>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: Event + DeserializeOwned,
    {
        let mut aggregate = make();
        if aggregate.aggregate_id() != aggregate_id {
            return Err(DomainError::invariant("aggregate factory returned a different id").into());
        }

        if let Some(idx) = self.position(aggregate_id) {
            let stream = &self.streams[idx];
            if stream.aggregate_type != A::AGGREGATE_TYPE {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream {aggregate_id} is '{}', loaded as '{}'",
                    stream.aggregate_type,
                    A::AGGREGATE_TYPE
                ))
                .into());
            }
            // Reload from the store so the aggregate reflects the guarded version exactly.
            let history = self.store.load_stream(self.tenant_id, aggregate_id)?;
            validate_loaded_stream(self.tenant_id, aggregate_id, &history)?;
            if stream_version(&history) != stream.loaded_version {
                return Err(DomainError::concurrency(format!(
                    "stream {aggregate_id} moved on while the operation was running"
                ))
                .into());
            }
            apply_payloads(&mut aggregate, history.iter().map(|e| &e.payload))?;
            apply_payloads(&mut aggregate, stream.pending.iter().map(|e| &e.payload))?;
            return Ok(aggregate);
        }

        let history = self.store.load_stream(self.tenant_id, aggregate_id)?;
        validate_loaded_stream(self.tenant_id, aggregate_id, &history)?;
        if let Some(first) = history.first() {
            if first.aggregate_type != A::AGGREGATE_TYPE {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream {aggregate_id} is '{}', loaded as '{}'",
                    first.aggregate_type,
                    A::AGGREGATE_TYPE
                ))
                .into());
            }
        }
        apply_payloads(&mut aggregate, history.iter().map(|e| &e.payload))?;

        self.streams.push(PendingStream {
            aggregate_id,
            aggregate_type: A::AGGREGATE_TYPE,
            loaded_version: stream_version(&history),
            pending: Vec::new(),
        });
        Ok(aggregate)
    }

    /// Like [`load`](Self::load), but a stream with no events is `NotFound`.
    pub fn load_existing<A>(
        &mut self,
        aggregate_id: AggregateId,
        make: impl FnOnce() -> A,
    ) -> EngineResult<A>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: Event + DeserializeOwned,
    {
        let aggregate = self.load(aggregate_id, make)?;
        if aggregate.version() == 0 {
            return Err(DomainError::not_found().into());
        }
        Ok(aggregate)
    }

    /// Decide, apply and buffer. The aggregate must have been loaded through this unit of work.
    pub fn execute<A>(&mut self, aggregate: &mut A, command: &A::Command) -> EngineResult<Vec<A::Event>>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: Event + Serialize,
    {
        let aggregate_id = aggregate.aggregate_id();
        let idx = self.position(aggregate_id).ok_or_else(|| {
            DomainError::invariant(format!("stream {aggregate_id} was not loaded in this unit of work"))
        })?;

        let decided = aggregate.handle(command)?;
        for event in &decided {
            let uncommitted = UncommittedEvent::from_typed(
                self.tenant_id,
                aggregate_id,
                A::AGGREGATE_TYPE,
                Uuid::now_v7(),
                event,
            )?;
            aggregate.apply(event);
            self.streams[idx].pending.push(uncommitted);
        }

        debug!(
            aggregate_type = A::AGGREGATE_TYPE,
            aggregate_id = %aggregate_id,
            decided = decided.len(),
            "command handled"
        );
        Ok(decided)
    }

    pub fn has_pending(&self) -> bool {
        self.streams.iter().any(|s| !s.pending.is_empty())
    }

    /// Append everything buffered, all or nothing.
    ///
    /// Every stream loaded in this unit of work is version-checked, including the ones that were
    /// only read, so decisions are never based on state that changed before the commit.
    pub fn commit(self) -> EngineResult<Vec<StoredEvent>> {
        if !self.has_pending() {
            return Ok(vec![]);
        }

        let appends = self
            .streams
            .into_iter()
            .map(|s| StreamAppend {
                aggregate_id: s.aggregate_id,
                aggregate_type: s.aggregate_type.to_string(),
                expected_version: ExpectedVersion::Exact(s.loaded_version),
                events: s.pending,
            })
            .collect();

        Ok(self.store.commit(self.tenant_id, appends)?)
    }

    fn position(&self, aggregate_id: AggregateId) -> Option<usize> {
        self.streams.iter().position(|s| s.aggregate_id == aggregate_id)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> EngineResult<()> {
    // A buggy backend must not leak another tenant's history into a decision.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.tenant_id != tenant_id || e.aggregate_id != aggregate_id {
            return Err(EventStoreError::TenantIsolation(format!(
                "loaded stream contains a foreign event at index {idx}"
            ))
            .into());
        }
        if e.sequence_number <= last {
            return Err(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))
            .into());
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_payloads<'p, A>(
    aggregate: &mut A,
    payloads: impl Iterator<Item = &'p serde_json::Value>,
) -> EngineResult<()>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for payload in payloads {
        let event: A::Event = serde_json::from_value(payload.clone())
            .map_err(|e| EngineError::Deserialize(e.to_string()))?;
        aggregate.apply(&event);
    }
    Ok(())
}
