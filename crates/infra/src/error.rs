//! Engine-level error: what every `OrderToCashEngine` operation returns.

use thiserror::Error;

use ordercash_core::DomainError;

use crate::event_store::EventStoreError;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A business rule rejected the operation (including `ConcurrencyConflict`).
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Persisting or loading failed for a reason other than version contention.
    #[error("event store failure: {0}")]
    Store(EventStoreError),

    /// A historical payload no longer decodes into its aggregate's event type.
    #[error("stored event could not be decoded: {0}")]
    Deserialize(String),
}

impl From<EventStoreError> for EngineError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => {
                EngineError::Domain(DomainError::ConcurrencyConflict(msg))
            }
            other => EngineError::Store(other),
        }
    }
}

impl EngineError {
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            EngineError::Domain(e) => Some(e),
            _ => None,
        }
    }

    /// Only version contention is worth an automatic re-read and retry.
    pub fn is_retryable(&self) -> bool {
        self.domain().is_some_and(DomainError::is_retryable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_concurrency_surfaces_as_domain_conflict() {
        let err = EngineError::from(EventStoreError::Concurrency("stream moved".into()));
        assert!(matches!(
            err.domain(),
            Some(DomainError::ConcurrencyConflict(_))
        ));
        assert!(err.is_retryable());
    }

    #[test]
    fn other_store_failures_are_not_retryable() {
        let err = EngineError::from(EventStoreError::InvalidAppend("disk full".into()));
        assert!(matches!(err, EngineError::Store(_)));
        assert!(!err.is_retryable());
        assert!(!EngineError::from(DomainError::NotFound).is_retryable());
    }
}
