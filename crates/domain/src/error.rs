//! Domain error types.

use common::{ErrorKind, InvalidIdentifier};
use event_store::{EventStoreError, Version};
use thiserror::Error;

use crate::car::CarError;

/// Boxed error returned by change-event observers.
pub type ObserverError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// An error occurred in the car aggregate.
    #[error("Car error: {0}")]
    Car(CarError),

    /// Aggregate not found.
    #[error("Aggregate not found: {aggregate_type} with id {aggregate_id}")]
    AggregateNotFound {
        aggregate_type: &'static str,
        aggregate_id: String,
    },

    /// A create was saved for an aggregate whose stream already has events.
    #[error("Aggregate already exists: {aggregate_type} with id {aggregate_id}")]
    AggregateExists {
        aggregate_type: &'static str,
        aggregate_id: String,
    },

    /// A stored stream is not contiguous.
    #[error("Stream {stream_name} is corrupt: expected version {expected}, found {actual}")]
    CorruptStream {
        stream_name: String,
        expected: Version,
        actual: Version,
    },

    /// A stored event could not be decoded into the aggregate's events.
    #[error("Unknown event {event_type} for aggregate {aggregate_type}")]
    UnknownEvent {
        aggregate_type: &'static str,
        event_type: String,
    },

    /// A stored event of a known type whose data does not decode.
    #[error("Malformed event {event_type} at version {version} of {stream_name}: {reason}")]
    MalformedEvent {
        stream_name: String,
        event_type: String,
        version: Version,
        reason: String,
    },

    /// An upcaster registration would make the chain ambiguous or cyclic.
    #[error("Invalid upcaster for {event_type}: {reason}")]
    InvalidUpcaster {
        event_type: String,
        reason: &'static str,
    },

    /// An observer failed after the events were persisted.
    #[error("Observer {observer} failed: {source}")]
    Notification {
        observer: String,
        #[source]
        source: ObserverError,
    },

    /// Invalid identifier.
    #[error(transparent)]
    InvalidIdentifier(#[from] InvalidIdentifier),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::EventStore(e) => e.kind(),
            DomainError::Car(e) => e.kind(),
            DomainError::AggregateNotFound { .. } => ErrorKind::EntityNotFound,
            DomainError::AggregateExists { .. } => ErrorKind::EntityExists,
            DomainError::InvalidIdentifier(_) => ErrorKind::Validation,
            DomainError::CorruptStream { .. }
            | DomainError::UnknownEvent { .. }
            | DomainError::MalformedEvent { .. }
            | DomainError::InvalidUpcaster { .. }
            | DomainError::Notification { .. }
            | DomainError::Serialization(_) => ErrorKind::Unexpected,
        }
    }

    /// Returns true when the save lost an optimistic-concurrency race.
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(
            self,
            DomainError::EventStore(EventStoreError::ConcurrencyConflict { .. })
        )
    }
}
