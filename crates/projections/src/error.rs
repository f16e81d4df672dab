//! Projection error types.

use common::ErrorKind;
use domain::ObserverError;
use event_store::EventId;
use thiserror::Error;

/// Errors that can occur during projection and notification processing.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(#[from] event_store::EventStoreError),

    /// Failed to deserialize an event payload.
    #[error("Event deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// A stored event of a known type whose data does not decode.
    #[error("Event {event_id} ({event_type}) does not decode: {reason}")]
    MalformedEvent {
        event_id: EventId,
        event_type: String,
        reason: String,
    },

    /// A projection-specific error.
    #[error("Projection {projection} failed on event {event_id}: {message}")]
    Projection {
        projection: &'static str,
        event_id: EventId,
        message: String,
    },

    /// A domain-event consumer failed.
    #[error("Consumer {consumer} failed on event {event_id}: {source}")]
    Consumer {
        consumer: String,
        event_id: EventId,
        #[source]
        source: ObserverError,
    },

    /// An integration-event translator failed.
    #[error("Translator {translator} failed on event {event_id}: {source}")]
    Translator {
        translator: String,
        event_id: EventId,
        #[source]
        source: ObserverError,
    },

    /// Publishing an integration event failed.
    #[error("Publishing integration event for {event_id} failed: {source}")]
    Publish {
        event_id: EventId,
        #[source]
        source: messaging::MessagingError,
    },
}

impl ProjectionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProjectionError::EventStore(e) => e.kind(),
            ProjectionError::Publish { source, .. } => source.kind(),
            ProjectionError::Deserialization(_)
            | ProjectionError::MalformedEvent { .. }
            | ProjectionError::Projection { .. }
            | ProjectionError::Consumer { .. }
            | ProjectionError::Translator { .. } => ErrorKind::Unexpected,
        }
    }
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
