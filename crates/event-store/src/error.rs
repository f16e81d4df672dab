use common::ErrorKind;
use thiserror::Error;

use crate::Version;

/// Errors that can occur when interacting with the event store.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// The first event of the batch is not contiguous with the stream head.
    #[error(
        "Concurrency conflict on stream {stream_name}: expected version {expected}, stream is at {actual}"
    )]
    ConcurrencyConflict {
        stream_name: String,
        expected: Version,
        actual: Version,
    },

    /// The batch of events is malformed.
    #[error("Invalid event batch: {0}")]
    InvalidBatch(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored row carries an identifier that no longer parses.
    #[error("Stored identifier is invalid: {0}")]
    InvalidIdentifier(#[from] common::InvalidIdentifier),
}

impl EventStoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EventStoreError::ConcurrencyConflict { .. } => ErrorKind::PreconditionViolation,
            EventStoreError::InvalidBatch(_) => ErrorKind::Validation,
            EventStoreError::Database(_)
            | EventStoreError::Migration(_)
            | EventStoreError::Serialization(_)
            | EventStoreError::InvalidIdentifier(_) => ErrorKind::Unexpected,
        }
    }
}

/// Result type for event store operations.
pub type Result<T> = std::result::Result<T, EventStoreError>;
