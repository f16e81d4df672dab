use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_core::Stream;

use crate::{EventStoreError, EventStreamChangeEvent, NewEvent, Result, Version};

/// A stream of persisted events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<EventStreamChangeEvent>> + Send>>;

/// A batch as it was written by [`EventStore::add_events`].
#[derive(Debug, Clone)]
pub struct Appended {
    pub stream_name: String,
    /// The batch in version order, stamped with the persistence time.
    pub events: Vec<EventStreamChangeEvent>,
}

/// Append-only, per-stream event log.
///
/// Streams are addressed by `(entity_name, entity_id)` and named
/// `{entity_name}_{entity_id}`. All implementations must be thread-safe.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends a batch of events to the stream of one aggregate.
    ///
    /// The first event of the batch must carry the version directly after the
    /// latest stored version (1 for an empty stream), otherwise the call
    /// fails with `ConcurrencyConflict` and nothing is appended. Either every
    /// event of the batch is appended or none is.
    ///
    /// Returns the stream name together with the persisted events.
    ///
    /// # Panics
    ///
    /// Panics if `entity_name` or `entity_id` is empty.
    async fn add_events(
        &self,
        entity_name: &str,
        entity_id: &str,
        events: Vec<NewEvent>,
    ) -> Result<Appended>;

    /// Returns every event of a stream in ascending version order.
    ///
    /// A stream that does not exist yields an empty list.
    async fn get_event_stream(
        &self,
        entity_name: &str,
        entity_id: &str,
    ) -> Result<Vec<EventStreamChangeEvent>>;

    /// Returns the latest version of a stream, or None if it has no events.
    async fn get_stream_version(&self, entity_name: &str, entity_id: &str)
    -> Result<Option<Version>>;

    /// Streams every persisted event in persistence order.
    async fn stream_all_events(&self) -> Result<EventStream>;

    /// Deletes every stream of an entity type. Intended for tests.
    async fn destroy_all(&self, entity_name: &str) -> Result<()>;
}

/// Extension trait providing convenience methods for event stores.
#[async_trait]
pub trait EventStoreExt: EventStore {
    /// Checks if a stream has any events.
    async fn stream_exists(&self, entity_name: &str, entity_id: &str) -> Result<bool> {
        Ok(self
            .get_stream_version(entity_name, entity_id)
            .await?
            .is_some())
    }
}

impl<T: EventStore + ?Sized> EventStoreExt for T {}

#[async_trait]
impl<T: EventStore + ?Sized> EventStore for Arc<T> {
    async fn add_events(
        &self,
        entity_name: &str,
        entity_id: &str,
        events: Vec<NewEvent>,
    ) -> Result<Appended> {
        (**self).add_events(entity_name, entity_id, events).await
    }

    async fn get_event_stream(
        &self,
        entity_name: &str,
        entity_id: &str,
    ) -> Result<Vec<EventStreamChangeEvent>> {
        (**self).get_event_stream(entity_name, entity_id).await
    }

    async fn get_stream_version(
        &self,
        entity_name: &str,
        entity_id: &str,
    ) -> Result<Option<Version>> {
        (**self).get_stream_version(entity_name, entity_id).await
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        (**self).stream_all_events().await
    }

    async fn destroy_all(&self, entity_name: &str) -> Result<()> {
        (**self).destroy_all(entity_name).await
    }
}

/// Panics when a required addressing parameter is missing.
pub(crate) fn require_parameter(name: &str, value: &str) {
    assert!(
        !value.trim().is_empty(),
        "event store parameter `{name}` must not be empty"
    );
}

/// Validates the shape of a batch before any concurrency check.
///
/// Every event must belong to `entity_id`. Returns the version the stream
/// must currently be at.
pub fn validate_batch(entity_id: &str, events: &[NewEvent]) -> Result<Version> {
    let Some(first) = events.first() else {
        return Err(EventStoreError::InvalidBatch(
            "cannot append an empty batch".to_string(),
        ));
    };

    if first.version < Version::first() {
        return Err(EventStoreError::InvalidBatch(format!(
            "event versions start at 1, got {}",
            first.version
        )));
    }

    if first.root_id.as_str() != entity_id {
        return Err(EventStoreError::InvalidBatch(format!(
            "event root {} does not match stream entity {entity_id}",
            first.root_id
        )));
    }

    let mut expected_version = first.version;
    for event in events.iter().skip(1) {
        if event.root_id != first.root_id {
            return Err(EventStoreError::InvalidBatch(
                "all events must belong to the same aggregate".to_string(),
            ));
        }
        if event.root_aggregate_type != first.root_aggregate_type {
            return Err(EventStoreError::InvalidBatch(
                "all events must have the same root aggregate type".to_string(),
            ));
        }
        expected_version = expected_version.next();
        if event.version != expected_version {
            return Err(EventStoreError::InvalidBatch(format!(
                "event versions must be sequential, expected {expected_version}, got {}",
                event.version
            )));
        }
    }

    Ok(Version::new(first.version.as_i64() - 1))
}
