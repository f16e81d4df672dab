use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    EventStoreError, EventStreamChangeEvent, NewEvent, Result, Version,
    event::stream_name,
    store::{Appended, EventStore, EventStream, require_parameter, validate_batch},
};

#[derive(Debug, Default)]
struct StoredStream {
    entity_name: String,
    /// Events in version order, each tagged with its global sequence.
    events: Vec<(u64, EventStreamChangeEvent)>,
}

impl StoredStream {
    fn version(&self) -> Version {
        self.events
            .last()
            .map(|(_, e)| e.version)
            .unwrap_or(Version::initial())
    }
}

#[derive(Debug, Default)]
struct Inner {
    streams: HashMap<String, StoredStream>,
    next_sequence: u64,
}

/// In-memory event store implementation for testing.
///
/// This implementation stores all events in memory and provides
/// the same interface as the PostgreSQL implementation. The concurrency
/// check and the append happen under one write lock.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryEventStore {
    /// Creates a new empty in-memory event store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.inner
            .read()
            .await
            .streams
            .values()
            .map(|s| s.events.len())
            .sum()
    }

    /// Clears all streams.
    pub async fn clear(&self) {
        self.inner.write().await.streams.clear();
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    #[tracing::instrument(skip(self, events), fields(count = events.len()))]
    async fn add_events(
        &self,
        entity_name: &str,
        entity_id: &str,
        events: Vec<NewEvent>,
    ) -> Result<Appended> {
        require_parameter("entity_name", entity_name);
        require_parameter("entity_id", entity_id);
        let expected = validate_batch(entity_id, &events)?;
        let name = stream_name(entity_name, entity_id);

        let mut inner = self.inner.write().await;

        let current = inner
            .streams
            .get(&name)
            .map(StoredStream::version)
            .unwrap_or(Version::initial());

        if current != expected {
            metrics::counter!("event_store_concurrency_conflicts_total").increment(1);
            return Err(EventStoreError::ConcurrencyConflict {
                stream_name: name,
                expected,
                actual: current,
            });
        }

        let persisted_at = Utc::now();
        let count = events.len() as u64;
        let first_sequence = inner.next_sequence;
        inner.next_sequence += count;

        let stream = inner
            .streams
            .entry(name.clone())
            .or_insert_with(|| StoredStream {
                entity_name: entity_name.to_string(),
                events: Vec::new(),
            });
        let persisted: Vec<EventStreamChangeEvent> = events
            .into_iter()
            .map(|event| EventStreamChangeEvent::persisted(event, name.clone(), persisted_at))
            .collect();
        stream.events.extend(
            persisted
                .iter()
                .cloned()
                .enumerate()
                .map(|(offset, event)| (first_sequence + offset as u64, event)),
        );

        metrics::counter!("event_store_events_appended_total").increment(count);
        Ok(Appended {
            stream_name: name,
            events: persisted,
        })
    }

    async fn get_event_stream(
        &self,
        entity_name: &str,
        entity_id: &str,
    ) -> Result<Vec<EventStreamChangeEvent>> {
        require_parameter("entity_name", entity_name);
        require_parameter("entity_id", entity_id);

        let inner = self.inner.read().await;
        Ok(inner
            .streams
            .get(&stream_name(entity_name, entity_id))
            .map(|s| s.events.iter().map(|(_, e)| e.clone()).collect())
            .unwrap_or_default())
    }

    async fn get_stream_version(
        &self,
        entity_name: &str,
        entity_id: &str,
    ) -> Result<Option<Version>> {
        require_parameter("entity_name", entity_name);
        require_parameter("entity_id", entity_id);

        let inner = self.inner.read().await;
        Ok(inner
            .streams
            .get(&stream_name(entity_name, entity_id))
            .and_then(|s| s.events.last().map(|(_, e)| e.version)))
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        use futures_util::stream;

        let inner = self.inner.read().await;
        let mut events: Vec<(u64, EventStreamChangeEvent)> = inner
            .streams
            .values()
            .flat_map(|s| s.events.iter().cloned())
            .collect();
        events.sort_by_key(|(sequence, _)| *sequence);

        let stream = stream::iter(events.into_iter().map(|(_, e)| Ok(e)));
        Ok(Box::pin(stream))
    }

    async fn destroy_all(&self, entity_name: &str) -> Result<()> {
        require_parameter("entity_name", entity_name);

        let mut inner = self.inner.write().await;
        inner.streams.retain(|_, s| s.entity_name != entity_name);
        Ok(())
    }
}
