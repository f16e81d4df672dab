//! Dispatches persisted events to read-model projections.

use std::sync::Arc;

use async_trait::async_trait;
use domain::{ChangeEventObserver, ObserverError};
use event_store::{EventStore, EventStreamChangeEvent};
use futures_util::StreamExt;

use crate::Result;
use crate::projection::ReadModelProjection;

/// Feeds events to the projections registered for their aggregate type.
///
/// The projector supports:
/// - Live delivery: registered as a repository observer, it receives each saved batch
/// - Rebuild: resets all projections and replays every stream in the store
pub struct ReadModelProjector<S: EventStore> {
    store: S,
    projections: Vec<Arc<dyn ReadModelProjection>>,
}

impl<S: EventStore> ReadModelProjector<S> {
    /// Creates a new projector reading from the given event store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            projections: Vec::new(),
        }
    }

    /// Registers a projection with this projector.
    pub fn register(&mut self, projection: Arc<dyn ReadModelProjection>) {
        self.projections.push(projection);
    }

    pub fn with_projection(mut self, projection: Arc<dyn ReadModelProjection>) -> Self {
        self.register(projection);
        self
    }

    /// Returns the number of registered projections.
    pub fn projection_count(&self) -> usize {
        self.projections.len()
    }

    /// Projects one stream's events, in order, stopping at the first failure.
    ///
    /// Returns how many events were applied by at least one projection.
    #[tracing::instrument(skip(self, events), fields(count = events.len()))]
    pub async fn project(
        &self,
        stream_name: &str,
        events: &[EventStreamChangeEvent],
    ) -> Result<u64> {
        let mut applied = 0;
        for event in events {
            if self.project_event(event).await? {
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// Resets all projections and replays all events from the store.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild_all(&self) -> Result<u64> {
        for projection in &self.projections {
            projection.destroy_all().await?;
        }

        let mut stream = self.store.stream_all_events().await?;
        let mut replayed: u64 = 0;
        while let Some(result) = stream.next().await {
            let event = result?;
            self.project_event(&event).await?;
            replayed += 1;
        }

        tracing::info!(events_replayed = replayed, "rebuild complete");
        Ok(replayed)
    }

    async fn project_event(&self, event: &EventStreamChangeEvent) -> Result<bool> {
        let mut projected = false;
        for projection in self
            .projections
            .iter()
            .filter(|p| p.root_aggregate_type() == event.root_aggregate_type)
        {
            if projection.project_event(event).await? {
                metrics::counter!("projections_events_processed", "projection" => projection.name())
                    .increment(1);
                projected = true;
            } else {
                tracing::debug!(
                    projection = projection.name(),
                    event_type = %event.event_type,
                    version = %event.version,
                    "Event skipped by projection"
                );
            }
        }
        Ok(projected)
    }
}

#[async_trait]
impl<S: EventStore> ChangeEventObserver for ReadModelProjector<S> {
    fn name(&self) -> &str {
        "ReadModelProjector"
    }

    async fn on_stream_changed(
        &self,
        stream_name: &str,
        events: &[EventStreamChangeEvent],
    ) -> std::result::Result<(), ObserverError> {
        self.project(stream_name, events).await?;
        Ok(())
    }

    async fn destroy_all(&self, entity_name: &str) -> std::result::Result<(), ObserverError> {
        for projection in self
            .projections
            .iter()
            .filter(|p| p.root_aggregate_type() == entity_name)
        {
            projection.destroy_all().await?;
        }
        Ok(())
    }
}
