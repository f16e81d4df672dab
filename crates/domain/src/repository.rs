//! Loading and saving event-sourced aggregates.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::Identifier;
use event_store::{EventStore, EventStoreError, EventStreamChangeEvent, Version};
use futures_util::future::{join, join_all};

use crate::aggregate::Aggregate;
use crate::error::{DomainError, ObserverError};
use crate::migrator::ChangeEventMigrator;
use crate::root::EventSourcedRoot;

/// Receives the events of a stream after they were persisted.
///
/// Implemented by the read-model projector and the event notifier.
#[async_trait]
pub trait ChangeEventObserver: Send + Sync {
    /// Name used in logs and error messages.
    fn name(&self) -> &str;

    /// Called with the newly persisted events of one stream, in version order.
    async fn on_stream_changed(
        &self,
        stream_name: &str,
        events: &[EventStreamChangeEvent],
    ) -> Result<(), ObserverError>;

    /// Drops everything the observer derived for an entity type. Intended for tests.
    async fn destroy_all(&self, _entity_name: &str) -> Result<(), ObserverError> {
        Ok(())
    }
}

/// Repository for event-sourced aggregates.
///
/// The repository is responsible for:
/// 1. Loading an aggregate by replaying its stream through the migrator
/// 2. Appending the aggregate's pending changes with an optimistic check
/// 3. Relaying the persisted events to every registered observer
pub struct EventSourcingRepository<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    store: S,
    migrator: Arc<ChangeEventMigrator>,
    observers: Vec<Arc<dyn ChangeEventObserver>>,
    _phantom: PhantomData<A>,
}

impl<S, A> EventSourcingRepository<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    /// Creates a repository with no upcasters and no observers.
    pub fn new(store: S) -> Self {
        Self {
            store,
            migrator: Arc::new(ChangeEventMigrator::new()),
            observers: Vec::new(),
            _phantom: PhantomData,
        }
    }

    pub fn with_migrator(mut self, migrator: Arc<ChangeEventMigrator>) -> Self {
        self.migrator = migrator;
        self
    }

    /// Adds an observer. Observers are notified concurrently after each save.
    pub fn with_observer(mut self, observer: Arc<dyn ChangeEventObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Returns a reference to the underlying event store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn migrator(&self) -> &Arc<ChangeEventMigrator> {
        &self.migrator
    }

    /// Loads an aggregate from its stream.
    ///
    /// Fails with `AggregateNotFound` if the stream is empty.
    #[tracing::instrument(skip(self), fields(aggregate_type = A::aggregate_type()))]
    pub async fn load(&self, id: &Identifier) -> Result<EventSourcedRoot<A>, DomainError> {
        let events = self
            .store
            .get_event_stream(A::aggregate_type(), id.as_str())
            .await?;

        if events.is_empty() {
            return Err(DomainError::AggregateNotFound {
                aggregate_type: A::aggregate_type(),
                aggregate_id: id.to_string(),
            });
        }

        let mut root = EventSourcedRoot::new(id.clone());
        root.load_changes(&events, &self.migrator)?;
        Ok(root)
    }

    /// Loads an aggregate, returning None if it doesn't exist.
    pub async fn load_existing(
        &self,
        id: &Identifier,
    ) -> Result<Option<EventSourcedRoot<A>>, DomainError> {
        match self.load(id).await {
            Ok(root) => Ok(Some(root)),
            Err(DomainError::AggregateNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Persists the pending changes of an aggregate and notifies observers.
    ///
    /// A root without changes is a no-op. If the append fails the root is left
    /// untouched, pending changes included. Saving a newly created root over
    /// an existing stream fails with `AggregateExists`. Once the append
    /// succeeds the changes are cleared, even if an observer then fails.
    #[tracing::instrument(
        skip(self, root),
        fields(aggregate_type = A::aggregate_type(), id = %root.id())
    )]
    pub async fn save(&self, root: &mut EventSourcedRoot<A>) -> Result<(), DomainError> {
        if !root.has_changes() {
            return Ok(());
        }

        let appended = match self
            .store
            .add_events(
                A::aggregate_type(),
                root.id().as_str(),
                root.get_changes().to_vec(),
            )
            .await
        {
            Ok(appended) => appended,
            Err(EventStoreError::ConcurrencyConflict {
                expected, actual, ..
            }) if expected == Version::initial() && actual > Version::initial() => {
                return Err(DomainError::AggregateExists {
                    aggregate_type: A::aggregate_type(),
                    aggregate_id: root.id().to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        root.clear_changes();
        root.mark_persisted(
            appended
                .events
                .last()
                .map(|e| e.last_persisted_at_utc)
                .unwrap_or_else(Utc::now),
        );

        metrics::counter!("repository_saves_total", "aggregate_type" => A::aggregate_type())
            .increment(1);
        tracing::debug!(
            stream_name = %appended.stream_name,
            count = appended.events.len(),
            "Saved aggregate changes"
        );

        self.notify(&appended.stream_name, &appended.events).await
    }

    /// Deletes every stream of this aggregate type and everything the
    /// observers derived from them. Intended for tests.
    pub async fn destroy_all(&self) -> Result<(), DomainError> {
        let entity_name = A::aggregate_type();
        let observers = join_all(self.observers.iter().map(|observer| async move {
            observer
                .destroy_all(entity_name)
                .await
                .map_err(|source| DomainError::Notification {
                    observer: observer.name().to_string(),
                    source,
                })
        }));

        let (store_result, observer_results) =
            join(self.store.destroy_all(entity_name), observers).await;
        store_result?;
        observer_results.into_iter().collect()
    }

    async fn notify(
        &self,
        stream_name: &str,
        events: &[EventStreamChangeEvent],
    ) -> Result<(), DomainError> {
        if events.is_empty() {
            return Ok(());
        }

        let results = join_all(self.observers.iter().map(|observer| async move {
            observer
                .on_stream_changed(stream_name, events)
                .await
                .map_err(|source| {
                    tracing::error!(
                        observer = observer.name(),
                        stream_name,
                        error = %source,
                        "Observer failed after save"
                    );
                    DomainError::Notification {
                        observer: observer.name().to_string(),
                        source,
                    }
                })
        }))
        .await;

        results.into_iter().collect()
    }
}
