//! Relays persisted domain events to consumers and the message broker.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{ChangeEventMigrator, ChangeEventObserver, DomainEvent, ObserverError, Rehydrated};
use event_store::EventStreamChangeEvent;
use futures_util::future::join_all;
use messaging::{CallContext, IntegrationEventMessage};

use crate::broker::MessageBroker;
use crate::{ProjectionError, Result};

/// Reacts to a typed domain event inside this bounded context.
///
/// Consumers may see the same event more than once and must be idempotent.
#[async_trait]
pub trait DomainEventConsumer<E>: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(
        &self,
        event: &E,
        stored: &EventStreamChangeEvent,
    ) -> std::result::Result<(), ObserverError>;
}

/// Maps a domain event to the integration event other contexts see, if any.
pub trait IntegrationEventTranslator<E>: Send + Sync {
    fn name(&self) -> &str;

    fn translate(
        &self,
        event: &E,
        stored: &EventStreamChangeEvent,
    ) -> std::result::Result<Option<IntegrationEventMessage>, ObserverError>;
}

/// Type-erased notification pipeline for one aggregate type.
#[async_trait]
pub trait NotificationRegistration: Send + Sync {
    fn root_aggregate_type(&self) -> &str;

    /// Runs one event through the consumers, then the translator.
    async fn process(
        &self,
        event: &EventStreamChangeEvent,
        broker: &dyn MessageBroker,
    ) -> Result<()>;
}

/// Consumers and an optional translator for the events of one aggregate type.
pub struct EventNotificationRegistration<E> {
    root_aggregate_type: &'static str,
    migrator: Arc<ChangeEventMigrator>,
    consumers: Vec<Arc<dyn DomainEventConsumer<E>>>,
    translator: Option<Arc<dyn IntegrationEventTranslator<E>>>,
    _event: PhantomData<fn() -> E>,
}

impl<E: DomainEvent + 'static> EventNotificationRegistration<E> {
    pub fn new(root_aggregate_type: &'static str, migrator: Arc<ChangeEventMigrator>) -> Self {
        Self {
            root_aggregate_type,
            migrator,
            consumers: Vec::new(),
            translator: None,
            _event: PhantomData,
        }
    }

    /// Adds a consumer. Consumers run in the order they were added.
    pub fn with_consumer(mut self, consumer: Arc<dyn DomainEventConsumer<E>>) -> Self {
        self.consumers.push(consumer);
        self
    }

    pub fn with_translator(mut self, translator: Arc<dyn IntegrationEventTranslator<E>>) -> Self {
        self.translator = Some(translator);
        self
    }
}

#[async_trait]
impl<E: DomainEvent + 'static> NotificationRegistration for EventNotificationRegistration<E> {
    fn root_aggregate_type(&self) -> &str {
        self.root_aggregate_type
    }

    async fn process(
        &self,
        stored: &EventStreamChangeEvent,
        broker: &dyn MessageBroker,
    ) -> Result<()> {
        let event: E = match self.migrator.rehydrate(stored) {
            Rehydrated::Known(event) => event,
            Rehydrated::Unknown { event_type, .. } => {
                tracing::debug!(%event_type, version = %stored.version, "Skipping unknown event");
                return Ok(());
            }
            Rehydrated::Invalid { event_type, reason } => {
                return Err(ProjectionError::MalformedEvent {
                    event_id: stored.id,
                    event_type,
                    reason,
                });
            }
        };

        for consumer in &self.consumers {
            consumer
                .notify(&event, stored)
                .await
                .map_err(|source| ProjectionError::Consumer {
                    consumer: consumer.name().to_string(),
                    event_id: stored.id,
                    source,
                })?;
        }

        let Some(translator) = &self.translator else {
            return Ok(());
        };
        let integration_event =
            translator
                .translate(&event, stored)
                .map_err(|source| ProjectionError::Translator {
                    translator: translator.name().to_string(),
                    event_id: stored.id,
                    source,
                })?;

        if let Some(integration_event) = integration_event {
            broker
                .publish(&CallContext::system(), integration_event)
                .await
                .map_err(|source| ProjectionError::Publish {
                    event_id: stored.id,
                    source,
                })?;
        }
        Ok(())
    }
}

/// Runs newly persisted events through every registration of their aggregate type.
///
/// Registrations run concurrently. Within one registration events are handled
/// strictly in version order and the first failure stops that registration.
pub struct EventNotifier {
    registrations: Vec<Arc<dyn NotificationRegistration>>,
    broker: Arc<dyn MessageBroker>,
}

impl EventNotifier {
    pub fn new(broker: Arc<dyn MessageBroker>) -> Self {
        Self {
            registrations: Vec::new(),
            broker,
        }
    }

    pub fn register(&mut self, registration: Arc<dyn NotificationRegistration>) {
        self.registrations.push(registration);
    }

    pub fn with_registration(mut self, registration: Arc<dyn NotificationRegistration>) -> Self {
        self.register(registration);
        self
    }

    /// Notifies the matching registrations.
    ///
    /// Returns the first error in registration order once every registration
    /// has finished. Registrations that succeeded are not rolled back.
    #[tracing::instrument(skip(self, events), fields(count = events.len()))]
    pub async fn notify(&self, stream_name: &str, events: &[EventStreamChangeEvent]) -> Result<()> {
        let Some(first) = events.first() else {
            return Ok(());
        };
        let root_type = first.root_aggregate_type.as_str();

        let broker = self.broker.as_ref();
        let runs = self
            .registrations
            .iter()
            .filter(|r| r.root_aggregate_type() == root_type)
            .map(|registration| async move {
                for event in events {
                    registration.process(event, broker).await?;
                    metrics::counter!("notifier_events_relayed_total", "aggregate_type" => event.root_aggregate_type.clone())
                        .increment(1);
                }
                Ok::<_, ProjectionError>(())
            });

        let results: Vec<Result<()>> = join_all(runs).await;
        for result in &results {
            if let Err(e) = result {
                tracing::error!(stream_name, error = %e, "Notification failed");
            }
        }
        results.into_iter().collect()
    }
}

#[async_trait]
impl ChangeEventObserver for EventNotifier {
    fn name(&self) -> &str {
        "EventNotifier"
    }

    async fn on_stream_changed(
        &self,
        stream_name: &str,
        events: &[EventStreamChangeEvent],
    ) -> std::result::Result<(), ObserverError> {
        self.notify(stream_name, events).await?;
        Ok(())
    }
}
