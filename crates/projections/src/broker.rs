//! Publishing integration events to other bounded contexts.

use async_trait::async_trait;
use messaging::{
    CallContext, INTEGRATION_EVENTS_TOPIC, IntegrationEventMessage, MessageBusTopicStore,
    MessagingError, names,
};

/// Destination for integration events produced by the notifier.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    async fn publish(
        &self,
        call: &CallContext,
        event: IntegrationEventMessage,
    ) -> Result<(), MessagingError>;
}

/// Publishes integration events to a message-bus topic.
pub struct TopicMessageBroker<B> {
    bus: B,
    topic: String,
}

impl<B: MessageBusTopicStore<IntegrationEventMessage>> TopicMessageBroker<B> {
    /// Publishes to the shared `integration_events` topic.
    pub fn new(bus: B) -> Self {
        Self::with_topic(bus, INTEGRATION_EVENTS_TOPIC)
    }

    /// # Panics
    ///
    /// Panics if `topic` is not a valid topic name.
    pub fn with_topic(bus: B, topic: impl Into<String>) -> Self {
        let topic = topic.into();
        names::require_topic_name(&topic);
        Self { bus, topic }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

#[async_trait]
impl<B: MessageBusTopicStore<IntegrationEventMessage>> MessageBroker for TopicMessageBroker<B> {
    #[tracing::instrument(skip(self, call, event), fields(topic = %self.topic, event_name = %event.event_name))]
    async fn publish(
        &self,
        call: &CallContext,
        event: IntegrationEventMessage,
    ) -> Result<(), MessagingError> {
        self.bus.send(&self.topic, call, event).await?;
        Ok(())
    }
}
