use async_trait::async_trait;

use crate::{CallContext, MessageHandler, QueuedMessage, Result};

/// Default number of recent messages a topic keeps for subscriptions that
/// appear after a send.
pub const DEFAULT_RETENTION: usize = 1000;

/// Publish/subscribe topics: every subscription receives each message once.
///
/// A subscription that is first used after a send still receives the
/// messages the topic retains, up to a bounded window of recent messages.
///
/// # Panics
///
/// Every method panics if the topic or subscription name is invalid, see
/// [`names`](crate::names).
#[async_trait]
pub trait MessageBusTopicStore<M>: Send + Sync {
    /// Publishes a message to a topic.
    async fn send(&self, topic: &str, call: &CallContext, message: M) -> Result<QueuedMessage<M>>;

    /// Hands the next message of a subscription to `handler`.
    ///
    /// Returns `Ok(false)` when the subscription has nothing pending. Failure
    /// handling matches [`MessageQueueStore::pop_single`](crate::MessageQueueStore::pop_single)
    /// and only affects this subscription.
    async fn receive_single(
        &self,
        topic: &str,
        subscription: &str,
        handler: &dyn MessageHandler<M>,
    ) -> Result<bool>;

    /// Number of messages pending for a subscription.
    async fn count(&self, topic: &str, subscription: &str) -> Result<u64>;

    /// Drops a topic with all its subscriptions. Intended for tests.
    async fn destroy_all(&self, topic: &str) -> Result<()>;
}
