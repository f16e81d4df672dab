use async_trait::async_trait;

use crate::{CallContext, MessageHandler, QueuedMessage, Result};

/// Default number of deliveries before a message is dead-lettered.
pub const DEFAULT_MAX_DELIVERIES: u32 = 5;

/// A point-to-point queue: each message is handled by one consumer.
#[async_trait]
pub trait MessageQueueStore<M>: Send + Sync {
    /// Enqueues a message and returns its envelope.
    async fn push(&self, call: &CallContext, message: M) -> Result<QueuedMessage<M>>;

    /// Claims the oldest pending message and hands it to `handler`.
    ///
    /// Returns `Ok(false)` when the queue is empty. When the handler fails the
    /// message goes back to the head of the queue with its delivery count
    /// incremented, or to the dead-letter list once it has been delivered
    /// `max_deliveries` times; the handler error is returned.
    async fn pop_single(&self, handler: &dyn MessageHandler<M>) -> Result<bool>;

    /// Number of pending messages.
    async fn count(&self) -> Result<u64>;

    /// Number of dead-lettered messages.
    async fn dead_letter_count(&self) -> Result<u64>;

    /// Drops every message, dead letters included. Intended for tests.
    async fn destroy_all(&self) -> Result<()>;
}
