use std::future::Future;

use async_trait::async_trait;

use crate::{HandlerError, QueuedMessage};

/// Consumes one message taken from a queue or a subscription.
///
/// Returning an error puts the message back for another delivery.
#[async_trait]
pub trait MessageHandler<M>: Send + Sync {
    async fn handle(&self, message: QueuedMessage<M>) -> Result<(), HandlerError>;
}

#[async_trait]
impl<M, F, Fut> MessageHandler<M> for F
where
    M: Send + 'static,
    F: Fn(QueuedMessage<M>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, message: QueuedMessage<M>) -> Result<(), HandlerError> {
        self(message).await
    }
}
