use crate::{HandlerError, MessagingError, QueuedMessage};

/// Logs a failed delivery and builds the error returned to the consumer.
pub(crate) fn handler_failed<M>(
    source_name: &str,
    message: &QueuedMessage<M>,
    dead_lettered: bool,
    source: HandlerError,
) -> MessagingError {
    if dead_lettered {
        metrics::counter!("queue_messages_dead_lettered_total", "queue" => source_name.to_string())
            .increment(1);
        tracing::error!(
            queue = source_name,
            message_id = %message.message_id,
            delivery_count = message.delivery_count,
            error = %source,
            "Message dead-lettered"
        );
    } else {
        tracing::warn!(
            queue = source_name,
            message_id = %message.message_id,
            delivery_count = message.delivery_count,
            error = %source,
            "Message handler failed, requeued"
        );
    }
    MessagingError::Handler {
        message_id: message.message_id.clone(),
        delivery_count: message.delivery_count,
        source,
    }
}
