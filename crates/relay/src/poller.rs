//! Background loops that drain queues and subscriptions on a fixed tick.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use messaging::{MessageBusTopicStore, MessageHandler, MessageQueueStore, MessagingError, names};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Something a poller can take one message from.
#[async_trait]
pub trait PollSource: Send + Sync + 'static {
    /// Name used in logs, e.g. `emails` or `integration_events/api`.
    fn name(&self) -> String;

    /// Handles the next pending message. Returns false when there is none.
    async fn poll_once(&self) -> Result<bool, MessagingError>;
}

/// A queue and the handler for its messages.
pub struct QueueSource<M> {
    name: String,
    queue: Arc<dyn MessageQueueStore<M>>,
    handler: Arc<dyn MessageHandler<M>>,
}

#[async_trait]
impl<M: Send + 'static> PollSource for QueueSource<M> {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn poll_once(&self) -> Result<bool, MessagingError> {
        self.queue.pop_single(self.handler.as_ref()).await
    }
}

/// A topic subscription and the handler for its messages.
pub struct TopicSource<M> {
    topic: String,
    subscription: String,
    bus: Arc<dyn MessageBusTopicStore<M>>,
    handler: Arc<dyn MessageHandler<M>>,
}

#[async_trait]
impl<M: Send + 'static> PollSource for TopicSource<M> {
    fn name(&self) -> String {
        format!("{}/{}", self.topic, self.subscription)
    }

    async fn poll_once(&self) -> Result<bool, MessagingError> {
        self.bus
            .receive_single(&self.topic, &self.subscription, self.handler.as_ref())
            .await
    }
}

/// Drains its source every tick until it is empty or a delivery fails.
///
/// A failed message stays at the head of its queue, so the poller waits for
/// the next tick before retrying it.
pub struct Poller<S> {
    source: S,
    interval: Duration,
}

/// Polls a point-to-point queue.
pub type QueuePoller<M> = Poller<QueueSource<M>>;

/// Polls one subscription of a topic.
pub type TopicPoller<M> = Poller<TopicSource<M>>;

impl<M: Send + 'static> Poller<QueueSource<M>> {
    pub fn for_queue(
        name: impl Into<String>,
        queue: Arc<dyn MessageQueueStore<M>>,
        handler: Arc<dyn MessageHandler<M>>,
        interval: Duration,
    ) -> Self {
        Self::new(
            QueueSource {
                name: name.into(),
                queue,
                handler,
            },
            interval,
        )
    }
}

impl<M: Send + 'static> Poller<TopicSource<M>> {
    /// # Panics
    ///
    /// Panics if the topic or subscription name is invalid.
    pub fn for_topic(
        topic: impl Into<String>,
        subscription: impl Into<String>,
        bus: Arc<dyn MessageBusTopicStore<M>>,
        handler: Arc<dyn MessageHandler<M>>,
        interval: Duration,
    ) -> Self {
        let topic = topic.into();
        let subscription = subscription.into();
        names::require_topic_name(&topic);
        names::require_subscription_name(&subscription);

        Self::new(
            TopicSource {
                topic,
                subscription,
                bus,
                handler,
            },
            interval,
        )
    }
}

impl<S: PollSource> Poller<S> {
    pub fn new(source: S, interval: Duration) -> Self {
        Self { source, interval }
    }

    /// Handles pending messages until the source is empty or a delivery fails.
    ///
    /// Returns how many messages were delivered.
    pub async fn drain(&self) -> u64 {
        let mut delivered = 0;
        loop {
            match self.source.poll_once().await {
                Ok(true) => delivered += 1,
                Ok(false) => break,
                Err(e) => {
                    tracing::warn!(source = %self.source.name(), error = %e, "Delivery failed, retrying next tick");
                    break;
                }
            }
        }
        delivered
    }

    /// Polls on every tick until `shutdown` turns true or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let name = self.source.name();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(source = %name, interval_ms = self.interval.as_millis() as u64, "Poller started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    let delivered = self.drain().await;
                    if delivered > 0 {
                        tracing::debug!(source = %name, delivered, "Drained");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!(source = %name, "Poller stopped");
    }

    /// Runs the poller on its own task.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use messaging::{
        CallContext, HandlerError, InMemoryMessageBusStore, InMemoryQueueStore, QueuedMessage,
    };
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Ping {
        n: u32,
    }

    fn counting_handler(
        counter: Arc<AtomicU64>,
        fail: bool,
    ) -> Arc<dyn MessageHandler<Ping>> {
        Arc::new(move |_message: QueuedMessage<Ping>| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if fail {
                    Err::<(), HandlerError>("api down".into())
                } else {
                    Ok(())
                }
            }
        })
    }

    #[tokio::test]
    async fn drain_empties_the_queue() {
        let queue = InMemoryQueueStore::new("emails");
        for i in 0..3 {
            queue
                .push(&CallContext::system(), Ping { n: i })
                .await
                .unwrap();
        }
        let handled = Arc::new(AtomicU64::new(0));
        let poller = QueuePoller::for_queue(
            "emails",
            Arc::new(queue.clone()),
            counting_handler(handled.clone(), false),
            Duration::from_millis(10),
        );

        assert_eq!(poller.drain().await, 3);
        assert_eq!(handled.load(Ordering::SeqCst), 3);
        assert_eq!(queue.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn drain_stops_at_a_failed_delivery() {
        let queue = InMemoryQueueStore::new("emails");
        queue.push(&CallContext::system(), Ping { n: 1 }).await.unwrap();
        queue.push(&CallContext::system(), Ping { n: 2 }).await.unwrap();
        let handled = Arc::new(AtomicU64::new(0));
        let poller = QueuePoller::for_queue(
            "emails",
            Arc::new(queue.clone()),
            counting_handler(handled.clone(), true),
            Duration::from_millis(10),
        );

        assert_eq!(poller.drain().await, 0);
        assert_eq!(handled.load(Ordering::SeqCst), 1);
        assert_eq!(queue.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn topic_poller_runs_until_shutdown() {
        let bus = InMemoryMessageBusStore::new();
        bus.send("integration_events", &CallContext::system(), Ping { n: 1 })
            .await
            .unwrap();
        let handled = Arc::new(AtomicU64::new(0));
        let poller = TopicPoller::for_topic(
            "integration_events",
            "api",
            Arc::new(bus.clone()),
            counting_handler(handled.clone(), false),
            Duration::from_millis(5),
        );

        let (shutdown, receiver) = watch::channel(false);
        let task = poller.spawn(receiver);
        for _ in 0..200 {
            if handled.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        shutdown.send(true).unwrap();
        task.await.unwrap();

        assert_eq!(handled.load(Ordering::SeqCst), 1);
        assert_eq!(bus.count("integration_events", "api").await.unwrap(), 0);
    }

    #[test]
    #[should_panic(expected = "invalid subscription name")]
    fn topic_poller_rejects_invalid_subscription() {
        let _ = TopicPoller::for_topic(
            "integration_events",
            "API",
            Arc::new(InMemoryMessageBusStore::<Ping>::new()),
            counting_handler(Arc::new(AtomicU64::new(0)), false),
            Duration::from_secs(1),
        );
    }
}
