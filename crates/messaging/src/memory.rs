use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::{
    CallContext, MessageBusTopicStore, MessageHandler, MessagePayload, MessageQueueStore,
    QueuedMessage, Result,
    bus::DEFAULT_RETENTION,
    delivery::handler_failed,
    names::{require_subscription_name, require_topic_name},
    queue::DEFAULT_MAX_DELIVERIES,
};

/// Locks are never held across an await, so a poisoned lock only means a
/// handler panicked elsewhere; the data is still consistent.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Pending and dead-lettered messages of one queue or subscription.
#[derive(Debug)]
struct Mailbox<M> {
    pending: VecDeque<QueuedMessage<M>>,
    dead_letters: Vec<QueuedMessage<M>>,
}

impl<M> Default for Mailbox<M> {
    fn default() -> Self {
        Self {
            pending: VecDeque::new(),
            dead_letters: Vec::new(),
        }
    }
}

impl<M> Mailbox<M> {
    fn seeded(messages: impl IntoIterator<Item = QueuedMessage<M>>) -> Self {
        Self {
            pending: messages.into_iter().collect(),
            dead_letters: Vec::new(),
        }
    }

    /// Takes the head message and counts the delivery.
    fn claim(&mut self) -> Option<QueuedMessage<M>> {
        let mut message = self.pending.pop_front()?;
        message.delivery_count += 1;
        Some(message)
    }

    /// Puts a failed message back at the head, or dead-letters it.
    ///
    /// Returns true if the message was dead-lettered.
    fn release(&mut self, message: QueuedMessage<M>, max_deliveries: u32) -> bool {
        if message.delivery_count >= max_deliveries {
            self.dead_letters.push(message);
            true
        } else {
            self.pending.push_front(message);
            false
        }
    }

    /// Returns a message whose handling never finished, uncounted.
    fn restore(&mut self, mut message: QueuedMessage<M>) {
        message.delivery_count = message.delivery_count.saturating_sub(1);
        tracing::debug!(message_id = %message.message_id, "Handler cancelled, message restored");
        self.pending.push_front(message);
    }
}

/// A claimed message whose handler has not resolved yet.
///
/// If the handling future is dropped before [`settle`](Self::settle), the
/// message goes back to the head of its mailbox.
struct InFlight<M, F: FnOnce(QueuedMessage<M>)> {
    claim: Option<(QueuedMessage<M>, F)>,
}

impl<M, F: FnOnce(QueuedMessage<M>)> InFlight<M, F> {
    fn new(message: QueuedMessage<M>, restore: F) -> Self {
        Self {
            claim: Some((message, restore)),
        }
    }

    fn settle(mut self) {
        self.claim = None;
    }
}

impl<M, F: FnOnce(QueuedMessage<M>)> Drop for InFlight<M, F> {
    fn drop(&mut self) {
        if let Some((message, restore)) = self.claim.take() {
            restore(message);
        }
    }
}

/// In-memory queue for tests and single-process hosts.
#[derive(Clone)]
pub struct InMemoryQueueStore<M> {
    queue_name: String,
    max_deliveries: u32,
    inner: Arc<Mutex<Mailbox<M>>>,
}

impl<M: MessagePayload> InMemoryQueueStore<M> {
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            max_deliveries: DEFAULT_MAX_DELIVERIES,
            inner: Arc::new(Mutex::new(Mailbox::default())),
        }
    }

    /// Sets how many deliveries a message gets before it is dead-lettered.
    pub fn with_max_deliveries(mut self, max_deliveries: u32) -> Self {
        self.max_deliveries = max_deliveries.max(1);
        self
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Snapshot of the dead-lettered messages.
    pub fn dead_letters(&self) -> Vec<QueuedMessage<M>> {
        lock(&self.inner).dead_letters.clone()
    }
}

#[async_trait]
impl<M: MessagePayload> MessageQueueStore<M> for InMemoryQueueStore<M> {
    #[tracing::instrument(skip(self, call, message), fields(queue = %self.queue_name))]
    async fn push(&self, call: &CallContext, message: M) -> Result<QueuedMessage<M>> {
        let queued = QueuedMessage::new(call, message);
        lock(&self.inner).pending.push_back(queued.clone());
        metrics::counter!("queue_messages_pushed_total", "queue" => self.queue_name.clone())
            .increment(1);
        Ok(queued)
    }

    async fn pop_single(&self, handler: &dyn MessageHandler<M>) -> Result<bool> {
        let claimed = lock(&self.inner).claim();
        let Some(message) = claimed else {
            return Ok(false);
        };

        let inner = self.inner.clone();
        let in_flight = InFlight::new(message.clone(), move |message| {
            lock(&inner).restore(message)
        });
        let outcome = handler.handle(message.clone()).await;
        in_flight.settle();

        match outcome {
            Ok(()) => Ok(true),
            Err(source) => {
                let dead_lettered =
                    lock(&self.inner).release(message.clone(), self.max_deliveries);
                Err(handler_failed(
                    &self.queue_name,
                    &message,
                    dead_lettered,
                    source,
                ))
            }
        }
    }

    async fn count(&self) -> Result<u64> {
        Ok(lock(&self.inner).pending.len() as u64)
    }

    async fn dead_letter_count(&self) -> Result<u64> {
        Ok(lock(&self.inner).dead_letters.len() as u64)
    }

    async fn destroy_all(&self) -> Result<()> {
        *lock(&self.inner) = Mailbox::default();
        Ok(())
    }
}

#[derive(Debug)]
struct Topic<M> {
    /// The most recent messages, replayed to subscriptions created later.
    retained: VecDeque<QueuedMessage<M>>,
    subscriptions: HashMap<String, Mailbox<M>>,
}

impl<M> Default for Topic<M> {
    fn default() -> Self {
        Self {
            retained: VecDeque::new(),
            subscriptions: HashMap::new(),
        }
    }
}

impl<M: Clone> Topic<M> {
    fn subscription(&mut self, subscription: &str) -> &mut Mailbox<M> {
        let retained = &self.retained;
        self.subscriptions
            .entry(subscription.to_string())
            .or_insert_with(|| Mailbox::seeded(retained.iter().cloned()))
    }
}

type Topics<M> = Arc<Mutex<HashMap<String, Topic<M>>>>;

/// In-memory topics for tests and single-process hosts.
///
/// Each topic keeps its last `retention` messages for subscriptions that
/// first appear after a send. A subscription declared with
/// [`subscribe`](Self::subscribe) or already used receives every later
/// message regardless of retention.
#[derive(Clone)]
pub struct InMemoryMessageBusStore<M> {
    max_deliveries: u32,
    retention: usize,
    topics: Topics<M>,
}

impl<M: MessagePayload> Default for InMemoryMessageBusStore<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: MessagePayload> InMemoryMessageBusStore<M> {
    pub fn new() -> Self {
        Self {
            max_deliveries: DEFAULT_MAX_DELIVERIES,
            retention: DEFAULT_RETENTION,
            topics: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Sets how many deliveries a message gets before it is dead-lettered.
    pub fn with_max_deliveries(mut self, max_deliveries: u32) -> Self {
        self.max_deliveries = max_deliveries.max(1);
        self
    }

    /// Sets how many recent messages a topic keeps for late subscriptions.
    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention;
        self
    }

    /// Creates a subscription ahead of its first receive.
    ///
    /// # Panics
    ///
    /// Panics if the topic or subscription name is invalid.
    pub fn subscribe(&self, topic: &str, subscription: &str) {
        require_topic_name(topic);
        require_subscription_name(subscription);

        lock(&self.topics)
            .entry(topic.to_string())
            .or_default()
            .subscription(subscription);
    }

    /// Number of dead-lettered messages of a subscription.
    pub fn dead_letter_count(&self, topic: &str, subscription: &str) -> u64 {
        lock(&self.topics)
            .get(topic)
            .and_then(|t| t.subscriptions.get(subscription))
            .map(|s| s.dead_letters.len() as u64)
            .unwrap_or(0)
    }
}

#[async_trait]
impl<M: MessagePayload> MessageBusTopicStore<M> for InMemoryMessageBusStore<M> {
    #[tracing::instrument(skip(self, call, message))]
    async fn send(&self, topic: &str, call: &CallContext, message: M) -> Result<QueuedMessage<M>> {
        require_topic_name(topic);

        let queued = QueuedMessage::new(call, message);
        {
            let mut topics = lock(&self.topics);
            let state = topics.entry(topic.to_string()).or_default();
            for mailbox in state.subscriptions.values_mut() {
                mailbox.pending.push_back(queued.clone());
            }
            state.retained.push_back(queued.clone());
            while state.retained.len() > self.retention {
                state.retained.pop_front();
            }
        }

        metrics::counter!("queue_messages_pushed_total", "queue" => topic.to_string())
            .increment(1);
        Ok(queued)
    }

    async fn receive_single(
        &self,
        topic: &str,
        subscription: &str,
        handler: &dyn MessageHandler<M>,
    ) -> Result<bool> {
        require_topic_name(topic);
        require_subscription_name(subscription);

        let claimed = {
            let mut topics = lock(&self.topics);
            match topics.get_mut(topic) {
                Some(state) => state.subscription(subscription).claim(),
                None => None,
            }
        };
        let Some(message) = claimed else {
            return Ok(false);
        };

        let topics = self.topics.clone();
        let (topic_name, subscription_name) = (topic.to_string(), subscription.to_string());
        let in_flight = InFlight::new(message.clone(), move |message| {
            // Dropped if the topic was destroyed meanwhile.
            if let Some(mailbox) = lock(&topics)
                .get_mut(&topic_name)
                .and_then(|t| t.subscriptions.get_mut(&subscription_name))
            {
                mailbox.restore(message);
            }
        });
        let outcome = handler.handle(message.clone()).await;
        in_flight.settle();

        match outcome {
            Ok(()) => Ok(true),
            Err(source) => {
                let dead_lettered = match lock(&self.topics)
                    .get_mut(topic)
                    .and_then(|t| t.subscriptions.get_mut(subscription))
                {
                    Some(mailbox) => mailbox.release(message.clone(), self.max_deliveries),
                    // The topic was destroyed while the handler ran.
                    None => false,
                };
                let source_name = format!("{topic}/{subscription}");
                Err(handler_failed(&source_name, &message, dead_lettered, source))
            }
        }
    }

    async fn count(&self, topic: &str, subscription: &str) -> Result<u64> {
        require_topic_name(topic);
        require_subscription_name(subscription);

        let topics = lock(&self.topics);
        Ok(topics
            .get(topic)
            .map(|t| match t.subscriptions.get(subscription) {
                Some(mailbox) => mailbox.pending.len(),
                None => t.retained.len(),
            })
            .unwrap_or(0) as u64)
    }

    async fn destroy_all(&self, topic: &str) -> Result<()> {
        require_topic_name(topic);
        lock(&self.topics).remove(topic);
        Ok(())
    }
}
