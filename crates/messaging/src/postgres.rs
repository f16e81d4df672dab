use std::marker::PhantomData;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgConnection, PgPool, Row};

use crate::{
    CallContext, MessageBusTopicStore, MessageHandler, MessagePayload, MessageQueueStore,
    MessagingError, QueuedMessage, Result,
    bus::DEFAULT_RETENTION,
    delivery::handler_failed,
    names::{require_subscription_name, require_topic_name},
    queue::DEFAULT_MAX_DELIVERIES,
};

/// PostgreSQL-backed queue for competing consumers.
///
/// `pop_single` claims the head row with `FOR UPDATE SKIP LOCKED` and keeps
/// the transaction open while the handler runs, so concurrent consumers never
/// see the same message. A failed message keeps its position. A cancelled
/// handler rolls the transaction back and leaves the row untouched.
pub struct PostgresQueueStore<M> {
    pool: PgPool,
    queue_name: String,
    max_deliveries: u32,
    _message: PhantomData<fn() -> M>,
}

impl<M> Clone for PostgresQueueStore<M> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            queue_name: self.queue_name.clone(),
            max_deliveries: self.max_deliveries,
            _message: PhantomData,
        }
    }
}

impl<M: MessagePayload> PostgresQueueStore<M> {
    pub fn new(pool: PgPool, queue_name: impl Into<String>) -> Self {
        Self {
            pool,
            queue_name: queue_name.into(),
            max_deliveries: DEFAULT_MAX_DELIVERIES,
            _message: PhantomData,
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

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl<M: MessagePayload> MessageQueueStore<M> for PostgresQueueStore<M> {
    #[tracing::instrument(skip(self, call, message), fields(queue = %self.queue_name))]
    async fn push(&self, call: &CallContext, message: M) -> Result<QueuedMessage<M>> {
        let queued = QueuedMessage::new(call, message);
        let body = serde_json::to_value(&queued)?;

        sqlx::query(
            r#"
            INSERT INTO message_queues (queue_name, message_id, body, delivery_count, enqueued_at_utc)
            VALUES ($1, $2, $3, 0, $4)
            "#,
        )
        .bind(&self.queue_name)
        .bind(&queued.message_id)
        .bind(body)
        .bind(queued.enqueued_at_utc)
        .execute(&self.pool)
        .await?;

        metrics::counter!("queue_messages_pushed_total", "queue" => self.queue_name.clone())
            .increment(1);
        Ok(queued)
    }

    async fn pop_single(&self, handler: &dyn MessageHandler<M>) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            SELECT sequence, body, delivery_count
            FROM message_queues
            WHERE queue_name = $1 AND dead_lettered_at_utc IS NULL
            ORDER BY sequence ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(&self.queue_name)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(false);
        };

        let sequence: i64 = row.try_get("sequence")?;
        let delivery_count = row.try_get::<i32, _>("delivery_count")? as u32 + 1;
        let body: serde_json::Value = row.try_get("body")?;

        let mut message: QueuedMessage<M> = match serde_json::from_value(body) {
            Ok(message) => message,
            Err(e) => {
                // An undecodable body can never succeed.
                sqlx::query(
                    "UPDATE message_queues SET delivery_count = $2, dead_lettered_at_utc = $3 WHERE sequence = $1",
                )
                .bind(sequence)
                .bind(delivery_count as i32)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await?;
                tx.commit().await?;
                metrics::counter!("queue_messages_dead_lettered_total", "queue" => self.queue_name.clone())
                    .increment(1);
                return Err(MessagingError::Serialization(e));
            }
        };
        message.delivery_count = delivery_count;

        match handler.handle(message.clone()).await {
            Ok(()) => {
                sqlx::query("DELETE FROM message_queues WHERE sequence = $1")
                    .bind(sequence)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;
                Ok(true)
            }
            Err(source) => {
                let dead_lettered = delivery_count >= self.max_deliveries;
                sqlx::query(
                    r#"
                    UPDATE message_queues
                    SET delivery_count = $2,
                        dead_lettered_at_utc = CASE WHEN $3 THEN $4 ELSE NULL END
                    WHERE sequence = $1
                    "#,
                )
                .bind(sequence)
                .bind(delivery_count as i32)
                .bind(dead_lettered)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await?;
                tx.commit().await?;

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
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM message_queues WHERE queue_name = $1 AND dead_lettered_at_utc IS NULL",
        )
        .bind(&self.queue_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }

    async fn dead_letter_count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM message_queues WHERE queue_name = $1 AND dead_lettered_at_utc IS NOT NULL",
        )
        .bind(&self.queue_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }

    async fn destroy_all(&self) -> Result<()> {
        sqlx::query("DELETE FROM message_queues WHERE queue_name = $1")
            .bind(&self.queue_name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// PostgreSQL-backed topics shared between processes.
///
/// A sent message is stored once and gets a delivery row for every
/// subscription of its topic. A subscription is registered on first use and
/// backfilled with the messages the topic still retains. `receive_single`
/// claims the oldest delivery of a subscription with `FOR UPDATE SKIP LOCKED`,
/// like [`PostgresQueueStore::pop_single`].
pub struct PostgresMessageBusStore<M> {
    pool: PgPool,
    max_deliveries: u32,
    retention: usize,
    _message: PhantomData<fn() -> M>,
}

impl<M> Clone for PostgresMessageBusStore<M> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            max_deliveries: self.max_deliveries,
            retention: self.retention,
            _message: PhantomData,
        }
    }
}

/// Serializes sends and subscription backfills of one topic.
async fn lock_topic(conn: &mut PgConnection, topic: &str) -> Result<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(format!("topic:{topic}"))
        .execute(conn)
        .await?;
    Ok(())
}

impl<M: MessagePayload> PostgresMessageBusStore<M> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            max_deliveries: DEFAULT_MAX_DELIVERIES,
            retention: DEFAULT_RETENTION,
            _message: PhantomData,
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

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Creates a subscription ahead of its first receive.
    ///
    /// # Panics
    ///
    /// Panics if the topic or subscription name is invalid.
    pub async fn subscribe(&self, topic: &str, subscription: &str) -> Result<()> {
        require_topic_name(topic);
        require_subscription_name(subscription);

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM message_bus_subscriptions WHERE topic = $1 AND subscription = $2)",
        )
        .bind(topic)
        .bind(subscription)
        .fetch_one(&self.pool)
        .await?;
        if exists {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        lock_topic(&mut tx, topic).await?;

        let created = sqlx::query(
            r#"
            INSERT INTO message_bus_subscriptions (topic, subscription, created_at_utc)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(topic)
        .bind(subscription)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        if created {
            sqlx::query(
                r#"
                INSERT INTO message_bus_deliveries (topic, subscription, sequence)
                SELECT topic, $2, sequence FROM message_bus_messages WHERE topic = $1
                "#,
            )
            .bind(topic)
            .bind(subscription)
            .execute(&mut *tx)
            .await?;
            tracing::debug!(topic, subscription, "Subscription created");
        }

        tx.commit().await?;
        Ok(())
    }

    /// Number of dead-lettered messages of a subscription.
    pub async fn dead_letter_count(&self, topic: &str, subscription: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM message_bus_deliveries
            WHERE topic = $1 AND subscription = $2 AND dead_lettered_at_utc IS NOT NULL
            "#,
        )
        .bind(topic)
        .bind(subscription)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }
}

#[async_trait]
impl<M: MessagePayload> MessageBusTopicStore<M> for PostgresMessageBusStore<M> {
    #[tracing::instrument(skip(self, call, message))]
    async fn send(&self, topic: &str, call: &CallContext, message: M) -> Result<QueuedMessage<M>> {
        require_topic_name(topic);

        let queued = QueuedMessage::new(call, message);
        let body = serde_json::to_value(&queued)?;

        let mut tx = self.pool.begin().await?;
        lock_topic(&mut tx, topic).await?;

        let sequence: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO message_bus_messages (topic, message_id, body, sent_at_utc)
            VALUES ($1, $2, $3, $4)
            RETURNING sequence
            "#,
        )
        .bind(topic)
        .bind(&queued.message_id)
        .bind(body)
        .bind(queued.enqueued_at_utc)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO message_bus_deliveries (topic, subscription, sequence)
            SELECT topic, subscription, $2 FROM message_bus_subscriptions WHERE topic = $1
            "#,
        )
        .bind(topic)
        .bind(sequence)
        .execute(&mut *tx)
        .await?;

        // Beyond the retention window, keep only messages still owed to a subscription.
        sqlx::query(
            r#"
            DELETE FROM message_bus_messages m
            WHERE m.topic = $1
              AND m.sequence <= (
                  SELECT sequence FROM message_bus_messages
                  WHERE topic = $1
                  ORDER BY sequence DESC
                  OFFSET $2 LIMIT 1
              )
              AND NOT EXISTS (
                  SELECT 1 FROM message_bus_deliveries d WHERE d.sequence = m.sequence
              )
            "#,
        )
        .bind(topic)
        .bind(self.retention as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
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
        self.subscribe(topic, subscription).await?;

        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            r#"
            SELECT d.sequence, d.delivery_count, m.body
            FROM message_bus_deliveries d
            JOIN message_bus_messages m ON m.sequence = d.sequence
            WHERE d.topic = $1 AND d.subscription = $2 AND d.dead_lettered_at_utc IS NULL
            ORDER BY d.sequence ASC
            LIMIT 1
            FOR UPDATE OF d SKIP LOCKED
            "#,
        )
        .bind(topic)
        .bind(subscription)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(false);
        };

        let sequence: i64 = row.try_get("sequence")?;
        let delivery_count = row.try_get::<i32, _>("delivery_count")? as u32 + 1;
        let body: serde_json::Value = row.try_get("body")?;
        let source_name = format!("{topic}/{subscription}");

        let mut message: QueuedMessage<M> = match serde_json::from_value(body) {
            Ok(message) => message,
            Err(e) => {
                sqlx::query(
                    r#"
                    UPDATE message_bus_deliveries
                    SET delivery_count = $4, dead_lettered_at_utc = $5
                    WHERE topic = $1 AND subscription = $2 AND sequence = $3
                    "#,
                )
                .bind(topic)
                .bind(subscription)
                .bind(sequence)
                .bind(delivery_count as i32)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await?;
                tx.commit().await?;
                metrics::counter!("queue_messages_dead_lettered_total", "queue" => source_name)
                    .increment(1);
                return Err(MessagingError::Serialization(e));
            }
        };
        message.delivery_count = delivery_count;

        match handler.handle(message.clone()).await {
            Ok(()) => {
                sqlx::query(
                    "DELETE FROM message_bus_deliveries WHERE topic = $1 AND subscription = $2 AND sequence = $3",
                )
                .bind(topic)
                .bind(subscription)
                .bind(sequence)
                .execute(&mut *tx)
                .await?;
                tx.commit().await?;
                Ok(true)
            }
            Err(source) => {
                let dead_lettered = delivery_count >= self.max_deliveries;
                sqlx::query(
                    r#"
                    UPDATE message_bus_deliveries
                    SET delivery_count = $4,
                        dead_lettered_at_utc = CASE WHEN $5 THEN $6 ELSE NULL END
                    WHERE topic = $1 AND subscription = $2 AND sequence = $3
                    "#,
                )
                .bind(topic)
                .bind(subscription)
                .bind(sequence)
                .bind(delivery_count as i32)
                .bind(dead_lettered)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await?;
                tx.commit().await?;

                Err(handler_failed(&source_name, &message, dead_lettered, source))
            }
        }
    }

    async fn count(&self, topic: &str, subscription: &str) -> Result<u64> {
        require_topic_name(topic);
        require_subscription_name(subscription);

        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT CASE
                WHEN EXISTS (
                    SELECT 1 FROM message_bus_subscriptions WHERE topic = $1 AND subscription = $2
                )
                THEN (
                    SELECT COUNT(*) FROM message_bus_deliveries
                    WHERE topic = $1 AND subscription = $2 AND dead_lettered_at_utc IS NULL
                )
                ELSE (SELECT COUNT(*) FROM message_bus_messages WHERE topic = $1)
            END
            "#,
        )
        .bind(topic)
        .bind(subscription)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }

    async fn destroy_all(&self, topic: &str) -> Result<()> {
        require_topic_name(topic);

        let mut tx = self.pool.begin().await?;
        lock_topic(&mut tx, topic).await?;
        sqlx::query("DELETE FROM message_bus_subscriptions WHERE topic = $1")
            .bind(topic)
            .execute(&mut *tx)
            .await?;
        // Deliveries go with their messages.
        sqlx::query("DELETE FROM message_bus_messages WHERE topic = $1")
            .bind(topic)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}
