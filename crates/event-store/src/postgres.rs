use async_trait::async_trait;
use chrono::{SubsecRound, Utc};
use common::Identifier;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    EventId, EventMetadata, EventStoreError, EventStreamChangeEvent, NewEvent, Result, Version,
    event::stream_name,
    store::{Appended, EventStore, EventStream, require_parameter, validate_batch},
};

const SELECT_COLUMNS: &str = "id, stream_name, root_id, root_aggregate_type, event_type, data, \
     version, occurred_at_utc, metadata, last_persisted_at_utc";

/// PostgreSQL-backed event store implementation.
///
/// Appends take a transaction-scoped advisory lock on the stream name, read
/// the stream head and insert the batch. The `unique_stream_version`
/// constraint backs the check up for writers that bypass the lock.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Creates a new PostgreSQL event store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_event(row: PgRow) -> Result<EventStreamChangeEvent> {
        let metadata: serde_json::Value = row.try_get("metadata")?;
        let metadata: EventMetadata = serde_json::from_value(metadata)?;
        let root_id: String = row.try_get("root_id")?;

        Ok(EventStreamChangeEvent {
            id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            root_id: Identifier::parse(root_id)?,
            root_aggregate_type: row.try_get("root_aggregate_type")?,
            event_type: row.try_get("event_type")?,
            data: row.try_get("data")?,
            version: Version::new(row.try_get("version")?),
            occurred_at_utc: row.try_get("occurred_at_utc")?,
            metadata,
            last_persisted_at_utc: row.try_get("last_persisted_at_utc")?,
            stream_name: row.try_get("stream_name")?,
        })
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    #[tracing::instrument(skip(self, events), fields(count = events.len()))]
    async fn add_events(
        &self,
        entity_name: &str,
        entity_id: &str,
        events: Vec<NewEvent>,
    ) -> Result<Appended> {
        require_parameter("entity_name", entity_name);
        require_parameter("entity_id", entity_id);
        let expected = validate_batch(entity_id, &events)?;
        let name = stream_name(entity_name, entity_id);

        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&name)
            .execute(&mut *tx)
            .await?;

        let current: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM event_streams WHERE stream_name = $1")
                .bind(&name)
                .fetch_one(&mut *tx)
                .await?;
        let actual = Version::new(current.unwrap_or(0));

        if actual != expected {
            metrics::counter!("event_store_concurrency_conflicts_total").increment(1);
            return Err(EventStoreError::ConcurrencyConflict {
                stream_name: name,
                expected,
                actual,
            });
        }

        // Matches the microsecond precision of TIMESTAMPTZ.
        let persisted_at = Utc::now().trunc_subsecs(6);
        let count = events.len() as u64;
        for event in &events {
            let metadata = serde_json::to_value(&event.metadata)?;

            sqlx::query(
                r#"
                INSERT INTO event_streams (id, entity_name, stream_name, root_id, root_aggregate_type,
                    event_type, data, version, occurred_at_utc, metadata, last_persisted_at_utc)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(event.id.as_uuid())
            .bind(entity_name)
            .bind(&name)
            .bind(event.root_id.as_str())
            .bind(&event.root_aggregate_type)
            .bind(&event.event_type)
            .bind(&event.data)
            .bind(event.version.as_i64())
            .bind(event.occurred_at_utc)
            .bind(metadata)
            .bind(persisted_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("unique_stream_version")
                {
                    return EventStoreError::ConcurrencyConflict {
                        stream_name: name.clone(),
                        expected,
                        actual: event.version,
                    };
                }
                EventStoreError::Database(e)
            })?;
        }

        tx.commit().await?;
        metrics::counter!("event_store_events_appended_total").increment(count);

        let events = events
            .into_iter()
            .map(|event| EventStreamChangeEvent::persisted(event, name.clone(), persisted_at))
            .collect();
        Ok(Appended {
            stream_name: name,
            events,
        })
    }

    async fn get_event_stream(
        &self,
        entity_name: &str,
        entity_id: &str,
    ) -> Result<Vec<EventStreamChangeEvent>> {
        require_parameter("entity_name", entity_name);
        require_parameter("entity_id", entity_id);

        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM event_streams WHERE stream_name = $1 ORDER BY version ASC"
        ))
        .bind(stream_name(entity_name, entity_id))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn get_stream_version(
        &self,
        entity_name: &str,
        entity_id: &str,
    ) -> Result<Option<Version>> {
        require_parameter("entity_name", entity_name);
        require_parameter("entity_id", entity_id);

        let version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM event_streams WHERE stream_name = $1")
                .bind(stream_name(entity_name, entity_id))
                .fetch_one(&self.pool)
                .await?;

        Ok(version.map(Version::new))
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        use futures_util::stream;

        // TODO: page through the log with a keyset cursor once rebuilds
        // outgrow a single fetch.
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM event_streams ORDER BY sequence ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        let events: Vec<Result<EventStreamChangeEvent>> =
            rows.into_iter().map(Self::row_to_event).collect();
        Ok(Box::pin(stream::iter(events)))
    }

    async fn destroy_all(&self, entity_name: &str) -> Result<()> {
        require_parameter("entity_name", entity_name);

        sqlx::query("DELETE FROM event_streams WHERE entity_name = $1")
            .bind(entity_name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
