use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Identifier;

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an event ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Version number of an event within its stream.
///
/// Versions start at 1 for the first event of a stream and increment by 1
/// for each subsequent event. Version 0 means "no events yet".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the initial version (0) of an empty stream.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the first version (1) for the first event.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Metadata stored alongside every event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EventMetadata {
    /// Fully qualified name of the event, `{RootAggregateType}.{EventType}`.
    pub fqn: String,
}

impl EventMetadata {
    pub fn new(fqn: impl Into<String>) -> Self {
        Self { fqn: fqn.into() }
    }
}

/// Builds the name of the stream holding the events of one aggregate.
pub fn stream_name(entity_name: &str, entity_id: &str) -> String {
    format!("{entity_name}_{entity_id}")
}

/// An event raised by an aggregate that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NewEvent {
    /// Unique identifier for this event.
    pub id: EventId,

    /// The aggregate instance that raised the event.
    pub root_id: Identifier,

    /// The type of the aggregate (e.g. "Car").
    pub root_aggregate_type: String,

    /// The event type tag (e.g. "RegistrationChanged").
    pub event_type: String,

    /// The event payload.
    pub data: serde_json::Value,

    /// Position of this event in its stream.
    pub version: Version,

    /// When the event was raised.
    pub occurred_at_utc: DateTime<Utc>,

    pub metadata: EventMetadata,
}

impl NewEvent {
    /// Creates a new event builder.
    pub fn builder() -> NewEventBuilder {
        NewEventBuilder::default()
    }
}

/// Builder for constructing new events.
#[derive(Debug, Default)]
pub struct NewEventBuilder {
    id: Option<EventId>,
    root_id: Option<Identifier>,
    root_aggregate_type: Option<String>,
    event_type: Option<String>,
    data: Option<serde_json::Value>,
    version: Option<Version>,
    occurred_at_utc: Option<DateTime<Utc>>,
    fqn: Option<String>,
}

impl NewEventBuilder {
    /// Sets the event ID. If not set, a new ID will be generated.
    pub fn id(mut self, id: EventId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn root_id(mut self, id: Identifier) -> Self {
        self.root_id = Some(id);
        self
    }

    pub fn root_aggregate_type(mut self, root_aggregate_type: impl Into<String>) -> Self {
        self.root_aggregate_type = Some(root_aggregate_type.into());
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Sets the payload from a serializable value.
    pub fn data<T: Serialize>(mut self, data: &T) -> Result<Self, serde_json::Error> {
        self.data = Some(serde_json::to_value(data)?);
        Ok(self)
    }

    /// Sets the payload from a raw JSON value.
    pub fn data_raw(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    /// Sets the timestamp. If not set, the current time will be used.
    pub fn occurred_at_utc(mut self, timestamp: DateTime<Utc>) -> Self {
        self.occurred_at_utc = Some(timestamp);
        self
    }

    /// Overrides the fully qualified name. Defaults to `{root type}.{event type}`.
    pub fn fqn(mut self, fqn: impl Into<String>) -> Self {
        self.fqn = Some(fqn.into());
        self
    }

    /// Builds the event, returning None if required fields are missing.
    pub fn try_build(self) -> Option<NewEvent> {
        let root_aggregate_type = self.root_aggregate_type?;
        let event_type = self.event_type?;
        let fqn = self
            .fqn
            .unwrap_or_else(|| format!("{root_aggregate_type}.{event_type}"));

        Some(NewEvent {
            id: self.id.unwrap_or_default(),
            root_id: self.root_id?,
            root_aggregate_type,
            event_type,
            data: self.data?,
            version: self.version?,
            occurred_at_utc: self.occurred_at_utc.unwrap_or_else(Utc::now),
            metadata: EventMetadata::new(fqn),
        })
    }

    /// Builds the event.
    ///
    /// # Panics
    ///
    /// Panics if root_id, root_aggregate_type, event_type, data or version
    /// are not set.
    pub fn build(self) -> NewEvent {
        self.try_build()
            .expect("root_id, root_aggregate_type, event_type, data and version are required")
    }
}

/// A persisted event, addressed by the stream it belongs to.
///
/// Only the event store creates these; they are never modified after append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EventStreamChangeEvent {
    pub id: EventId,
    pub root_id: Identifier,
    pub root_aggregate_type: String,
    pub event_type: String,
    pub data: serde_json::Value,
    pub version: Version,
    pub occurred_at_utc: DateTime<Utc>,
    pub metadata: EventMetadata,
    /// When the store accepted the event.
    pub last_persisted_at_utc: DateTime<Utc>,
    /// `{entityName}_{entityId}`.
    pub stream_name: String,
}

impl EventStreamChangeEvent {
    /// Wraps a new event with the addressing information assigned on append.
    pub fn persisted(
        event: NewEvent,
        stream_name: impl Into<String>,
        persisted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: event.id,
            root_id: event.root_id,
            root_aggregate_type: event.root_aggregate_type,
            event_type: event.event_type,
            data: event.data,
            version: event.version,
            occurred_at_utc: event.occurred_at_utc,
            metadata: event.metadata,
            last_persisted_at_utc: persisted_at,
            stream_name: stream_name.into(),
        }
    }
}
