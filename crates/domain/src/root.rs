//! Event-sourced aggregate root.

use chrono::{DateTime, Utc};
use common::Identifier;
use event_store::{EventStreamChangeEvent, NewEvent, Version};
use serde_json::Value;

use crate::aggregate::{Aggregate, DomainEvent};
use crate::error::DomainError;
use crate::migrator::{ChangeEventMigrator, Rehydrated};

/// An aggregate together with its identity, version and pending changes.
///
/// Commands run against the wrapped state and their events are raised here:
/// each raised event is applied to the state immediately and queued as a
/// [`NewEvent`] until the repository persists it.
#[derive(Debug)]
pub struct EventSourcedRoot<A: Aggregate> {
    id: Identifier,
    state: A,
    version: Version,
    created_at_utc: Option<DateTime<Utc>>,
    last_modified_at_utc: Option<DateTime<Utc>>,
    is_deleted: Option<bool>,
    last_persisted_at_utc: Option<DateTime<Utc>>,
    changes: Vec<NewEvent>,
}

impl<A: Aggregate> EventSourcedRoot<A> {
    /// Creates an empty shell with no events, ready for `load_changes`.
    pub fn new(id: Identifier) -> Self {
        Self {
            id,
            state: A::default(),
            version: Version::initial(),
            created_at_utc: None,
            last_modified_at_utc: None,
            is_deleted: None,
            last_persisted_at_utc: None,
            changes: Vec::new(),
        }
    }

    /// Creates a new aggregate by running a creation command on an empty shell.
    pub fn create<F>(id: Identifier, command: F) -> Result<Self, DomainError>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let mut root = Self::new(id);
        root.execute(command)?;
        Ok(root)
    }

    pub fn id(&self) -> &Identifier {
        &self.id
    }

    pub fn state(&self) -> &A {
        &self.state
    }

    /// Version of the latest event, persisted or pending.
    pub fn version(&self) -> Version {
        self.version
    }

    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        self.created_at_utc
    }

    pub fn last_modified_at_utc(&self) -> Option<DateTime<Utc>> {
        self.last_modified_at_utc
    }

    /// None until the first event; then whether a deletion event was raised.
    pub fn is_deleted(&self) -> Option<bool> {
        self.is_deleted
    }

    pub fn last_persisted_at_utc(&self) -> Option<DateTime<Utc>> {
        self.last_persisted_at_utc
    }

    /// Runs a command against the current state and raises the events it returns.
    ///
    /// Nothing is raised when the command fails.
    pub fn execute<F>(&mut self, command: F) -> Result<(), DomainError>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let events = command(&self.state)?;
        for event in events {
            self.raise(event)?;
        }
        Ok(())
    }

    /// Applies an event to the state and queues it for persistence.
    pub fn raise(&mut self, event: A::Event) -> Result<(), DomainError> {
        let version = self.version.next();
        let occurred_at = Utc::now();

        let change = NewEvent::builder()
            .root_id(self.id.clone())
            .root_aggregate_type(A::aggregate_type())
            .event_type(event.event_type())
            .version(version)
            .occurred_at_utc(occurred_at)
            .data_raw(event_data(&event)?)
            .build();

        self.fold(event, version, occurred_at);
        self.changes.push(change);
        Ok(())
    }

    /// Replays persisted events onto the state.
    ///
    /// Events must continue the current version without gaps. Each event is
    /// upcast through the migrator first; an event that still does not
    /// decode is an error.
    pub fn load_changes(
        &mut self,
        events: &[EventStreamChangeEvent],
        migrator: &ChangeEventMigrator,
    ) -> Result<(), DomainError> {
        for stored in events {
            let expected = self.version.next();
            if stored.version != expected {
                return Err(DomainError::CorruptStream {
                    stream_name: stored.stream_name.clone(),
                    expected,
                    actual: stored.version,
                });
            }

            match migrator.rehydrate::<A::Event>(stored) {
                Rehydrated::Known(event) => {
                    self.fold(event, stored.version, stored.occurred_at_utc)
                }
                Rehydrated::Unknown { event_type, .. } => {
                    return Err(DomainError::UnknownEvent {
                        aggregate_type: A::aggregate_type(),
                        event_type,
                    });
                }
                Rehydrated::Invalid { event_type, reason } => {
                    return Err(DomainError::MalformedEvent {
                        stream_name: stored.stream_name.clone(),
                        event_type,
                        version: stored.version,
                        reason,
                    });
                }
            }
            self.last_persisted_at_utc = Some(stored.last_persisted_at_utc);
        }
        Ok(())
    }

    /// Events raised since the last save.
    pub fn get_changes(&self) -> &[NewEvent] {
        &self.changes
    }

    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn clear_changes(&mut self) {
        self.changes.clear();
    }

    pub(crate) fn mark_persisted(&mut self, at: DateTime<Utc>) {
        self.last_persisted_at_utc = Some(at);
    }

    fn fold(&mut self, event: A::Event, version: Version, at: DateTime<Utc>) {
        if event.is_deletion() {
            self.is_deleted = Some(true);
        } else if self.is_deleted.is_none() {
            self.is_deleted = Some(false);
        }
        self.state.apply(event);
        self.version = version;
        self.created_at_utc.get_or_insert(at);
        self.last_modified_at_utc = Some(at);
    }
}

/// Extracts the adjacently tagged content of an event.
fn event_data<E: DomainEvent>(event: &E) -> Result<Value, DomainError> {
    let mut value = serde_json::to_value(event)?;
    Ok(value
        .as_object_mut()
        .and_then(|object| object.remove("data"))
        .unwrap_or(Value::Null))
}
