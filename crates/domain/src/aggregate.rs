//! Core aggregate and domain event traits.

use serde::{Serialize, de::DeserializeOwned};

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and should be named in past tense. Implementors are
/// closed enums serialized with `#[serde(tag = "type", content = "data")]`,
/// so the tag is the stored event type and the content is the stored data.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Every serde tag of the enum.
    ///
    /// A stored event whose type is not listed is unknown to this build;
    /// one whose type is listed but whose data does not decode is malformed.
    const EVENT_TYPES: &'static [&'static str];

    /// Returns the event type name.
    ///
    /// Must match the serde tag of the variant.
    fn event_type(&self) -> &'static str;

    /// Returns true if this event marks the aggregate as deleted.
    fn is_deletion(&self) -> bool {
        false
    }
}

/// Trait for aggregates in an event-sourced system.
///
/// An aggregate is a cluster of domain objects that can be treated as a single unit.
/// The aggregate root ensures consistency of changes being made within the aggregate.
///
/// In event sourcing, aggregates:
/// - Are rebuilt by replaying events
/// - Generate events from commands
/// - Apply events to update state (pure, deterministic)
///
/// Identity, version and timestamps are kept by
/// [`EventSourcedRoot`](crate::EventSourcedRoot), which wraps the state.
pub trait Aggregate: Default + Send + Sync + Sized {
    /// The type of events this aggregate produces and consumes.
    type Event: DomainEvent;

    /// The type of errors this aggregate's commands can produce.
    type Error: std::error::Error + Send + Sync;

    /// Returns the aggregate type name.
    ///
    /// Used as the entity name of the aggregate's streams.
    fn aggregate_type() -> &'static str;

    /// Applies an event to the aggregate, updating its state.
    ///
    /// This method must be pure and deterministic:
    /// - Given the same state and event, it must always produce the same new state
    /// - It must not have side effects
    /// - It must not fail (events represent facts that have happened)
    fn apply(&mut self, event: Self::Event);

    /// Applies multiple events in sequence.
    fn apply_events(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        for event in events {
            self.apply(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(tag = "type", content = "data")]
    enum TestEvent {
        TestCreated { name: String },
        TestUpdated { value: i32 },
        TestDeleted {},
    }

    impl DomainEvent for TestEvent {
        const EVENT_TYPES: &'static [&'static str] = &["TestCreated", "TestUpdated", "TestDeleted"];

        fn event_type(&self) -> &'static str {
            match self {
                TestEvent::TestCreated { .. } => "TestCreated",
                TestEvent::TestUpdated { .. } => "TestUpdated",
                TestEvent::TestDeleted {} => "TestDeleted",
            }
        }

        fn is_deletion(&self) -> bool {
            matches!(self, TestEvent::TestDeleted {})
        }
    }

    #[derive(Debug, Default)]
    struct TestAggregate {
        name: String,
        value: i32,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("test error")]
    struct TestError;

    impl Aggregate for TestAggregate {
        type Event = TestEvent;
        type Error = TestError;

        fn aggregate_type() -> &'static str {
            "TestAggregate"
        }

        fn apply(&mut self, event: Self::Event) {
            match event {
                TestEvent::TestCreated { name } => self.name = name,
                TestEvent::TestUpdated { value } => self.value = value,
                TestEvent::TestDeleted {} => {}
            }
        }
    }

    #[test]
    fn test_aggregate_apply_events() {
        let mut aggregate = TestAggregate::default();
        aggregate.apply_events(vec![
            TestEvent::TestCreated {
                name: "test".to_string(),
            },
            TestEvent::TestUpdated { value: 42 },
        ]);

        assert_eq!(aggregate.name, "test");
        assert_eq!(aggregate.value, 42);
    }

    #[test]
    fn test_event_type_matches_serde_tag() {
        let event = TestEvent::TestUpdated { value: 42 };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.event_type());
        assert_eq!(json["data"]["value"], 42);
    }

    #[test]
    fn test_only_deleted_is_deletion() {
        assert!(TestEvent::TestDeleted {}.is_deletion());
        assert!(!TestEvent::TestUpdated { value: 1 }.is_deletion());
    }
}
