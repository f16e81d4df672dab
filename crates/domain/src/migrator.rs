//! Upcasting of stored events to the current event schemas.

use std::collections::HashMap;

use event_store::EventStreamChangeEvent;
use serde_json::{Value, json};

use crate::aggregate::DomainEvent;
use crate::error::DomainError;

type UpcastFn = Box<dyn Fn(Value) -> Value + Send + Sync>;

struct Upcaster {
    to_type: String,
    transform: UpcastFn,
}

/// A stored event decoded against a closed event enum.
#[derive(Debug, Clone, PartialEq)]
pub enum Rehydrated<E> {
    /// The event decoded into a known variant.
    Known(E),
    /// The event type (after upcasting) is not one this build knows.
    Unknown { event_type: String, data: Value },
    /// The event type is known but its data does not decode.
    Invalid { event_type: String, reason: String },
}

impl<E> Rehydrated<E> {
    pub fn known(self) -> Option<E> {
        match self {
            Rehydrated::Known(event) => Some(event),
            Rehydrated::Unknown { .. } | Rehydrated::Invalid { .. } => None,
        }
    }
}

/// Chain of upcasters keyed by the event type they read.
///
/// Each upcaster maps `(type, data)` of one schema to the next one; `upcast`
/// follows the chain until no upcaster is registered for the current type.
#[derive(Default)]
pub struct ChangeEventMigrator {
    upcasters: HashMap<String, Upcaster>,
}

impl ChangeEventMigrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an upcaster from `from_type` to `to_type`.
    ///
    /// Fails if `from_type` already has an upcaster or if the new link closes
    /// a cycle.
    pub fn register<F>(
        &mut self,
        from_type: impl Into<String>,
        to_type: impl Into<String>,
        transform: F,
    ) -> Result<(), DomainError>
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        let from_type = from_type.into();
        let to_type = to_type.into();

        if self.upcasters.contains_key(&from_type) {
            return Err(DomainError::InvalidUpcaster {
                event_type: from_type,
                reason: "already registered",
            });
        }

        let mut current = to_type.as_str();
        loop {
            if current == from_type {
                return Err(DomainError::InvalidUpcaster {
                    event_type: from_type,
                    reason: "chain is cyclic",
                });
            }
            match self.upcasters.get(current) {
                Some(next) => current = next.to_type.as_str(),
                None => break,
            }
        }

        self.upcasters.insert(
            from_type,
            Upcaster {
                to_type,
                transform: Box::new(transform),
            },
        );
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_upcaster<F>(
        mut self,
        from_type: impl Into<String>,
        to_type: impl Into<String>,
        transform: F,
    ) -> Result<Self, DomainError>
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.register(from_type, to_type, transform)?;
        Ok(self)
    }

    /// Runs `(event_type, data)` through the chain and returns the latest schema.
    pub fn upcast(&self, event_type: &str, data: Value) -> (String, Value) {
        let mut event_type = event_type.to_string();
        let mut data = data;
        while let Some(upcaster) = self.upcasters.get(&event_type) {
            data = (upcaster.transform)(data);
            event_type = upcaster.to_type.clone();
        }
        (event_type, data)
    }

    /// Upcasts a stored event and decodes it into `E`.
    ///
    /// Types missing from [`DomainEvent::EVENT_TYPES`] come back as
    /// `Unknown`; a listed type that fails to decode comes back as `Invalid`.
    pub fn rehydrate<E: DomainEvent>(&self, stored: &EventStreamChangeEvent) -> Rehydrated<E> {
        let (event_type, data) = self.upcast(&stored.event_type, stored.data.clone());

        if !E::EVENT_TYPES.contains(&event_type.as_str()) {
            tracing::debug!(%event_type, "Event type is not known to this build");
            return Rehydrated::Unknown { event_type, data };
        }

        match serde_json::from_value::<E>(json!({ "type": event_type, "data": data })) {
            Ok(event) => Rehydrated::Known(event),
            Err(e) => {
                tracing::warn!(
                    %event_type,
                    stream_name = %stored.stream_name,
                    version = %stored.version,
                    error = %e,
                    "Stored event data does not decode"
                );
                Rehydrated::Invalid {
                    event_type,
                    reason: e.to_string(),
                }
            }
        }
    }
}

impl std::fmt::Debug for ChangeEventMigrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let chain: HashMap<&str, &str> = self
            .upcasters
            .iter()
            .map(|(from, u)| (from.as_str(), u.to_type.as_str()))
            .collect();
        f.debug_struct("ChangeEventMigrator")
            .field("upcasters", &chain)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use event_store::{Identifier, NewEvent, Version};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type", content = "data")]
    enum PlateEvent {
        PlateChanged { number: String, country: String },
    }

    impl DomainEvent for PlateEvent {
        const EVENT_TYPES: &'static [&'static str] = &["PlateChanged"];

        fn event_type(&self) -> &'static str {
            "PlateChanged"
        }
    }

    fn stored(event_type: &str, data: Value) -> EventStreamChangeEvent {
        let event = NewEvent::builder()
            .root_id(Identifier::parse("car_1").unwrap())
            .root_aggregate_type("Car")
            .event_type(event_type)
            .version(Version::first())
            .data_raw(data)
            .build();
        EventStreamChangeEvent::persisted(event, "Car_car_1".to_string(), Utc::now())
    }

    #[test]
    fn current_schema_decodes_without_upcasting() {
        let migrator = ChangeEventMigrator::new();
        let event = stored(
            "PlateChanged",
            json!({"number": "ABC123", "country": "NZ"}),
        );

        let rehydrated: Rehydrated<PlateEvent> = migrator.rehydrate(&event);
        assert_eq!(
            rehydrated,
            Rehydrated::Known(PlateEvent::PlateChanged {
                number: "ABC123".to_string(),
                country: "NZ".to_string(),
            })
        );
    }

    #[test]
    fn chain_upcasts_through_every_step() {
        let migrator = ChangeEventMigrator::new()
            .with_upcaster("PlateV1", "PlateV2", |data| {
                json!({ "plate": data["plate"], "country": "NZ" })
            })
            .unwrap()
            .with_upcaster("PlateV2", "PlateChanged", |data| {
                json!({ "number": data["plate"], "country": data["country"] })
            })
            .unwrap();

        let event = stored("PlateV1", json!({"plate": "OLD1"}));
        let rehydrated: Rehydrated<PlateEvent> = migrator.rehydrate(&event);

        assert_eq!(
            rehydrated.known(),
            Some(PlateEvent::PlateChanged {
                number: "OLD1".to_string(),
                country: "NZ".to_string(),
            })
        );
    }

    #[test]
    fn unknown_type_is_not_an_error() {
        let migrator = ChangeEventMigrator::new();
        let event = stored("SomethingNew", json!({"x": 1}));

        let rehydrated: Rehydrated<PlateEvent> = migrator.rehydrate(&event);
        assert!(matches!(
            rehydrated,
            Rehydrated::Unknown { ref event_type, .. } if event_type == "SomethingNew"
        ));
    }

    #[test]
    fn malformed_data_of_a_known_type_is_invalid() {
        let migrator = ChangeEventMigrator::new();
        let event = stored("PlateChanged", json!({"number": 42}));

        let rehydrated: Rehydrated<PlateEvent> = migrator.rehydrate(&event);
        assert!(matches!(
            rehydrated,
            Rehydrated::Invalid { ref event_type, .. } if event_type == "PlateChanged"
        ));
    }

    #[test]
    fn cycles_are_rejected() {
        let mut migrator = ChangeEventMigrator::new();
        migrator.register("A", "B", |d| d).unwrap();
        migrator.register("B", "C", |d| d).unwrap();

        let err = migrator.register("C", "A", |d| d).unwrap_err();
        assert!(matches!(err, DomainError::InvalidUpcaster { .. }));

        let err = migrator.register("D", "D", |d| d).unwrap_err();
        assert!(matches!(err, DomainError::InvalidUpcaster { .. }));
    }

    #[test]
    fn duplicate_source_is_rejected() {
        let mut migrator = ChangeEventMigrator::new();
        migrator.register("A", "B", |d| d).unwrap();
        assert!(migrator.register("A", "C", |d| d).is_err());
    }
}
