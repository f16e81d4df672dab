//! Car read model: one row per live car.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::Identifier;
use domain::{Aggregate, Car, CarEvent, CarStatus, ChangeEventMigrator, Rehydrated};
use event_store::{EventStreamChangeEvent, Version};
use serde::{Deserialize, Serialize};

use crate::{ProjectionError, Result};
use crate::projection::{ReadModelProjection, already_projected};
use crate::query_store::{QueryStore, ReadModel};

/// Denormalized view of a car for listings and lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarReadModel {
    pub id: Identifier,
    pub organization_id: String,
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub owner_id: Option<String>,
    pub managed_by_id: Option<String>,
    pub plate_number: Option<String>,
    pub jurisdiction: Option<String>,
    pub status: CarStatus,
    pub last_version: Version,
    pub created_at_utc: DateTime<Utc>,
    pub last_modified_at_utc: DateTime<Utc>,
}

impl ReadModel for CarReadModel {
    fn id(&self) -> &Identifier {
        &self.id
    }

    fn last_version(&self) -> Version {
        self.last_version
    }

    fn set_last_version(&mut self, version: Version) {
        self.last_version = version;
    }

    fn is_tombstone(&self) -> bool {
        self.status == CarStatus::Deleted
    }
}

/// Projects car events into [`CarReadModel`] rows.
///
/// A deleted car stays behind as a tombstone, hidden from lookups and
/// listings.
pub struct CarProjection<Q> {
    store: Q,
    migrator: Arc<ChangeEventMigrator>,
}

impl<Q: QueryStore<CarReadModel>> CarProjection<Q> {
    pub fn new(store: Q, migrator: Arc<ChangeEventMigrator>) -> Self {
        Self { store, migrator }
    }

    /// The query store backing this view.
    pub fn store(&self) -> &Q {
        &self.store
    }

    /// Applies `change` to an existing row unless it already reflects `event`.
    async fn update_row<F>(&self, event: &EventStreamChangeEvent, change: F) -> Result<bool>
    where
        F: FnOnce(&mut CarReadModel) + Send + 'static,
    {
        let Some(row) = self.store.get_any(&event.root_id).await? else {
            tracing::warn!(
                car_id = %event.root_id,
                version = %event.version,
                "Car row missing for update"
            );
            return Ok(false);
        };
        if already_projected(&row, event.version) {
            return Ok(false);
        }
        if row.is_tombstone() {
            tracing::warn!(
                car_id = %event.root_id,
                version = %event.version,
                "Event after deletion ignored"
            );
            return Ok(false);
        }

        let version = event.version;
        let modified = event.occurred_at_utc;
        self.store
            .update(&event.root_id, move |row| {
                change(row);
                row.set_last_version(version);
                row.last_modified_at_utc = modified;
            })
            .await
    }
}

#[async_trait]
impl<Q: QueryStore<CarReadModel>> ReadModelProjection for CarProjection<Q> {
    fn name(&self) -> &'static str {
        "CarProjection"
    }

    fn root_aggregate_type(&self) -> &'static str {
        Car::aggregate_type()
    }

    async fn project_event(&self, event: &EventStreamChangeEvent) -> Result<bool> {
        let car_event = match self.migrator.rehydrate::<CarEvent>(event) {
            Rehydrated::Known(car_event) => car_event,
            Rehydrated::Unknown { .. } => return Ok(false),
            Rehydrated::Invalid { event_type, reason } => {
                return Err(ProjectionError::MalformedEvent {
                    event_id: event.id,
                    event_type,
                    reason,
                });
            }
        };

        match car_event {
            CarEvent::Created(data) => {
                self.store
                    .create(CarReadModel {
                        id: event.root_id.clone(),
                        organization_id: data.organization_id,
                        make: None,
                        model: None,
                        year: None,
                        owner_id: None,
                        managed_by_id: None,
                        plate_number: None,
                        jurisdiction: None,
                        status: CarStatus::Draft,
                        last_version: event.version,
                        created_at_utc: event.occurred_at_utc,
                        last_modified_at_utc: event.occurred_at_utc,
                    })
                    .await
            }
            CarEvent::ManufacturerChanged(data) => {
                self.update_row(event, move |row| {
                    row.make = Some(data.manufacturer.make);
                    row.model = Some(data.manufacturer.model);
                    row.year = Some(data.manufacturer.year);
                })
                .await
            }
            CarEvent::OwnershipChanged(data) => {
                self.update_row(event, move |row| {
                    row.owner_id = Some(data.owner_id);
                    row.managed_by_id = data.managed_by_id;
                    if row.status == CarStatus::Draft {
                        row.status = CarStatus::Owned;
                    }
                })
                .await
            }
            CarEvent::RegistrationChanged(data) => {
                self.update_row(event, move |row| {
                    row.jurisdiction = Some(data.plate.jurisdiction.to_string());
                    row.plate_number = Some(data.plate.number);
                    row.status = CarStatus::Registered;
                })
                .await
            }
            CarEvent::Deleted(_) => {
                self.update_row(event, |row| row.status = CarStatus::Deleted)
                    .await
            }
        }
    }

    async fn destroy_all(&self) -> Result<()> {
        self.store.destroy_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryQueryStore;
    use domain::{Jurisdiction, LicensePlate, Manufacturer};
    use event_store::NewEvent;

    fn stored(id: &Identifier, version: i64, event: &CarEvent) -> EventStreamChangeEvent {
        let json = serde_json::to_value(event).unwrap();
        let new_event = NewEvent::builder()
            .root_id(id.clone())
            .root_aggregate_type("Car")
            .event_type(json["type"].as_str().unwrap())
            .version(Version::new(version))
            .data_raw(json["data"].clone())
            .build();
        EventStreamChangeEvent::persisted(
            new_event,
            event_store::stream_name("Car", id.as_str()),
            Utc::now(),
        )
    }

    fn projection() -> CarProjection<InMemoryQueryStore<CarReadModel>> {
        CarProjection::new(
            InMemoryQueryStore::new(),
            Arc::new(domain::car_migrator().unwrap()),
        )
    }

    fn plate() -> LicensePlate {
        LicensePlate::new(Jurisdiction::new("NZ", "Auckland").unwrap(), "ABC123").unwrap()
    }

    #[tokio::test]
    async fn builds_row_from_lifecycle() {
        let projection = projection();
        let id = Identifier::with_prefix("car");
        let events = [
            stored(&id, 1, &CarEvent::created("org_1")),
            stored(
                &id,
                2,
                &CarEvent::manufacturer_changed(Manufacturer::new(2024, "Toyota", "Corolla").unwrap()),
            ),
            stored(&id, 3, &CarEvent::ownership_changed("user_1", None)),
            stored(&id, 4, &CarEvent::registration_changed(plate())),
        ];
        for event in &events {
            assert!(projection.project_event(event).await.unwrap());
        }

        let row = projection.store().get(&id).await.unwrap().unwrap();
        assert_eq!(row.organization_id, "org_1");
        assert_eq!(row.make.as_deref(), Some("Toyota"));
        assert_eq!(row.owner_id.as_deref(), Some("user_1"));
        assert_eq!(row.plate_number.as_deref(), Some("ABC123"));
        assert_eq!(row.jurisdiction.as_deref(), Some("NZ-Auckland"));
        assert_eq!(row.status, CarStatus::Registered);
        assert_eq!(row.last_version, Version::new(4));
    }

    #[tokio::test]
    async fn redelivery_is_idempotent() {
        let projection = projection();
        let id = Identifier::with_prefix("car");
        let created = stored(&id, 1, &CarEvent::created("org_1"));
        let owned = stored(&id, 2, &CarEvent::ownership_changed("user_1", None));

        assert!(projection.project_event(&created).await.unwrap());
        assert!(projection.project_event(&owned).await.unwrap());
        assert!(!projection.project_event(&created).await.unwrap());
        assert!(!projection.project_event(&owned).await.unwrap());

        assert_eq!(projection.store().count().await.unwrap(), 1);
        let row = projection.store().get(&id).await.unwrap().unwrap();
        assert_eq!(row.last_version, Version::new(2));
    }

    #[tokio::test]
    async fn deletion_hides_the_row() {
        let projection = projection();
        let id = Identifier::with_prefix("car");
        projection
            .project_event(&stored(&id, 1, &CarEvent::created("org_1")))
            .await
            .unwrap();
        assert!(
            projection
                .project_event(&stored(&id, 2, &CarEvent::deleted("user_1")))
                .await
                .unwrap()
        );

        assert!(projection.store().get(&id).await.unwrap().is_none());
        assert_eq!(projection.store().count().await.unwrap(), 0);
        let tombstone = projection.store().get_any(&id).await.unwrap().unwrap();
        assert_eq!(tombstone.status, CarStatus::Deleted);
        assert_eq!(tombstone.last_version, Version::new(2));
    }

    #[tokio::test]
    async fn redelivery_after_deletion_does_not_resurrect() {
        let projection = projection();
        let id = Identifier::with_prefix("car");
        let created = stored(&id, 1, &CarEvent::created("org_1"));
        let owned = stored(&id, 2, &CarEvent::ownership_changed("user_1", None));
        let deleted = stored(&id, 3, &CarEvent::deleted("user_1"));

        for event in [&created, &owned, &deleted] {
            assert!(projection.project_event(event).await.unwrap());
        }
        for event in [&created, &owned, &deleted] {
            assert!(!projection.project_event(event).await.unwrap());
        }

        assert!(projection.store().get(&id).await.unwrap().is_none());
        assert_eq!(projection.store().list().await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn malformed_known_event_is_an_error() {
        let projection = projection();
        let id = Identifier::with_prefix("car");
        let mut created = stored(&id, 1, &CarEvent::created("org_1"));
        created.data = serde_json::json!({ "organization_id": 7 });

        let err = projection.project_event(&created).await.unwrap_err();
        assert!(matches!(err, ProjectionError::MalformedEvent { .. }));
        assert_eq!(projection.store().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_and_legacy_events() {
        let projection = projection();
        let id = Identifier::with_prefix("car");
        projection
            .project_event(&stored(&id, 1, &CarEvent::created("org_1")))
            .await
            .unwrap();

        let mut unknown = stored(&id, 2, &CarEvent::deleted("user_1"));
        unknown.event_type = "Repainted".to_string();
        assert!(!projection.project_event(&unknown).await.unwrap());

        let mut legacy = stored(&id, 2, &CarEvent::deleted("user_1"));
        legacy.event_type = domain::car::LEGACY_NUMBER_PLATE_ASSIGNED.to_string();
        legacy.data = serde_json::json!({
            "number_plate": "XYZ789",
            "country": "NZ",
            "region": "Wellington"
        });
        assert!(projection.project_event(&legacy).await.unwrap());

        let row = projection.store().get(&id).await.unwrap().unwrap();
        assert_eq!(row.plate_number.as_deref(), Some("XYZ789"));
    }

    #[tokio::test]
    async fn update_without_row_is_skipped() {
        let projection = projection();
        let id = Identifier::with_prefix("car");
        let owned = stored(&id, 2, &CarEvent::ownership_changed("user_1", None));
        assert!(!projection.project_event(&owned).await.unwrap());
    }
}
