//! Car aggregate implementation.

use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;

use super::{
    CarError, CarEvent, CarStatus, Jurisdiction, LicensePlate, Manufacturer,
    events::OwnershipChangedData,
};

/// Car aggregate state.
///
/// Identity, version and timestamps live on the surrounding
/// [`EventSourcedRoot`](crate::EventSourcedRoot).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Car {
    organization_id: Option<String>,
    manufacturer: Option<Manufacturer>,
    owner_id: Option<String>,
    managed_by_id: Option<String>,
    plate: Option<LicensePlate>,
    status: CarStatus,
}

impl Aggregate for Car {
    type Event = CarEvent;
    type Error = CarError;

    fn aggregate_type() -> &'static str {
        "Car"
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            CarEvent::Created(data) => {
                self.organization_id = Some(data.organization_id);
                self.status = CarStatus::Draft;
            }
            CarEvent::ManufacturerChanged(data) => {
                self.manufacturer = Some(data.manufacturer);
            }
            CarEvent::OwnershipChanged(data) => self.apply_ownership_changed(data),
            CarEvent::RegistrationChanged(data) => {
                self.plate = Some(data.plate);
                self.status = CarStatus::Registered;
            }
            CarEvent::Deleted(_) => {
                self.status = CarStatus::Deleted;
            }
        }
    }
}

// Query methods
impl Car {
    pub fn organization_id(&self) -> Option<&str> {
        self.organization_id.as_deref()
    }

    pub fn manufacturer(&self) -> Option<&Manufacturer> {
        self.manufacturer.as_ref()
    }

    pub fn owner_id(&self) -> Option<&str> {
        self.owner_id.as_deref()
    }

    pub fn managed_by_id(&self) -> Option<&str> {
        self.managed_by_id.as_deref()
    }

    pub fn plate(&self) -> Option<&LicensePlate> {
        self.plate.as_ref()
    }

    pub fn status(&self) -> CarStatus {
        self.status
    }
}

// Command methods (return events)
impl Car {
    /// Creates a car for an organization.
    pub fn create(&self, organization_id: &str) -> Result<Vec<CarEvent>, CarError> {
        if self.organization_id.is_some() {
            return Err(CarError::AlreadyCreated);
        }
        if organization_id.trim().is_empty() {
            return Err(CarError::OrganizationRequired);
        }

        Ok(vec![CarEvent::created(organization_id)])
    }

    /// Sets the make, model and year. No event when nothing changed.
    pub fn set_manufacturer(
        &self,
        year: i32,
        make: &str,
        model: &str,
    ) -> Result<Vec<CarEvent>, CarError> {
        self.ensure_live("set manufacturer")?;
        let manufacturer = Manufacturer::new(year, make, model)?;

        if self.manufacturer.as_ref() == Some(&manufacturer) {
            return Ok(vec![]);
        }
        Ok(vec![CarEvent::manufacturer_changed(manufacturer)])
    }

    /// Hands the car to a new owner, optionally managed by someone else.
    pub fn change_ownership(
        &self,
        owner_id: &str,
        managed_by_id: Option<&str>,
    ) -> Result<Vec<CarEvent>, CarError> {
        self.ensure_live("change ownership")?;
        if owner_id.trim().is_empty() {
            return Err(CarError::OwnerRequired);
        }

        if self.owner_id.as_deref() == Some(owner_id) && self.managed_by_id.as_deref() == managed_by_id
        {
            return Ok(vec![]);
        }
        Ok(vec![CarEvent::ownership_changed(
            owner_id,
            managed_by_id.map(str::to_string),
        )])
    }

    /// Registers the car with a plate. Requires an owner and manufacturer details.
    pub fn register(
        &self,
        country: &str,
        state: &str,
        number: &str,
    ) -> Result<Vec<CarEvent>, CarError> {
        self.ensure_live("register")?;
        if !self.status.can_register() {
            return Err(CarError::InvalidStateTransition {
                current_state: self.status,
                action: "register",
            });
        }
        if self.manufacturer.is_none() {
            return Err(CarError::ManufacturerRequired);
        }

        let plate = LicensePlate::new(Jurisdiction::new(country, state)?, number)?;
        if self.plate.as_ref() == Some(&plate) {
            return Ok(vec![]);
        }
        Ok(vec![CarEvent::registration_changed(plate)])
    }

    /// Deletes the car.
    pub fn delete(&self, deleted_by_id: &str) -> Result<Vec<CarEvent>, CarError> {
        self.ensure_live("delete")?;
        Ok(vec![CarEvent::deleted(deleted_by_id)])
    }

    fn ensure_live(&self, action: &'static str) -> Result<(), CarError> {
        if self.organization_id.is_none() {
            return Err(CarError::NotCreated);
        }
        if !self.status.can_change_details() {
            return Err(CarError::InvalidStateTransition {
                current_state: self.status,
                action,
            });
        }
        Ok(())
    }
}

// Event application helpers
impl Car {
    fn apply_ownership_changed(&mut self, data: OwnershipChangedData) {
        self.owner_id = Some(data.owner_id);
        self.managed_by_id = data.managed_by_id;
        if self.status == CarStatus::Draft {
            self.status = CarStatus::Owned;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ErrorKind;

    fn created() -> Car {
        let mut car = Car::default();
        car.apply_events(car.create("org_1").unwrap());
        car
    }

    fn owned() -> Car {
        let mut car = created();
        car.apply_events(car.set_manufacturer(2024, "Toyota", "Corolla").unwrap());
        car.apply_events(car.change_ownership("user_1", None).unwrap());
        car
    }

    #[test]
    fn create_sets_organization() {
        let car = created();
        assert_eq!(car.organization_id(), Some("org_1"));
        assert_eq!(car.status(), CarStatus::Draft);
    }

    #[test]
    fn create_twice_fails() {
        let car = created();
        let err = car.create("org_2").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EntityExists);
    }

    #[test]
    fn commands_on_uncreated_car_fail() {
        let car = Car::default();
        assert!(matches!(
            car.set_manufacturer(2024, "Toyota", "Corolla"),
            Err(CarError::NotCreated)
        ));
    }

    #[test]
    fn unchanged_manufacturer_raises_nothing() {
        let car = owned();
        assert!(
            car.set_manufacturer(2024, "Toyota", "Corolla")
                .unwrap()
                .is_empty()
        );
        assert_eq!(
            car.set_manufacturer(2025, "Toyota", "Corolla")
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn ownership_moves_draft_to_owned() {
        let car = owned();
        assert_eq!(car.status(), CarStatus::Owned);
        assert_eq!(car.owner_id(), Some("user_1"));
        assert_eq!(car.managed_by_id(), None);
    }

    #[test]
    fn register_requires_owner() {
        let mut car = created();
        car.apply_events(car.set_manufacturer(2024, "Toyota", "Corolla").unwrap());

        let err = car.register("NZ", "Auckland", "ABC123").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RuleViolation);
    }

    #[test]
    fn register_requires_manufacturer() {
        let mut car = created();
        car.apply_events(car.change_ownership("user_1", None).unwrap());

        assert!(matches!(
            car.register("NZ", "Auckland", "ABC123"),
            Err(CarError::ManufacturerRequired)
        ));
    }

    #[test]
    fn register_sets_plate() {
        let mut car = owned();
        car.apply_events(car.register("nz", "Auckland", "abc123").unwrap());

        assert_eq!(car.status(), CarStatus::Registered);
        assert_eq!(car.plate().map(|p| p.number.as_str()), Some("ABC123"));
    }

    #[test]
    fn invalid_plate_is_a_validation_error() {
        let car = owned();
        let err = car.register("NZ", "Auckland", "!!").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn deleted_car_rejects_commands() {
        let mut car = owned();
        car.apply_events(car.delete("user_1").unwrap());

        assert_eq!(car.status(), CarStatus::Deleted);
        assert!(car.change_ownership("user_2", None).is_err());
        assert!(car.delete("user_1").is_err());
    }
}
