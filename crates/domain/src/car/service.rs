//! Car service providing a simplified API for car operations.

use common::Identifier;
use event_store::EventStore;

use crate::error::DomainError;
use crate::repository::EventSourcingRepository;
use crate::root::EventSourcedRoot;

use super::{Car, ChangeOwnership, CreateCar, DeleteCar, RegisterCar, SetManufacturer};

impl From<super::CarError> for DomainError {
    fn from(e: super::CarError) -> Self {
        DomainError::Car(e)
    }
}

/// Service for managing cars.
///
/// Each method loads the car, runs one command and saves the result,
/// returning the updated root.
pub struct CarService<S: EventStore> {
    repository: EventSourcingRepository<S, Car>,
}

impl<S: EventStore> CarService<S> {
    pub fn new(repository: EventSourcingRepository<S, Car>) -> Self {
        Self { repository }
    }

    /// Returns a reference to the underlying repository.
    pub fn repository(&self) -> &EventSourcingRepository<S, Car> {
        &self.repository
    }

    /// Creates a new car.
    #[tracing::instrument(skip(self))]
    pub async fn create_car(&self, cmd: CreateCar) -> Result<EventSourcedRoot<Car>, DomainError> {
        let mut root = EventSourcedRoot::create(cmd.car_id, |car: &Car| {
            car.create(&cmd.organization_id)
        })?;
        self.repository.save(&mut root).await?;
        Ok(root)
    }

    #[tracing::instrument(skip(self))]
    pub async fn set_manufacturer(
        &self,
        cmd: SetManufacturer,
    ) -> Result<EventSourcedRoot<Car>, DomainError> {
        self.update(&cmd.car_id, |car| {
            car.set_manufacturer(cmd.year, &cmd.make, &cmd.model)
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn change_ownership(
        &self,
        cmd: ChangeOwnership,
    ) -> Result<EventSourcedRoot<Car>, DomainError> {
        self.update(&cmd.car_id, |car| {
            car.change_ownership(&cmd.owner_id, cmd.managed_by_id.as_deref())
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn register_car(
        &self,
        cmd: RegisterCar,
    ) -> Result<EventSourcedRoot<Car>, DomainError> {
        self.update(&cmd.car_id, |car| {
            car.register(&cmd.country, &cmd.state, &cmd.number)
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_car(&self, cmd: DeleteCar) -> Result<EventSourcedRoot<Car>, DomainError> {
        self.update(&cmd.car_id, |car| car.delete(&cmd.deleted_by_id))
            .await
    }

    /// Loads a car.
    pub async fn get_car(&self, car_id: &Identifier) -> Result<EventSourcedRoot<Car>, DomainError> {
        self.repository.load(car_id).await
    }

    async fn update<F>(
        &self,
        car_id: &Identifier,
        command: F,
    ) -> Result<EventSourcedRoot<Car>, DomainError>
    where
        F: FnOnce(&Car) -> Result<Vec<super::CarEvent>, super::CarError>,
    {
        let mut root = self.repository.load(car_id).await?;
        root.execute(command)?;
        self.repository.save(&mut root).await?;
        Ok(root)
    }
}
