//! Domain layer for the event-sourcing system.
//!
//! This crate provides the core domain abstractions including:
//! - Aggregate and DomainEvent traits for event-sourced entities
//! - EventSourcedRoot, which tracks identity, version and pending changes
//! - ChangeEventMigrator for upcasting stored events
//! - EventSourcingRepository and the ChangeEventObserver hook
//! - Car aggregate as a sample subdomain

pub mod aggregate;
pub mod car;
pub mod error;
pub mod migrator;
pub mod repository;
pub mod root;

pub use aggregate::{Aggregate, DomainEvent};
pub use car::{
    Car, CarError, CarEvent, CarService, CarStatus, ChangeOwnership, CreateCar, DeleteCar,
    Jurisdiction, LicensePlate, Manufacturer, RegisterCar, SetManufacturer, car_migrator,
};
pub use common::Identifier;
pub use error::{DomainError, ObserverError};
pub use migrator::{ChangeEventMigrator, Rehydrated};
pub use repository::{ChangeEventObserver, EventSourcingRepository};
pub use root::EventSourcedRoot;
