//! Car aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod migrations;
mod service;
mod state;
mod value_objects;

pub use aggregate::Car;
pub use commands::*;
pub use events::{
    CarCreatedData, CarDeletedData, CarEvent, LEGACY_NUMBER_PLATE_ASSIGNED,
    ManufacturerChangedData, OwnershipChangedData, RegistrationChangedData,
    upcast_number_plate_assigned,
};
pub use migrations::car_migrator;
pub use service::CarService;
pub use state::CarStatus;
pub use value_objects::{Jurisdiction, LicensePlate, Manufacturer};

use common::ErrorKind;
use thiserror::Error;

/// Errors that can occur during car operations.
#[derive(Debug, Error)]
pub enum CarError {
    /// Organization ID is required.
    #[error("Organization ID is required")]
    OrganizationRequired,

    /// Owner ID is required.
    #[error("Owner ID is required")]
    OwnerRequired,

    /// Registration needs manufacturer details.
    #[error("Manufacturer details are required before registration")]
    ManufacturerRequired,

    /// Car is not in the expected state.
    #[error("Invalid state transition: cannot {action} from {current_state} state")]
    InvalidStateTransition {
        current_state: CarStatus,
        action: &'static str,
    },

    #[error("Invalid manufacturer: {0}")]
    InvalidManufacturer(String),

    #[error("Invalid jurisdiction: {0}")]
    InvalidJurisdiction(String),

    #[error("Invalid license plate: {0}")]
    InvalidLicensePlate(String),

    /// Car has not been created.
    #[error("Car has not been created")]
    NotCreated,

    /// Car is already created.
    #[error("Car already created")]
    AlreadyCreated,
}

impl CarError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CarError::OrganizationRequired
            | CarError::OwnerRequired
            | CarError::InvalidManufacturer(_)
            | CarError::InvalidJurisdiction(_)
            | CarError::InvalidLicensePlate(_) => ErrorKind::Validation,
            CarError::ManufacturerRequired | CarError::InvalidStateTransition { .. } => {
                ErrorKind::RuleViolation
            }
            CarError::NotCreated => ErrorKind::PreconditionViolation,
            CarError::AlreadyCreated => ErrorKind::EntityExists,
        }
    }
}
