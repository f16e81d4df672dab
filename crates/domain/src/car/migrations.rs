//! Upcasters for old car event schemas.

use crate::error::DomainError;
use crate::migrator::ChangeEventMigrator;

use super::{LEGACY_NUMBER_PLATE_ASSIGNED, upcast_number_plate_assigned};

/// Builds the migrator that brings stored car events up to the current schema.
pub fn car_migrator() -> Result<ChangeEventMigrator, DomainError> {
    ChangeEventMigrator::new().with_upcaster(
        LEGACY_NUMBER_PLATE_ASSIGNED,
        "RegistrationChanged",
        upcast_number_plate_assigned,
    )
}
