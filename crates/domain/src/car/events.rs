//! Car domain events.

use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

use super::{LicensePlate, Manufacturer};

/// Events that can occur on a car aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CarEvent {
    /// Car was created for an organization.
    Created(CarCreatedData),

    /// Make, model or year changed.
    ManufacturerChanged(ManufacturerChangedData),

    /// Car changed hands.
    OwnershipChanged(OwnershipChangedData),

    /// Car was (re-)registered with a plate.
    RegistrationChanged(RegistrationChangedData),

    /// Car was deleted.
    Deleted(CarDeletedData),
}

impl DomainEvent for CarEvent {
    const EVENT_TYPES: &'static [&'static str] = &[
        "Created",
        "ManufacturerChanged",
        "OwnershipChanged",
        "RegistrationChanged",
        "Deleted",
    ];

    fn event_type(&self) -> &'static str {
        match self {
            CarEvent::Created(_) => "Created",
            CarEvent::ManufacturerChanged(_) => "ManufacturerChanged",
            CarEvent::OwnershipChanged(_) => "OwnershipChanged",
            CarEvent::RegistrationChanged(_) => "RegistrationChanged",
            CarEvent::Deleted(_) => "Deleted",
        }
    }

    fn is_deletion(&self) -> bool {
        matches!(self, CarEvent::Deleted(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarCreatedData {
    pub organization_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManufacturerChangedData {
    pub manufacturer: Manufacturer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnershipChangedData {
    pub owner_id: String,

    /// Who manages the car on the owner's behalf, if anyone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed_by_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationChangedData {
    pub plate: LicensePlate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarDeletedData {
    pub deleted_by_id: String,
}

// Constructors
impl CarEvent {
    pub fn created(organization_id: impl Into<String>) -> Self {
        CarEvent::Created(CarCreatedData {
            organization_id: organization_id.into(),
        })
    }

    pub fn manufacturer_changed(manufacturer: Manufacturer) -> Self {
        CarEvent::ManufacturerChanged(ManufacturerChangedData { manufacturer })
    }

    pub fn ownership_changed(owner_id: impl Into<String>, managed_by_id: Option<String>) -> Self {
        CarEvent::OwnershipChanged(OwnershipChangedData {
            owner_id: owner_id.into(),
            managed_by_id,
        })
    }

    pub fn registration_changed(plate: LicensePlate) -> Self {
        CarEvent::RegistrationChanged(RegistrationChangedData { plate })
    }

    pub fn deleted(deleted_by_id: impl Into<String>) -> Self {
        CarEvent::Deleted(CarDeletedData {
            deleted_by_id: deleted_by_id.into(),
        })
    }
}

/// First schema of the registration event, before plates carried a
/// jurisdiction object. Still found in old streams.
pub const LEGACY_NUMBER_PLATE_ASSIGNED: &str = "NumberPlateAssigned";

/// Rewrites a `NumberPlateAssigned` payload
/// (`{"number_plate", "country", "region"}`) into `RegistrationChanged` data.
pub fn upcast_number_plate_assigned(data: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "plate": {
            "jurisdiction": {
                "country": data["country"],
                "state": data["region"],
            },
            "number": data["number_plate"],
        }
    })
}
