//! Car commands.

use common::Identifier;

/// Command to create a new car.
#[derive(Debug, Clone)]
pub struct CreateCar {
    /// The car ID to create.
    pub car_id: Identifier,

    /// The organization that owns the record.
    pub organization_id: String,
}

impl CreateCar {
    pub fn new(car_id: Identifier, organization_id: impl Into<String>) -> Self {
        Self {
            car_id,
            organization_id: organization_id.into(),
        }
    }

    /// Creates a new CreateCar command with a generated `car_` ID.
    pub fn for_organization(organization_id: impl Into<String>) -> Self {
        Self::new(Identifier::with_prefix("car"), organization_id)
    }
}

/// Command to set the make, model and year of a car.
#[derive(Debug, Clone)]
pub struct SetManufacturer {
    pub car_id: Identifier,
    pub year: i32,
    pub make: String,
    pub model: String,
}

impl SetManufacturer {
    pub fn new(
        car_id: Identifier,
        year: i32,
        make: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            car_id,
            year,
            make: make.into(),
            model: model.into(),
        }
    }
}

/// Command to change the owner of a car.
#[derive(Debug, Clone)]
pub struct ChangeOwnership {
    pub car_id: Identifier,
    pub owner_id: String,
    pub managed_by_id: Option<String>,
}

impl ChangeOwnership {
    pub fn new(car_id: Identifier, owner_id: impl Into<String>) -> Self {
        Self {
            car_id,
            owner_id: owner_id.into(),
            managed_by_id: None,
        }
    }

    pub fn managed_by(mut self, managed_by_id: impl Into<String>) -> Self {
        self.managed_by_id = Some(managed_by_id.into());
        self
    }
}

/// Command to register a car with a plate.
#[derive(Debug, Clone)]
pub struct RegisterCar {
    pub car_id: Identifier,
    pub country: String,
    pub state: String,
    pub number: String,
}

impl RegisterCar {
    pub fn new(
        car_id: Identifier,
        country: impl Into<String>,
        state: impl Into<String>,
        number: impl Into<String>,
    ) -> Self {
        Self {
            car_id,
            country: country.into(),
            state: state.into(),
            number: number.into(),
        }
    }
}

/// Command to delete a car.
#[derive(Debug, Clone)]
pub struct DeleteCar {
    pub car_id: Identifier,
    pub deleted_by_id: String,
}

impl DeleteCar {
    pub fn new(car_id: Identifier, deleted_by_id: impl Into<String>) -> Self {
        Self {
            car_id,
            deleted_by_id: deleted_by_id.into(),
        }
    }
}
