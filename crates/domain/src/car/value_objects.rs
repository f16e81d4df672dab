//! Value objects for the car domain.

use serde::{Deserialize, Serialize};

use super::CarError;

const MIN_YEAR: i32 = 1886;
const MAX_YEAR: i32 = 2100;

/// Make, model and model year of a car.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Manufacturer {
    pub year: i32,
    pub make: String,
    pub model: String,
}

impl Manufacturer {
    pub fn new(
        year: i32,
        make: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, CarError> {
        let make = make.into().trim().to_string();
        let model = model.into().trim().to_string();

        if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
            return Err(CarError::InvalidManufacturer(format!(
                "year {year} is outside {MIN_YEAR}..={MAX_YEAR}"
            )));
        }
        if make.is_empty() || model.is_empty() {
            return Err(CarError::InvalidManufacturer(
                "make and model are required".to_string(),
            ));
        }

        Ok(Self { year, make, model })
    }
}

impl std::fmt::Display for Manufacturer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.year, self.make, self.model)
    }
}

/// Country and state that issued a plate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Jurisdiction {
    /// ISO 3166-1 alpha-2 country code, upper case.
    pub country: String,
    pub state: String,
}

impl Jurisdiction {
    pub fn new(country: impl Into<String>, state: impl Into<String>) -> Result<Self, CarError> {
        let country = country.into().trim().to_uppercase();
        let state = state.into().trim().to_string();

        if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(CarError::InvalidJurisdiction(format!(
                "country {country:?} is not a two-letter code"
            )));
        }
        if state.is_empty() {
            return Err(CarError::InvalidJurisdiction(
                "state is required".to_string(),
            ));
        }

        Ok(Self { country, state })
    }
}

impl std::fmt::Display for Jurisdiction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.country, self.state)
    }
}

/// A registration plate within its jurisdiction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LicensePlate {
    pub jurisdiction: Jurisdiction,
    pub number: String,
}

impl LicensePlate {
    const MAX_LEN: usize = 10;

    /// Plate numbers are upper-cased; only letters, digits, spaces and
    /// hyphens are allowed.
    pub fn new(jurisdiction: Jurisdiction, number: impl Into<String>) -> Result<Self, CarError> {
        let number = number.into().trim().to_uppercase();

        if number.is_empty() || number.len() > Self::MAX_LEN {
            return Err(CarError::InvalidLicensePlate(format!(
                "{number:?} must be 1 to {} characters",
                Self::MAX_LEN
            )));
        }
        if !number
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == ' ' || c == '-')
        {
            return Err(CarError::InvalidLicensePlate(format!(
                "{number:?} contains invalid characters"
            )));
        }

        Ok(Self {
            jurisdiction,
            number,
        })
    }
}

impl std::fmt::Display for LicensePlate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.number, self.jurisdiction)
    }
}
