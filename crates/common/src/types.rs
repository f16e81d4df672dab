use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::InvalidIdentifier;

/// Unique identifier for an aggregate instance.
///
/// Identifiers are opaque strings, unique within an aggregate type and never
/// reassigned. New identifiers are built from a random UUID, optionally with
/// a short type prefix (`car_4f6c...`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    /// Creates a new random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Creates a new random identifier with the given prefix.
    pub fn with_prefix(prefix: &str) -> Self {
        Self(format!("{prefix}_{}", Uuid::new_v4().simple()))
    }

    /// Parses an existing identifier.
    pub fn parse(value: impl Into<String>) -> Result<Self, InvalidIdentifier> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(InvalidIdentifier { value });
        }
        if value.chars().any(char::is_whitespace) {
            return Err(InvalidIdentifier { value });
        }
        Ok(Self(value))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Identifier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for Identifier {
    type Err = InvalidIdentifier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Identifier {
    type Error = InvalidIdentifier;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        id.0
    }
}

impl From<Uuid> for Identifier {
    fn from(uuid: Uuid) -> Self {
        Self(uuid.simple().to_string())
    }
}
