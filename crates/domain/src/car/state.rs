//! Car lifecycle state.

use serde::{Deserialize, Serialize};

/// Where a car is in its lifecycle.
///
/// ```text
/// Draft ──► Owned ──► Registered
///   │         │           │
///   └─────────┴───────────┴──► Deleted
/// ```
///
/// Manufacturer details may change in any live state; a registered car may
/// be re-registered or change owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CarStatus {
    /// Created, no owner yet.
    #[default]
    Draft,

    /// Has an owner, not registered.
    Owned,

    /// Carries a license plate.
    Registered,

    /// Terminal.
    Deleted,
}

impl CarStatus {
    pub fn can_change_details(&self) -> bool {
        !matches!(self, CarStatus::Deleted)
    }

    pub fn can_register(&self) -> bool {
        matches!(self, CarStatus::Owned | CarStatus::Registered)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CarStatus::Deleted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CarStatus::Draft => "Draft",
            CarStatus::Owned => "Owned",
            CarStatus::Registered => "Registered",
            CarStatus::Deleted => "Deleted",
        }
    }
}

impl std::fmt::Display for CarStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
