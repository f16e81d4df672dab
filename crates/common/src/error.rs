//! Error taxonomy shared by every crate in the workspace.

use thiserror::Error;

/// The kind of failure an operation reported.
///
/// Each crate keeps its own error enum; `kind()` on those enums maps them
/// onto this taxonomy so callers can branch on not-found vs conflict vs
/// unexpected without matching on every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A malformed input value.
    Validation,
    /// A business invariant was broken.
    RuleViolation,
    /// The addressed entity or stream does not exist.
    EntityNotFound,
    /// The entity already exists.
    EntityExists,
    /// A precondition did not hold, e.g. an optimistic-concurrency conflict.
    PreconditionViolation,
    /// An underlying transport or storage failure.
    Unexpected,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::RuleViolation => "rule_violation",
            ErrorKind::EntityNotFound => "entity_not_found",
            ErrorKind::EntityExists => "entity_exists",
            ErrorKind::PreconditionViolation => "precondition_violation",
            ErrorKind::Unexpected => "unexpected",
        };
        f.write_str(name)
    }
}

/// Returned when a string cannot be used as an [`Identifier`](crate::Identifier).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid identifier: {value:?}")]
pub struct InvalidIdentifier {
    pub value: String,
}

impl InvalidIdentifier {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}
