//! Shared types for the event-sourcing core.

pub mod error;
pub mod types;

pub use error::{ErrorKind, InvalidIdentifier};
pub use types::Identifier;
