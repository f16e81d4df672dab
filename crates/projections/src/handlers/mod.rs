//! Notification handlers for domain events.

pub mod cars;

pub use cars::{CarAuditConsumer, CarIntegrationTranslator};
