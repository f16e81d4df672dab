//! Read models and event notification for the query side.
//!
//! This crate receives the events a repository has just persisted:
//! - [`ReadModelProjection`] and [`ReadModelProjector`] keep denormalized views current
//! - [`QueryStore`] holds the rows of one view
//! - [`EventNotifier`] runs domain-event consumers and publishes integration events
//!   through a [`MessageBroker`]
//! - The car view, audit consumer and integration translator

pub mod broker;
pub mod error;
pub mod handlers;
pub mod notifier;
pub mod projection;
pub mod projector;
pub mod query_store;
pub mod views;

pub use broker::{MessageBroker, TopicMessageBroker};
pub use error::{ProjectionError, Result};
pub use handlers::{CarAuditConsumer, CarIntegrationTranslator};
pub use notifier::{
    DomainEventConsumer, EventNotificationRegistration, EventNotifier, IntegrationEventTranslator,
    NotificationRegistration,
};
pub use projection::{ReadModelProjection, already_projected};
pub use projector::ReadModelProjector;
pub use query_store::{InMemoryQueryStore, QueryStore, ReadModel};
pub use views::{CarProjection, CarReadModel};
