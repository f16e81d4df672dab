//! Message queues and pub/sub topics.
//!
//! - [`MessageQueueStore`]: point-to-point queues, one consumer per message
//! - [`MessageBusTopicStore`]: topics, every subscription receives each message
//! - In-memory and PostgreSQL backends for both; the PostgreSQL ones support
//!   competing consumers
//!
//! A failed delivery puts the message back for another attempt; after
//! `max_deliveries` attempts it is dead-lettered.

pub mod bus;
pub mod call;
mod delivery;
pub mod envelope;
pub mod error;
pub mod handler;
pub mod memory;
pub mod messages;
pub mod names;
pub mod postgres;
pub mod queue;

pub use bus::{DEFAULT_RETENTION, MessageBusTopicStore};
pub use call::CallContext;
pub use envelope::{MessagePayload, QueuedMessage};
pub use error::{HandlerError, MessagingError, Result};
pub use handler::MessageHandler;
pub use memory::{InMemoryMessageBusStore, InMemoryQueueStore};
pub use messages::{
    AUDITS_QUEUE, AuditMessage, EMAILS_QUEUE, EmailMessage, INTEGRATION_EVENTS_TOPIC,
    IntegrationEventMessage, PROVISIONINGS_QUEUE, ProvisioningMessage, USAGES_QUEUE,
    UsageMessage,
};
pub use postgres::{PostgresMessageBusStore, PostgresQueueStore};
pub use queue::{DEFAULT_MAX_DELIVERIES, MessageQueueStore};
