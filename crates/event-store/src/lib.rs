pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod store;

pub use common::Identifier;
pub use error::{EventStoreError, Result};
pub use event::{
    EventId, EventMetadata, EventStreamChangeEvent, NewEvent, NewEventBuilder, Version,
    stream_name,
};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use store::{Appended, EventStore, EventStoreExt, EventStream, validate_batch};
