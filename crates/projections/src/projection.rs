//! The projection trait.

use async_trait::async_trait;
use event_store::{EventStreamChangeEvent, Version};

use crate::Result;
use crate::query_store::ReadModel;

/// Builds one read model from the events of one aggregate type.
///
/// Implementations must be idempotent: the same event may be delivered more
/// than once, after a retry or during a rebuild.
#[async_trait]
pub trait ReadModelProjection: Send + Sync {
    /// Name used in logs and error messages.
    fn name(&self) -> &'static str;

    /// The aggregate type whose events this projection consumes.
    fn root_aggregate_type(&self) -> &'static str;

    /// Applies one stored event to the read model.
    ///
    /// Returns `Ok(false)` when the event was not projected: an event type the
    /// projection does not know, or one it has already seen.
    async fn project_event(&self, event: &EventStreamChangeEvent) -> Result<bool>;

    /// Removes every row of the read model.
    async fn destroy_all(&self) -> Result<()>;
}

/// True if `row` already reflects the event at `version`.
pub fn already_projected<T: ReadModel>(row: &T, version: Version) -> bool {
    row.last_version() >= version
}
