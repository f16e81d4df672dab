use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::CallContext;

/// Bound for anything carried by a queue or topic.
pub trait MessagePayload: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> MessagePayload for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// A message as stored on a queue or topic.
///
/// The payload's fields are flattened next to the envelope fields on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueuedMessage<M> {
    pub message_id: String,
    pub call_id: String,
    pub tenant_id: Option<String>,
    /// Deliveries attempted so far, including the one in progress.
    pub delivery_count: u32,
    pub enqueued_at_utc: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: M,
}

impl<M> QueuedMessage<M> {
    /// Wraps a payload with a new message id.
    pub fn new(call: &CallContext, payload: M) -> Self {
        Self {
            message_id: Uuid::new_v4().simple().to_string(),
            call_id: call.call_id.clone(),
            tenant_id: call.tenant_id.clone(),
            delivery_count: 0,
            enqueued_at_utc: Utc::now(),
            payload,
        }
    }
}

impl<M: Serialize> QueuedMessage<M> {
    /// JSON text of the full envelope, as relayed to the API.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
