use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who is sending a message: the correlation id of the originating call and
/// the tenant it acts for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    pub call_id: String,
    pub tenant_id: Option<String>,
}

impl CallContext {
    pub fn new(call_id: impl Into<String>, tenant_id: Option<String>) -> Self {
        Self {
            call_id: call_id.into(),
            tenant_id,
        }
    }

    /// A context for work the system starts on its own, with a fresh call id.
    pub fn system() -> Self {
        Self {
            call_id: Uuid::new_v4().simple().to_string(),
            tenant_id: None,
        }
    }

    pub fn for_tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            ..Self::system()
        }
    }
}
