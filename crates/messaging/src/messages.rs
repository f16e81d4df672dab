//! Payloads carried by the well-known queues and topics.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const EMAILS_QUEUE: &str = "emails";
pub const USAGES_QUEUE: &str = "usages";
pub const AUDITS_QUEUE: &str = "audits";
pub const PROVISIONINGS_QUEUE: &str = "provisionings";
pub const INTEGRATION_EVENTS_TOPIC: &str = "integration_events";

/// An email to be sent by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EmailMessage {
    pub to_email_address: String,
    pub to_display_name: Option<String>,
    pub subject: String,
    pub html_body: String,
}

/// A product-usage event to be forwarded to analytics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UsageMessage {
    pub for_id: String,
    pub event_name: String,
    #[serde(default)]
    pub additional: BTreeMap<String, String>,
}

/// An audit trail entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AuditMessage {
    pub audit_code: String,
    pub against_id: String,
    pub message_template: String,
    #[serde(default)]
    pub arguments: Vec<String>,
}

/// A change to a tenant's provisioned features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProvisioningMessage {
    pub provisioning_type: String,
    #[serde(default)]
    pub values: BTreeMap<String, serde_json::Value>,
}

/// An integration event published to other bounded contexts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IntegrationEventMessage {
    /// Fully qualified event name, e.g. `Car.Registered`.
    pub event_name: String,
    pub root_id: String,
    pub occurred_at_utc: DateTime<Utc>,
    pub data: serde_json::Value,
}
