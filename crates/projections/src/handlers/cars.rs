//! Consumers and translators for car events.

use async_trait::async_trait;
use domain::{CarEvent, ObserverError};
use event_store::EventStreamChangeEvent;
use messaging::{AuditMessage, CallContext, IntegrationEventMessage, MessageQueueStore};
use serde_json::json;

use crate::notifier::{DomainEventConsumer, IntegrationEventTranslator};

/// Writes an audit entry when a car changes owner or is deleted.
///
/// Delivery is at-least-once; the audit service de-duplicates on
/// `AgainstId` and the event id in `Arguments`.
pub struct CarAuditConsumer<Q> {
    audits: Q,
}

impl<Q: MessageQueueStore<AuditMessage>> CarAuditConsumer<Q> {
    pub fn new(audits: Q) -> Self {
        Self { audits }
    }
}

#[async_trait]
impl<Q: MessageQueueStore<AuditMessage>> DomainEventConsumer<CarEvent> for CarAuditConsumer<Q> {
    fn name(&self) -> &str {
        "CarAuditConsumer"
    }

    async fn notify(
        &self,
        event: &CarEvent,
        stored: &EventStreamChangeEvent,
    ) -> Result<(), ObserverError> {
        let (audit_code, message_template, argument) = match event {
            CarEvent::OwnershipChanged(data) => (
                "Car.OwnershipChanged",
                "Car {0} is now owned by {1}",
                data.owner_id.clone(),
            ),
            CarEvent::Deleted(data) => (
                "Car.Deleted",
                "Car {0} was deleted by {1}",
                data.deleted_by_id.clone(),
            ),
            _ => return Ok(()),
        };

        self.audits
            .push(
                &CallContext::system(),
                AuditMessage {
                    audit_code: audit_code.to_string(),
                    against_id: stored.root_id.to_string(),
                    message_template: message_template.to_string(),
                    arguments: vec![stored.root_id.to_string(), argument, stored.id.to_string()],
                },
            )
            .await?;
        Ok(())
    }
}

/// Publishes `Car.Created`, `Car.Registered` and `Car.Deleted` to other contexts.
#[derive(Debug, Default, Clone, Copy)]
pub struct CarIntegrationTranslator;

impl IntegrationEventTranslator<CarEvent> for CarIntegrationTranslator {
    fn name(&self) -> &str {
        "CarIntegrationTranslator"
    }

    fn translate(
        &self,
        event: &CarEvent,
        stored: &EventStreamChangeEvent,
    ) -> Result<Option<IntegrationEventMessage>, ObserverError> {
        let (event_name, data) = match event {
            CarEvent::Created(data) => (
                "Car.Created",
                json!({ "OrganizationId": data.organization_id }),
            ),
            CarEvent::RegistrationChanged(data) => (
                "Car.Registered",
                json!({
                    "Number": data.plate.number,
                    "Country": data.plate.jurisdiction.country,
                    "State": data.plate.jurisdiction.state,
                }),
            ),
            CarEvent::Deleted(data) => (
                "Car.Deleted",
                json!({ "DeletedById": data.deleted_by_id }),
            ),
            CarEvent::ManufacturerChanged(_) | CarEvent::OwnershipChanged(_) => return Ok(None),
        };

        Ok(Some(IntegrationEventMessage {
            event_name: event_name.to_string(),
            root_id: stored.root_id.to_string(),
            occurred_at_utc: stored.occurred_at_utc,
            data,
        }))
    }
}
