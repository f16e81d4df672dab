//! The well-known relays and the stores they drain.

use std::sync::Arc;
use std::time::Duration;

use messaging::{
    AUDITS_QUEUE, AuditMessage, EMAILS_QUEUE, EmailMessage, INTEGRATION_EVENTS_TOPIC,
    InMemoryMessageBusStore, InMemoryQueueStore, IntegrationEventMessage, MessageBusTopicStore,
    MessagePayload, MessageQueueStore, PROVISIONINGS_QUEUE, PostgresMessageBusStore,
    PostgresQueueStore, ProvisioningMessage, USAGES_QUEUE, UsageMessage,
};
use sqlx::PgPool;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::client::ApiClient;
use crate::poller::{QueuePoller, TopicPoller};
use crate::signer::HmacSigner;
use crate::worker::RelayWorker;
use crate::Result;

pub const EMAILS_ENDPOINT: &str = "/api/emails/send";
pub const USAGES_ENDPOINT: &str = "/api/usages/deliver";
pub const AUDITS_ENDPOINT: &str = "/api/audits/deliver";
pub const PROVISIONINGS_ENDPOINT: &str = "/api/provisioning/notify";
pub const DOMAIN_EVENTS_ENDPOINT: &str = "/api/domain_events/notify";

/// Subscription of the integration-events topic that feeds the API.
pub const API_SUBSCRIPTION: &str = "api";

/// The queues and topic the relay drains.
#[derive(Clone)]
pub struct RelayStores {
    pub emails: Arc<dyn MessageQueueStore<EmailMessage>>,
    pub usages: Arc<dyn MessageQueueStore<UsageMessage>>,
    pub audits: Arc<dyn MessageQueueStore<AuditMessage>>,
    pub provisionings: Arc<dyn MessageQueueStore<ProvisioningMessage>>,
    pub integration_events: Arc<dyn MessageBusTopicStore<IntegrationEventMessage>>,
}

impl RelayStores {
    /// In-process stores, for tests and single-process hosts.
    pub fn in_memory(max_deliveries: u32) -> Self {
        fn queue<M: MessagePayload>(name: &str, max: u32) -> Arc<dyn MessageQueueStore<M>> {
            Arc::new(InMemoryQueueStore::new(name).with_max_deliveries(max))
        }

        Self {
            emails: queue(EMAILS_QUEUE, max_deliveries),
            usages: queue(USAGES_QUEUE, max_deliveries),
            audits: queue(AUDITS_QUEUE, max_deliveries),
            provisionings: queue(PROVISIONINGS_QUEUE, max_deliveries),
            integration_events: Arc::new(
                InMemoryMessageBusStore::new().with_max_deliveries(max_deliveries),
            ),
        }
    }

    /// PostgreSQL queues and topic after running the migrations.
    ///
    /// The API subscription is registered up front so no integration event
    /// sent before the first poll falls out of the retention window.
    pub async fn postgres(pool: PgPool, max_deliveries: u32) -> Result<Self> {
        fn queue<M: MessagePayload>(
            pool: &PgPool,
            name: &str,
            max: u32,
        ) -> PostgresQueueStore<M> {
            PostgresQueueStore::new(pool.clone(), name).with_max_deliveries(max)
        }

        let emails = queue::<EmailMessage>(&pool, EMAILS_QUEUE, max_deliveries);
        emails.run_migrations().await?;

        let integration_events =
            PostgresMessageBusStore::new(pool.clone()).with_max_deliveries(max_deliveries);
        integration_events
            .subscribe(INTEGRATION_EVENTS_TOPIC, API_SUBSCRIPTION)
            .await?;

        Ok(Self {
            emails: Arc::new(emails),
            usages: Arc::new(queue::<UsageMessage>(&pool, USAGES_QUEUE, max_deliveries)),
            audits: Arc::new(queue::<AuditMessage>(&pool, AUDITS_QUEUE, max_deliveries)),
            provisionings: Arc::new(queue::<ProvisioningMessage>(
                &pool,
                PROVISIONINGS_QUEUE,
                max_deliveries,
            )),
            integration_events: Arc::new(integration_events),
        })
    }
}

/// Starts one poller per well-known relay.
pub fn spawn_relays(
    stores: &RelayStores,
    client: Arc<dyn ApiClient>,
    signer: HmacSigner,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let worker = |name: &str, endpoint: &str| {
        Arc::new(RelayWorker::new(
            name,
            endpoint,
            client.clone(),
            signer.clone(),
        ))
    };

    vec![
        QueuePoller::for_queue(
            EMAILS_QUEUE,
            stores.emails.clone(),
            worker(EMAILS_QUEUE, EMAILS_ENDPOINT),
            interval,
        )
        .spawn(shutdown.clone()),
        QueuePoller::for_queue(
            USAGES_QUEUE,
            stores.usages.clone(),
            worker(USAGES_QUEUE, USAGES_ENDPOINT),
            interval,
        )
        .spawn(shutdown.clone()),
        QueuePoller::for_queue(
            AUDITS_QUEUE,
            stores.audits.clone(),
            worker(AUDITS_QUEUE, AUDITS_ENDPOINT),
            interval,
        )
        .spawn(shutdown.clone()),
        QueuePoller::for_queue(
            PROVISIONINGS_QUEUE,
            stores.provisionings.clone(),
            worker(PROVISIONINGS_QUEUE, PROVISIONINGS_ENDPOINT),
            interval,
        )
        .spawn(shutdown.clone()),
        TopicPoller::for_topic(
            INTEGRATION_EVENTS_TOPIC,
            API_SUBSCRIPTION,
            stores.integration_events.clone(),
            worker(INTEGRATION_EVENTS_TOPIC, DOMAIN_EVENTS_ENDPOINT),
            interval,
        )
        .spawn(shutdown),
    ]
}
