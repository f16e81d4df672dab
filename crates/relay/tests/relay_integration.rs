//! Integration tests: queues → relay workers → a local fake API.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode, Uri};
use axum::routing::post;
use messaging::{
    AuditMessage, CallContext, EmailMessage, INTEGRATION_EVENTS_TOPIC, InMemoryQueueStore,
    IntegrationEventMessage, MessageBusTopicStore, MessageQueueStore, QueuedMessage,
};
use relay::relays::{AUDITS_ENDPOINT, DOMAIN_EVENTS_ENDPOINT, EMAILS_ENDPOINT};
use relay::{
    HmacSigner, HttpApiClient, RelayRequest, RelayStores, RelayWorker, SIGNATURE_HEADER,
    spawn_relays,
};
use tokio::sync::{Mutex, watch};
use tower::ServiceExt;

const SECRET: &str = "test-secret";

#[derive(Debug, Clone)]
struct Received {
    path: String,
    signature_valid: bool,
    request: RelayRequest,
}

/// Stands in for the remote API: records requests and answers with a settable status.
#[derive(Clone)]
struct FakeApi {
    status: Arc<AtomicU16>,
    received: Arc<Mutex<Vec<Received>>>,
    signer: HmacSigner,
}

impl FakeApi {
    async fn start(status: u16) -> (Self, SocketAddr) {
        let api = Self {
            status: Arc::new(AtomicU16::new(status)),
            received: Arc::new(Mutex::new(Vec::new())),
            signer: HmacSigner::new(SECRET).unwrap(),
        };

        let app = Router::new()
            .route("/api/{*rest}", post(receive))
            .with_state(api.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (api, addr)
    }

    async fn received(&self) -> Vec<Received> {
        self.received.lock().await.clone()
    }

    async fn wait_for(&self, count: usize) -> Vec<Received> {
        for _ in 0..400 {
            let received = self.received().await;
            if received.len() >= count {
                return received;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.received().await
    }
}

async fn receive(
    State(api): State<FakeApi>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let signature_valid = api.signer.verify(&body, signature);
    let request: RelayRequest = serde_json::from_slice(&body).unwrap();

    api.received.lock().await.push(Received {
        path: uri.path().to_string(),
        signature_valid,
        request,
    });
    StatusCode::from_u16(api.status.load(Ordering::SeqCst)).unwrap()
}

fn client(addr: SocketAddr) -> Arc<HttpApiClient> {
    Arc::new(HttpApiClient::new(
        format!("http://{addr}"),
        Duration::from_secs(5),
    ))
}

fn email() -> EmailMessage {
    EmailMessage {
        to_email_address: "driver@example.com".to_string(),
        to_display_name: None,
        subject: "Your car is registered".to_string(),
        html_body: "<p>Done</p>".to_string(),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_delivery_is_signed_and_carries_the_envelope() {
    let (api, addr) = FakeApi::start(200).await;
    let queue = InMemoryQueueStore::new("emails");
    let pushed = queue
        .push(&CallContext::for_tenant("tenant_1"), email())
        .await
        .unwrap();
    let worker = RelayWorker::new(
        "emails",
        EMAILS_ENDPOINT,
        client(addr),
        HmacSigner::new(SECRET).unwrap(),
    );

    assert!(queue.pop_single(&worker).await.unwrap());
    assert!(!queue.pop_single(&worker).await.unwrap());

    let received = api.received().await;
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].path, EMAILS_ENDPOINT);
    assert!(received[0].signature_valid);

    let relayed: QueuedMessage<EmailMessage> =
        serde_json::from_str(&received[0].request.message).unwrap();
    assert_eq!(relayed.message_id, pushed.message_id);
    assert_eq!(relayed.tenant_id.as_deref(), Some("tenant_1"));
    assert_eq!(relayed.delivery_count, 1);
    assert_eq!(relayed.payload, email());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failing_api_requeues_then_dead_letters() {
    let (api, addr) = FakeApi::start(503).await;
    let queue = InMemoryQueueStore::new("emails").with_max_deliveries(2);
    queue.push(&CallContext::system(), email()).await.unwrap();
    let worker = RelayWorker::new(
        "emails",
        EMAILS_ENDPOINT,
        client(addr),
        HmacSigner::new(SECRET).unwrap(),
    );

    assert!(queue.pop_single(&worker).await.is_err());
    assert_eq!(queue.count().await.unwrap(), 1);

    assert!(queue.pop_single(&worker).await.is_err());
    assert_eq!(queue.count().await.unwrap(), 0);
    assert_eq!(queue.dead_letter_count().await.unwrap(), 1);

    assert_eq!(api.received().await.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_well_known_relays_drain_queues_and_topic() {
    let (api, addr) = FakeApi::start(200).await;
    let stores = RelayStores::in_memory(3);
    stores
        .audits
        .push(
            &CallContext::system(),
            AuditMessage {
                audit_code: "Car.Deleted".to_string(),
                against_id: "car_1".to_string(),
                message_template: "Car {0} was deleted by {1}".to_string(),
                arguments: vec!["car_1".to_string(), "user_1".to_string()],
            },
        )
        .await
        .unwrap();
    stores
        .integration_events
        .send(
            INTEGRATION_EVENTS_TOPIC,
            &CallContext::system(),
            IntegrationEventMessage {
                event_name: "Car.Registered".to_string(),
                root_id: "car_1".to_string(),
                occurred_at_utc: chrono::Utc::now(),
                data: serde_json::json!({"Number": "ABC123"}),
            },
        )
        .await
        .unwrap();

    let (shutdown, receiver) = watch::channel(false);
    let pollers = spawn_relays(
        &stores,
        client(addr),
        HmacSigner::new(SECRET).unwrap(),
        Duration::from_millis(10),
        receiver,
    );

    let received = api.wait_for(2).await;
    shutdown.send(true).unwrap();
    for poller in pollers {
        poller.await.unwrap();
    }

    let mut paths: Vec<_> = received.iter().map(|r| r.path.as_str()).collect();
    paths.sort();
    assert_eq!(paths, vec![AUDITS_ENDPOINT, DOMAIN_EVENTS_ENDPOINT]);
    assert!(received.iter().all(|r| r.signature_valid));
    assert_eq!(stores.audits.count().await.unwrap(), 0);
}

fn app() -> Router {
    let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .build_recorder()
        .handle();
    relay::create_app(handle)
}

#[tokio::test]
async fn test_health_check() {
    let response = app()
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["relays"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let response = app()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}
