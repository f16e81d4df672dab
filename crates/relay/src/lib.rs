//! Relays queued messages to the remote API.
//!
//! Each well-known queue, and the `api` subscription of the integration-events
//! topic, has a poller that hands messages to a [`RelayWorker`]. The worker
//! posts them, HMAC-signed, to a fixed API endpoint. The binary also serves
//! `/health` and Prometheus `/metrics`.

pub mod client;
pub mod config;
pub mod error;
pub mod poller;
pub mod relays;
pub mod routes;
pub mod signer;
pub mod worker;

use axum::Router;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::trace::TraceLayer;

pub use client::{ApiClient, HttpApiClient};
pub use config::{LogFormat, RelayConfig};
pub use error::{RelayError, Result};
pub use poller::{PollSource, Poller, QueuePoller, TopicPoller};
pub use relays::{RelayStores, spawn_relays};
pub use signer::{HmacSigner, SIGNATURE_HEADER};
pub use worker::{RelayRequest, RelayWorker};

/// Creates the Axum router serving health and metrics.
pub fn create_app(metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .merge(metrics_router)
        .layer(TraceLayer::new_for_http())
}
