//! Health check endpoint.

use axum::Json;
use serde::Serialize;

use crate::relays::{
    AUDITS_ENDPOINT, DOMAIN_EVENTS_ENDPOINT, EMAILS_ENDPOINT, PROVISIONINGS_ENDPOINT,
    USAGES_ENDPOINT,
};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub relays: [&'static str; 5],
}

/// GET /health — returns relay health and the endpoints it feeds.
pub async fn check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        relays: [
            EMAILS_ENDPOINT,
            USAGES_ENDPOINT,
            AUDITS_ENDPOINT,
            PROVISIONINGS_ENDPOINT,
            DOMAIN_EVENTS_ENDPOINT,
        ],
    })
}
