//! Relaying one queued message to the remote API.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use messaging::{HandlerError, MessageHandler, MessagePayload, QueuedMessage};
use serde::{Deserialize, Serialize};

use crate::client::ApiClient;
use crate::signer::{HmacSigner, SIGNATURE_HEADER};
use crate::{RelayError, Result};

/// Body posted to the API: the queued message as a JSON string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RelayRequest {
    pub message: String,
}

impl RelayRequest {
    pub fn for_message<M: Serialize>(message: &QueuedMessage<M>) -> Result<Self> {
        Ok(Self {
            message: message.to_json()?,
        })
    }
}

/// Posts every message it handles to one endpoint of the remote API.
///
/// A transport error or a non-2xx response fails the delivery, so the queue
/// retries the message and eventually dead-letters it.
pub struct RelayWorker {
    name: String,
    endpoint: String,
    client: Arc<dyn ApiClient>,
    signer: HmacSigner,
}

impl RelayWorker {
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        client: Arc<dyn ApiClient>,
        signer: HmacSigner,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            client,
            signer,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Posts one message, signed.
    #[tracing::instrument(
        skip(self, message),
        fields(relay = %self.name, message_id = %message.message_id)
    )]
    pub async fn relay<M: Serialize + Sync>(&self, message: &QueuedMessage<M>) -> Result<()> {
        let body = serde_json::to_string(&RelayRequest::for_message(message)?)?;
        let signature = self.signer.sign(body.as_bytes());

        let started = Instant::now();
        let result = self
            .client
            .post_json(
                &self.endpoint,
                body,
                vec![(SIGNATURE_HEADER.to_string(), signature)],
            )
            .await
            .and_then(|status| {
                if (200..300).contains(&status) {
                    Ok(())
                } else {
                    Err(RelayError::Status {
                        url: self.endpoint.clone(),
                        status,
                    })
                }
            });
        metrics::histogram!("relay_duration_seconds", "relay" => self.name.clone())
            .record(started.elapsed().as_secs_f64());

        match &result {
            Ok(()) => {
                metrics::counter!("relay_deliveries_total", "relay" => self.name.clone())
                    .increment(1);
                tracing::debug!(endpoint = %self.endpoint, "Message relayed");
            }
            Err(e) => {
                metrics::counter!("relay_failures_total", "relay" => self.name.clone())
                    .increment(1);
                tracing::error!(
                    endpoint = %self.endpoint,
                    delivery_count = message.delivery_count,
                    error = %e,
                    "Relay failed"
                );
            }
        }
        result
    }
}

#[async_trait]
impl<M: MessagePayload> MessageHandler<M> for RelayWorker {
    async fn handle(&self, message: QueuedMessage<M>) -> std::result::Result<(), HandlerError> {
        self.relay(&message).await?;
        Ok(())
    }
}
