//! HTTP client for the remote API.

use std::time::Duration;

use async_trait::async_trait;

use crate::{RelayError, Result};

/// Posts JSON bodies to the remote API.
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Posts `body` to `path` and returns the response status.
    ///
    /// Only transport failures are errors; any status is returned as-is.
    async fn post_json(&self, path: &str, body: String, headers: Vec<(String, String)>)
    -> Result<u16>;
}

/// Blocking `ureq` agent driven from the blocking thread pool.
#[derive(Clone)]
pub struct HttpApiClient {
    agent: ureq::Agent,
    base_url: String,
}

impl HttpApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();

        Self {
            agent,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl ApiClient for HttpApiClient {
    async fn post_json(
        &self,
        path: &str,
        body: String,
        headers: Vec<(String, String)>,
    ) -> Result<u16> {
        let agent = self.agent.clone();
        let url = self.url(path);

        tokio::task::spawn_blocking(move || {
            let mut request = agent
                .post(&url)
                .header("Content-Type", "application/json");
            for (name, value) in headers {
                request = request.header(name, value);
            }

            request
                .send(body)
                .map(|response| response.status().as_u16())
                .map_err(|e| RelayError::Transport {
                    url,
                    message: e.to_string(),
                })
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_base_url_and_path() {
        let client = HttpApiClient::new("http://localhost:5001/", Duration::from_secs(1));
        assert_eq!(client.base_url(), "http://localhost:5001");
        assert_eq!(
            client.url("/api/emails/send"),
            "http://localhost:5001/api/emails/send"
        );
    }

    #[tokio::test]
    async fn unreachable_api_is_a_transport_error() {
        // Port 9 (discard) is closed on test hosts.
        let client = HttpApiClient::new("http://127.0.0.1:9", Duration::from_secs(2));
        let err = client
            .post_json("/api/emails/send", "{}".to_string(), Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Transport { .. }));
    }
}
