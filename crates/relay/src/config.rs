//! Relay configuration loaded from environment variables.

use std::time::Duration;

const DEV_SECRET: &str = "dev-secret";

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Relay configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3001`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT` — `json` for JSON logs, anything else for text
/// - `RELAY_API_BASE_URL` — remote API (default: `"http://localhost:5001"`)
/// - `RELAY_HMAC_SECRET` — request signing secret (default: a development secret)
/// - `RELAY_POLL_INTERVAL_MS` — poll tick (default: `1000`)
/// - `RELAY_MAX_DELIVERIES` — deliveries before dead-lettering (default: `5`)
/// - `RELAY_HTTP_TIMEOUT_MS` — per-request timeout (default: `10000`)
/// - `DATABASE_URL` — when set, queues and topics live in PostgreSQL
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub api_base_url: String,
    pub hmac_secret: String,
    pub poll_interval: Duration,
    pub max_deliveries: u32,
    pub http_timeout: Duration,
    pub database_url: Option<String>,
}

impl RelayConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, falling back to defaults for
    /// missing or unparsable values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match lookup("LOG_FORMAT").as_deref() {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            api_base_url: lookup("RELAY_API_BASE_URL").unwrap_or(defaults.api_base_url),
            hmac_secret: lookup("RELAY_HMAC_SECRET")
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.hmac_secret),
            poll_interval: parsed("RELAY_POLL_INTERVAL_MS")
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            max_deliveries: parsed("RELAY_MAX_DELIVERIES")
                .and_then(|n| u32::try_from(n).ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_deliveries),
            http_timeout: parsed("RELAY_HTTP_TIMEOUT_MS")
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.http_timeout),
            database_url: lookup("DATABASE_URL").filter(|s| !s.is_empty()),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// True when no signing secret was configured.
    pub fn uses_default_secret(&self) -> bool {
        self.hmac_secret == DEV_SECRET
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            api_base_url: "http://localhost:5001".to_string(),
            hmac_secret: DEV_SECRET.to_string(),
            poll_interval: Duration::from_millis(1000),
            max_deliveries: messaging::DEFAULT_MAX_DELIVERIES,
            http_timeout: Duration::from_millis(10_000),
            database_url: None,
        }
    }
}
