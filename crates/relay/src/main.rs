//! Relay entry point.

use std::sync::Arc;

use relay::{
    HmacSigner, HttpApiClient, LogFormat, RelayConfig, RelayError, RelayStores, spawn_relays,
};
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &RelayConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), RelayError> {
    // 1. Load configuration and initialize tracing
    let config = RelayConfig::from_env();
    init_tracing(&config);
    if config.uses_default_secret() {
        tracing::warn!("RELAY_HMAC_SECRET is not set, signing with the development secret");
    }

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 3. Open the stores
    let stores = match &config.database_url {
        Some(url) => {
            let pool = sqlx::PgPool::connect(url).await?;
            tracing::info!("using PostgreSQL queues");
            RelayStores::postgres(pool, config.max_deliveries).await?
        }
        None => {
            tracing::warn!("DATABASE_URL is not set, using in-memory queues");
            RelayStores::in_memory(config.max_deliveries)
        }
    };

    // 4. Start the pollers
    let client = Arc::new(HttpApiClient::new(&config.api_base_url, config.http_timeout));
    let signer = HmacSigner::new(&config.hmac_secret)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pollers = spawn_relays(&stores, client, signer, config.poll_interval, shutdown_rx);

    // 5. Start server
    let app = relay::create_app(metrics_handle);
    let addr = config.addr();
    tracing::info!(%addr, api = %config.api_base_url, "starting relay");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 6. Stop the pollers
    let _ = shutdown_tx.send(true);
    for poller in pollers {
        if let Err(e) = poller.await {
            tracing::error!(error = %e, "poller task failed");
        }
    }

    tracing::info!("relay shut down gracefully");
    Ok(())
}
