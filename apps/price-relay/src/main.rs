//! Price Relay Binary
//!
//! Starts the live price relay.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin price-relay
//! ```
//!
//! # Environment Variables
//!
//! ## Required for live data
//! - `FINNHUB_API_KEY`: Finnhub access token (feed is disabled without it)
//!
//! ## Optional
//! - `RELAY_SYMBOLS`: Comma-separated instruments (default: AAPL,TSLA,NVDA,MSFT,AMZN,GOOGL,META,BINANCE:ETHUSDT)
//! - `FINNHUB_STREAM_URL`: Stream endpoint (default: wss://ws.finnhub.io)
//! - `FINNHUB_QUOTE_URL`: Quote API base (default: <https://finnhub.io/api/v1>)
//! - `RELAY_WS_PORT`: Subscriber WebSocket port (default: 3001)
//! - `RELAY_HEALTH_PORT`: Health check HTTP port (default: 8082)
//! - `RELAY_RECONNECT_DELAY_SECS`: Fixed reconnect delay (default: 15)
//! - `RELAY_EVENT_SINK_URL`: Webhook receiving price snapshots (default: none)
//! - `OTEL_ENABLED`: Export traces over OTLP (default: false)
//! - `RUST_LOG`: Log level (default: `price_relay=info`)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use price_relay::infrastructure::telemetry;
use price_relay::{
    BroadcastConfig, BroadcastHub, EventSink, FeedClient, FeedClientConfig, FeedEvent, FeedStatus,
    FinnhubQuoteClient, HealthServer, HealthServerState, InMemoryPriceStore, NoopEventSink,
    PricePublisher, PriceRelay, PriceStorePort, QueuedEventSink, RelayConfig, RelayServer,
    WebhookForwarder, init_metrics,
};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    #[allow(clippy::expect_used)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();

    // Initialize logging (and OpenTelemetry when enabled)
    let _telemetry_guard = telemetry::init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting price relay");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = RelayConfig::from_env().context("failed to load configuration")?;
    let registry = Arc::new(config.registry().context("invalid instrument list")?);
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Canonical price store, seeded with every registered instrument
    let store: Arc<dyn PriceStorePort> = Arc::new(InMemoryPriceStore::new(&registry));

    // Subscriber fan-out
    let broadcast_hub = Arc::new(BroadcastHub::new(
        Arc::clone(&store),
        BroadcastConfig::from(config.broadcast),
    ));

    let event_sink = build_event_sink(&config, &shutdown_token)?;
    let feed_status = Arc::new(FeedStatus::new());

    // Relay task: the only writer of the price store
    let (event_tx, event_rx) =
        mpsc::channel::<FeedEvent>(config.broadcast.feed_event_capacity.max(1));
    let relay = PriceRelay::new(
        store,
        Arc::clone(&broadcast_hub) as Arc<dyn PricePublisher>,
        event_sink,
        Arc::clone(&feed_status),
    );
    let relay_cancel = shutdown_token.clone();
    let relay_handle = tokio::spawn(async move {
        relay.run(event_rx, relay_cancel).await;
    });

    // Upstream feed client, unless misconfigured
    match FeedClientConfig::from_settings(&config.feed, config.api_key.as_deref()) {
        Ok(feed_config) => {
            tracing::info!(
                token_prefix = %feed_config.token.prefix(),
                "Upstream access token accepted"
            );
            let quotes = FinnhubQuoteClient::new(
                config.feed.quote_url.clone(),
                feed_config.token.clone(),
                config.feed.http_timeout,
            )
            .context("failed to build quote client")?;

            let feed_client = Arc::new(FeedClient::new(
                feed_config,
                Arc::clone(&registry),
                Arc::new(quotes),
                event_tx,
                shutdown_token.clone(),
            ));
            tokio::spawn(async move {
                if let Err(e) = feed_client.run().await {
                    tracing::error!(error = %e, "Feed client error");
                }
            });
        }
        Err(e) => {
            tracing::error!(error = %e, "Upstream feed disabled; serving sentinel prices only");
            feed_status.disable(e.to_string());
            drop(event_tx);
        }
    }

    // Downstream subscriber server
    let relay_server = RelayServer::new(
        config.server.ws_port,
        Arc::clone(&broadcast_hub),
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = relay_server.run().await {
            tracing::error!(error = %e, "Relay server error");
        }
    });

    // Health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&feed_status),
        Arc::clone(&broadcast_hub),
        Arc::clone(&registry),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    tracing::info!("Price relay ready");

    await_shutdown(shutdown_token).await;

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, relay_handle)
        .await
        .is_err()
    {
        tracing::warn!("Relay task did not stop within the shutdown timeout");
    }

    tracing::info!("Price relay stopped");
    Ok(())
}

/// Build the event sink: a webhook forwarder when configured, else a no-op.
fn build_event_sink(
    config: &RelayConfig,
    cancel: &CancellationToken,
) -> anyhow::Result<Arc<dyn EventSink>> {
    let Some(url) = config.sink.url.as_deref() else {
        tracing::info!("Event sink disabled");
        return Ok(Arc::new(NoopEventSink));
    };

    let forwarder = WebhookForwarder::new(url, config.feed.http_timeout)
        .context("failed to build event sink client")?;
    let (sink, rx) = QueuedEventSink::new(config.sink.queue_capacity);
    tokio::spawn(forwarder.run(rx, cancel.clone()));

    Ok(Arc::new(sink))
}

/// Log the parsed configuration.
fn log_config(config: &RelayConfig) {
    tracing::info!(
        instruments = config.symbols.len(),
        ws_port = config.server.ws_port,
        health_port = config.server.health_port,
        reconnect_delay_secs = config.feed.reconnect_delay.as_secs(),
        sink_enabled = config.sink.url.is_some(),
        "Configuration loaded"
    );
    tracing::debug!(
        stream_url = %config.feed.stream_url,
        quote_url = %config.feed.quote_url,
        symbols = ?config.symbols,
        "Upstream endpoints"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
