//! Finnhub Feed Client
//!
//! Owns the single upstream connection and drives the feed state machine:
//!
//! - **Connecting**: start a best-effort snapshot fetch for every
//!   instrument, then open the socket.
//! - **Subscribing**: one subscribe request per instrument, registry order.
//! - **Streaming**: decode frames, forward ticks for registered
//!   instruments, answer heartbeats.
//! - **Backoff**: wait the fixed reconnect delay, then start over.
//!
//! The client never writes to the price store itself. Everything it
//! observes is sent as a [`FeedEvent`] to the relay task.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::FuturesUnordered;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::auth::{AccessToken, AuthError};
use super::codec::FeedCodec;
use super::heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatManager, HeartbeatState};
use super::messages::{FeedMessage, SubscribeRequest, TradeTick};
use super::reconnect::ReconnectPolicy;
use crate::application::ports::QuoteSource;
use crate::application::services::FeedEvent;
use crate::domain::feed::FeedPhase;
use crate::domain::price::PriceTick;
use crate::domain::registry::{Instrument, SymbolRegistry};
use crate::infrastructure::config::FeedSettings;
use crate::infrastructure::metrics::{self, FeedMessageKind};

// =============================================================================
// Error Type
// =============================================================================

/// Errors that can occur in the feed client.
#[derive(Debug, thiserror::Error)]
pub enum FeedClientError {
    /// The access token is unusable. Never retried.
    #[error("feed misconfigured: {0}")]
    Misconfigured(#[from] AuthError),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Outbound message could not be encoded.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),

    /// No inbound frame within the heartbeat timeout.
    #[error("heartbeat timeout")]
    HeartbeatTimeout,

    /// Connection closed by the server.
    #[error("connection closed")]
    ConnectionClosed,

    /// The relay task stopped listening.
    #[error("feed event channel closed")]
    ChannelClosed,
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the feed client.
#[derive(Debug, Clone)]
pub struct FeedClientConfig {
    /// WebSocket URL without the token.
    pub stream_url: String,
    /// Validated access token.
    pub token: AccessToken,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay: Duration,
    /// Heartbeat configuration.
    pub heartbeat: HeartbeatConfig,
}

impl FeedClientConfig {
    /// Create a configuration with default timings.
    #[must_use]
    pub fn new(stream_url: impl Into<String>, token: AccessToken) -> Self {
        Self {
            stream_url: stream_url.into(),
            token,
            reconnect_delay: ReconnectPolicy::default().delay(),
            heartbeat: HeartbeatConfig::default(),
        }
    }

    /// Create configuration from `FeedSettings` and the configured token.
    ///
    /// # Errors
    ///
    /// Returns `FeedClientError::Misconfigured` if the token is unusable.
    pub fn from_settings(
        settings: &FeedSettings,
        api_key: Option<&str>,
    ) -> Result<Self, FeedClientError> {
        let token = AccessToken::parse(api_key)?;
        Ok(Self {
            stream_url: settings.stream_url.clone(),
            token,
            reconnect_delay: settings.reconnect_delay,
            heartbeat: HeartbeatConfig::from_feed_settings(settings),
        })
    }

    /// Stream URL with the token appended as a query parameter.
    #[must_use]
    pub fn connect_url(&self) -> String {
        let separator = if self.stream_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{separator}token={}",
            self.stream_url,
            self.token.expose()
        )
    }
}

// =============================================================================
// Feed Client
// =============================================================================

/// Upstream feed client.
///
/// Manages the connection lifecycle including:
/// - Snapshot fetch on every connection cycle
/// - Per-instrument subscription handshake
/// - Heartbeat monitoring
/// - Fixed-delay reconnection, forever
pub struct FeedClient {
    config: FeedClientConfig,
    registry: Arc<SymbolRegistry>,
    quotes: Arc<dyn QuoteSource>,
    codec: FeedCodec,
    event_tx: mpsc::Sender<FeedEvent>,
    cancel: CancellationToken,
    phase: Mutex<FeedPhase>,
}

impl FeedClient {
    /// Create a new feed client.
    pub fn new(
        config: FeedClientConfig,
        registry: Arc<SymbolRegistry>,
        quotes: Arc<dyn QuoteSource>,
        event_tx: mpsc::Sender<FeedEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            registry,
            quotes,
            codec: FeedCodec::new(),
            event_tx,
            cancel,
            phase: Mutex::new(FeedPhase::Disconnected),
        }
    }

    /// Run the connection loop until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `FeedClientError::ChannelClosed` if the relay task is gone.
    /// Transport errors are never returned; they lead to a reconnect.
    pub async fn run(self: Arc<Self>) -> Result<(), FeedClientError> {
        let mut policy = ReconnectPolicy::new(self.config.reconnect_delay);
        let mut snapshot_task: Option<JoinHandle<()>> = None;

        tracing::info!(
            url = %self.config.stream_url,
            token_prefix = %self.config.token.prefix(),
            instruments = self.registry.len(),
            "Starting upstream feed client"
        );

        let result = loop {
            if self.cancel.is_cancelled() {
                break Ok(());
            }
            if self.event_tx.is_closed() {
                break Err(FeedClientError::ChannelClosed);
            }

            self.enter(FeedPhase::Connecting).await;

            if let Some(previous) = snapshot_task.take() {
                previous.abort();
            }
            snapshot_task = Some(self.spawn_snapshot_fetch());

            match self.connect_and_stream(&mut policy).await {
                Ok(()) => break Ok(()),
                Err(FeedClientError::ChannelClosed) => break Err(FeedClientError::ChannelClosed),
                Err(e) => {
                    tracing::warn!(error = %e, "Upstream feed connection error");
                    self.emit(FeedEvent::Error(e.to_string())).await;
                    self.enter(FeedPhase::Backoff).await;

                    let delay = policy.next_delay();
                    let attempt = policy.attempt_count();
                    self.emit(FeedEvent::ReconnectScheduled { attempt, delay })
                        .await;

                    tokio::select! {
                        () = self.cancel.cancelled() => {
                            tracing::info!("Feed client cancelled during reconnect delay");
                            break Ok(());
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        };

        if let Some(task) = snapshot_task {
            task.abort();
        }
        self.enter(FeedPhase::Disconnected).await;
        tracing::info!("Upstream feed client stopped");
        result
    }

    /// Connect, subscribe, and stream until error or cancellation.
    async fn connect_and_stream(
        &self,
        policy: &mut ReconnectPolicy,
    ) -> Result<(), FeedClientError> {
        tracing::info!(url = %self.config.stream_url, "Connecting to upstream feed");

        let connect_url = self.config.connect_url();
        let (ws_stream, _response) = tokio::select! {
            () = self.cancel.cancelled() => return Ok(()),
            result = tokio_tungstenite::connect_async(connect_url.as_str()) => result?,
        };

        let (mut write, mut read) = ws_stream.split();

        self.enter(FeedPhase::Subscribing).await;
        for instrument in self.registry.instruments() {
            let json = SubscribeRequest::new(instrument.as_str()).to_json()?;
            write.send(Message::Text(json.into())).await?;
            tracing::debug!(instrument = %instrument, "Subscribed");
        }

        self.enter(FeedPhase::Streaming).await;
        policy.reset();
        tracing::info!(
            instruments = self.registry.len(),
            "Upstream feed streaming"
        );

        // Set up heartbeat; the guard stops it whichever way we return.
        let heartbeat_state = Arc::new(HeartbeatState::new());
        let (heartbeat_tx, mut heartbeat_rx) = mpsc::channel::<HeartbeatEvent>(10);
        let heartbeat_cancel = self.cancel.child_token();
        let _heartbeat_guard = heartbeat_cancel.clone().drop_guard();
        let heartbeat_manager = HeartbeatManager::new(
            self.config.heartbeat,
            Arc::clone(&heartbeat_state),
            heartbeat_tx,
            heartbeat_cancel,
        );
        tokio::spawn(heartbeat_manager.run());

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                Some(heartbeat_event) = heartbeat_rx.recv() => {
                    match heartbeat_event {
                        HeartbeatEvent::SendPing => {
                            write.send(Message::Ping(Vec::new().into())).await?;
                        }
                        HeartbeatEvent::Timeout => {
                            return Err(FeedClientError::HeartbeatTimeout);
                        }
                    }
                }
                msg = read.next() => {
                    let Some(msg) = msg else {
                        tracing::info!("Upstream stream ended");
                        return Err(FeedClientError::ConnectionClosed);
                    };
                    let msg = msg?;
                    heartbeat_state.record_activity();

                    match msg {
                        Message::Text(text) => self.handle_text(text.as_str()).await?,
                        Message::Ping(data) => write.send(Message::Pong(data)).await?,
                        Message::Close(frame) => {
                            tracing::info!(frame = ?frame, "Upstream sent close frame");
                            return Err(FeedClientError::ConnectionClosed);
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    /// Handle a text frame. Only a closed event channel is an error.
    async fn handle_text(&self, text: &str) -> Result<(), FeedClientError> {
        let message = match self.codec.decode(text) {
            Ok(message) => message,
            Err(e) => {
                metrics::record_parse_error();
                tracing::warn!(error = %e, "Discarding malformed feed message");
                return Ok(());
            }
        };

        match message {
            FeedMessage::Ping => {
                metrics::record_feed_message(FeedMessageKind::Ping);
            }
            FeedMessage::Trade { data } => {
                metrics::record_feed_message(FeedMessageKind::Trade);
                for tick in registered_ticks(&self.registry, data) {
                    self.event_tx
                        .send(FeedEvent::Price(tick))
                        .await
                        .map_err(|_| FeedClientError::ChannelClosed)?;
                }
            }
            FeedMessage::Error { msg } => {
                metrics::record_feed_message(FeedMessageKind::Error);
                tracing::warn!(error = %msg, "Upstream feed reported an error");
                self.emit(FeedEvent::Error(msg)).await;
            }
            FeedMessage::Unknown => {
                metrics::record_feed_message(FeedMessageKind::Other);
                tracing::debug!("Ignoring unknown feed message type");
            }
        }

        Ok(())
    }

    /// Fetch one quote per instrument concurrently, forwarding each as it
    /// completes.
    fn spawn_snapshot_fetch(&self) -> JoinHandle<()> {
        let quotes = Arc::clone(&self.quotes);
        let instruments = self.registry.instruments().to_vec();
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            let mut pending: FuturesUnordered<_> = instruments
                .into_iter()
                .map(|instrument| {
                    let quotes = Arc::clone(&quotes);
                    async move {
                        let result = quotes.latest_price(&instrument).await;
                        (instrument, result)
                    }
                })
                .collect();

            while let Some((instrument, result)) = pending.next().await {
                match result {
                    Ok(Some(price)) => {
                        tracing::info!(instrument = %instrument, price, "Snapshot price");
                        let tick = PriceTick::snapshot(instrument, price);
                        if event_tx.send(FeedEvent::Price(tick)).await.is_err() {
                            return;
                        }
                    }
                    Ok(None) => {
                        tracing::debug!(instrument = %instrument, "No snapshot price available");
                    }
                    Err(e) => {
                        metrics::record_snapshot_fetch_failure();
                        tracing::warn!(instrument = %instrument, error = %e, "Snapshot fetch failed");
                    }
                }
            }
        })
    }

    /// Move to `next` and report it, skipping no-op transitions.
    async fn enter(&self, next: FeedPhase) {
        let previous = std::mem::replace(&mut *self.phase.lock(), next);
        if previous != next {
            self.emit(FeedEvent::PhaseChanged(next)).await;
        }
    }

    async fn emit(&self, event: FeedEvent) {
        if self.event_tx.send(event).await.is_err() {
            tracing::debug!("Feed event channel closed");
        }
    }
}

/// Keep trades for registered instruments, in order.
fn registered_ticks(registry: &SymbolRegistry, trades: Vec<TradeTick>) -> Vec<PriceTick> {
    let total = trades.len();
    let ticks: Vec<PriceTick> = trades
        .into_iter()
        .filter_map(|trade| {
            registry
                .resolve(&trade.symbol)
                .map(|instrument: &Instrument| PriceTick::stream(instrument.clone(), trade.price))
        })
        .collect();

    let discarded = total - ticks.len();
    if discarded > 0 {
        metrics::record_ticks_discarded(discarded as u64);
        tracing::trace!(discarded, "Discarded ticks for unregistered instruments");
    }
    ticks
}
