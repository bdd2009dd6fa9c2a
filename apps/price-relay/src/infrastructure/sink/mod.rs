//! Event Sink Adapters
//!
//! The relay hands the full price table to the sink after every change and
//! never waits on it. Two adapters:
//!
//! - `NoopEventSink`: used when no sink is configured.
//! - `QueuedEventSink` + `WebhookForwarder`: a bounded queue drained by a
//!   background task that POSTs each snapshot as JSON. When the queue is
//!   full the newest snapshot is dropped and counted.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::application::ports::EventSink;
use crate::domain::price::PriceSnapshot;
use crate::infrastructure::metrics;

/// Sink that discards every snapshot.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn notify(&self, _snapshot: PriceSnapshot) {}
}

/// Non-blocking sink backed by a bounded queue.
#[derive(Debug, Clone)]
pub struct QueuedEventSink {
    tx: mpsc::Sender<PriceSnapshot>,
}

impl QueuedEventSink {
    /// Create a sink and the receiver that drains it.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<PriceSnapshot>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl EventSink for QueuedEventSink {
    fn notify(&self, snapshot: PriceSnapshot) {
        match self.tx.try_send(snapshot) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                metrics::record_sink_dropped();
                tracing::warn!("Event sink queue full, dropping snapshot");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!("Event sink stopped, dropping snapshot");
            }
        }
    }
}

/// Errors from the webhook forwarder.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// HTTP client could not be built or the request failed.
    #[error("sink request failed: {0}")]
    Request(String),

    /// Non-success HTTP status.
    #[error("sink returned status {0}")]
    Status(u16),
}

/// Background task POSTing queued snapshots to a webhook.
#[derive(Debug)]
pub struct WebhookForwarder {
    client: reqwest::Client,
    url: String,
}

impl WebhookForwarder {
    /// Create a forwarder for `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SinkError::Request(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// POST one snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the status is not 2xx.
    pub async fn forward(&self, snapshot: &PriceSnapshot) -> Result<(), SinkError> {
        let response = self
            .client
            .post(&self.url)
            .json(snapshot)
            .send()
            .await
            .map_err(|e| SinkError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Status(status.as_u16()));
        }
        Ok(())
    }

    /// Drain the queue until cancelled or all senders are gone.
    pub async fn run(self, mut rx: mpsc::Receiver<PriceSnapshot>, cancel: CancellationToken) {
        tracing::info!(url = %self.url, "Event sink forwarder started");

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                snapshot = rx.recv() => {
                    let Some(snapshot) = snapshot else { break };
                    if let Err(e) = self.forward(&snapshot).await {
                        metrics::record_sink_failure();
                        tracing::warn!(error = %e, "Event sink delivery failed");
                    }
                }
            }
        }

        tracing::info!("Event sink forwarder stopped");
    }
}
