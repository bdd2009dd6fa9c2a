//! Application Services
//!
//! `PriceRelay` is the single writer of the price store. Every event coming
//! out of the upstream feed client passes through its channel, so store
//! writes happen in arrival order and each write is followed by fan-out to
//! subscribers and a notification to the event sink.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{EventSink, PricePublisher, PriceStorePort};
use crate::domain::feed::{FeedPhase, FeedStatus};
use crate::domain::price::PriceTick;
use crate::infrastructure::metrics;

/// Events emitted by the upstream feed client.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// The feed session entered a new phase.
    PhaseChanged(FeedPhase),
    /// A reconnect will be attempted after `delay`.
    ReconnectScheduled {
        /// Attempt number since the last successful session.
        attempt: u32,
        /// Delay before the attempt.
        delay: Duration,
    },
    /// A price observation for a registered instrument.
    Price(PriceTick),
    /// A non-fatal feed error.
    Error(String),
}

/// Applies feed events to the store and fans out every price change.
pub struct PriceRelay {
    store: Arc<dyn PriceStorePort>,
    publisher: Arc<dyn PricePublisher>,
    sink: Arc<dyn EventSink>,
    status: Arc<FeedStatus>,
}

impl PriceRelay {
    /// Create a relay over the given store and downstream ports.
    pub fn new(
        store: Arc<dyn PriceStorePort>,
        publisher: Arc<dyn PricePublisher>,
        sink: Arc<dyn EventSink>,
        status: Arc<FeedStatus>,
    ) -> Self {
        Self {
            store,
            publisher,
            sink,
            status,
        }
    }

    /// Write a tick to the store, then publish it and notify the sink.
    ///
    /// Returns `false` when the instrument is not registered; nothing is
    /// published in that case.
    pub fn apply(&self, tick: &PriceTick) -> bool {
        let started = Instant::now();

        if !self.store.set(&tick.instrument, tick.price) {
            tracing::debug!(instrument = %tick.instrument, "Discarding tick for unregistered instrument");
            metrics::record_ticks_discarded(1);
            return false;
        }

        self.publisher.publish(&tick.instrument, tick.price);
        self.sink.notify(self.store.snapshot());

        self.status.increment_ticks();
        metrics::record_tick_applied(tick.source);
        metrics::record_processing_duration(tick.source, started.elapsed());

        tracing::trace!(
            instrument = %tick.instrument,
            price = tick.price,
            source = tick.source.as_str(),
            "Price applied"
        );
        true
    }

    /// Handle a single feed event.
    pub fn handle(&self, event: FeedEvent) {
        match event {
            FeedEvent::PhaseChanged(phase) => {
                let previous = self.status.phase();
                if !previous.can_transition_to(phase) {
                    tracing::warn!(
                        from = previous.as_str(),
                        to = phase.as_str(),
                        "Unexpected feed phase transition"
                    );
                }
                self.status.set_phase(phase);
                tracing::info!(phase = phase.as_str(), "Feed phase changed");
            }
            FeedEvent::ReconnectScheduled { attempt, delay } => {
                self.status.set_reconnect_attempt(attempt);
                metrics::record_reconnect();
                tracing::info!(
                    attempt,
                    delay_secs = delay.as_secs_f64(),
                    "Feed reconnect scheduled"
                );
            }
            FeedEvent::Price(tick) => {
                self.apply(&tick);
            }
            FeedEvent::Error(message) => {
                tracing::warn!(error = %message, "Feed error");
                self.status.set_error(message);
            }
        }
    }

    /// Process events until the channel closes or `cancel` fires.
    pub async fn run(&self, mut events: mpsc::Receiver<FeedEvent>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("Price relay stopping");
                    break;
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        tracing::info!("Feed event channel closed");
                        break;
                    };
                    self.handle(event);
                }
            }
        }
    }
}
