//! Subscriber Fan-out
//!
//! The `BroadcastHub` owns the set of connected downstream subscribers.
//! Each subscriber gets its own bounded queue; the hub never awaits a
//! subscriber, so one slow or broken connection cannot hold up the rest.
//!
//! # Wire Messages
//!
//! A subscriber first receives the full table, tagged `initial`:
//!
//! ```json
//! {"type":"initial","data":{"AAPL":{"name":"AAPL","price":150.0,"lastUpdated":"..."}}}
//! ```
//!
//! followed by one message per price change:
//!
//! ```json
//! {"symbol":"TSLA","price":"700.12"}
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::application::ports::{PricePublisher, PriceStorePort};
use crate::domain::price::{PriceSnapshot, format_price, round_to_cents};
use crate::domain::registry::Instrument;
use crate::infrastructure::config::BroadcastSettings;
use crate::infrastructure::metrics;

// =============================================================================
// Broadcast Messages
// =============================================================================

/// Per-instrument entry of the initial snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteView {
    /// Instrument identifier.
    pub name: String,
    /// Last price rounded to cents, `0` if unknown.
    pub price: f64,
    /// Time of the last update, `null` if unknown.
    pub last_updated: Option<DateTime<Utc>>,
}

/// Full table sent once when a subscriber connects.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InitialSnapshot {
    #[serde(rename = "type")]
    kind: &'static str,
    /// Entries keyed by instrument identifier.
    pub data: BTreeMap<String, QuoteView>,
}

impl From<&PriceSnapshot> for InitialSnapshot {
    fn from(snapshot: &PriceSnapshot) -> Self {
        let data = snapshot
            .iter()
            .map(|(instrument, state)| {
                (
                    instrument.to_string(),
                    QuoteView {
                        name: instrument.to_string(),
                        price: round_to_cents(state.price),
                        last_updated: state.last_updated,
                    },
                )
            })
            .collect();

        Self {
            kind: "initial",
            data,
        }
    }
}

/// A single price change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceUpdate {
    /// Instrument identifier.
    pub symbol: String,
    /// Price formatted with two decimals.
    pub price: String,
}

impl PriceUpdate {
    /// Build an update for an instrument.
    #[must_use]
    pub fn new(instrument: &Instrument, price: f64) -> Self {
        Self {
            symbol: instrument.to_string(),
            price: format_price(price),
        }
    }
}

/// Message delivered to a subscriber.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SubscriberMessage {
    /// Full table, always the first message.
    Initial(InitialSnapshot),
    /// Incremental change.
    Update(PriceUpdate),
}

impl SubscriberMessage {
    /// Serialize to the JSON text frame sent on the wire.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// Broadcast Hub
// =============================================================================

/// Configuration for subscriber queues.
#[derive(Debug, Clone, Copy)]
pub struct BroadcastConfig {
    /// Messages buffered per subscriber before it is treated as broken.
    pub subscriber_queue_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            subscriber_queue_capacity: 256,
        }
    }
}

impl From<BroadcastSettings> for BroadcastConfig {
    fn from(settings: BroadcastSettings) -> Self {
        Self {
            subscriber_queue_capacity: settings.subscriber_queue_capacity,
        }
    }
}

/// Identifier assigned to a connected subscriber.
pub type SubscriberId = u64;

#[derive(Debug)]
struct SubscriberHandle {
    tx: mpsc::Sender<SubscriberMessage>,
    connected_at: DateTime<Utc>,
}

/// A registered subscriber's receiving end.
#[derive(Debug)]
pub struct Subscription {
    /// Subscriber identifier, used to disconnect.
    pub id: SubscriberId,
    /// When the subscriber connected.
    pub connected_at: DateTime<Utc>,
    /// Messages for this subscriber, starting with the initial snapshot.
    pub rx: mpsc::Receiver<SubscriberMessage>,
}

/// Outcome of one publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers the update was queued to.
    pub delivered: usize,
    /// Subscribers removed because delivery failed.
    pub dropped: usize,
}

/// Central hub for downstream subscribers.
pub struct BroadcastHub {
    store: Arc<dyn PriceStorePort>,
    subscribers: Mutex<HashMap<SubscriberId, SubscriberHandle>>,
    config: BroadcastConfig,
}

impl BroadcastHub {
    /// Create a hub reading initial snapshots from `store`.
    pub fn new(store: Arc<dyn PriceStorePort>, config: BroadcastConfig) -> Self {
        Self {
            store,
            subscribers: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Register a subscriber and queue the full snapshot as its first message.
    ///
    /// The snapshot is taken while the subscriber set is locked, so no
    /// update published concurrently can reach the subscriber before it.
    pub fn connect(&self) -> Subscription {
        let id = Uuid::new_v4().as_u64_pair().0;
        let connected_at = Utc::now();
        let (tx, rx) = mpsc::channel(self.config.subscriber_queue_capacity.max(1));

        let count = {
            let mut subscribers = self.subscribers.lock();
            let initial = InitialSnapshot::from(&self.store.snapshot());
            // Fresh channel with capacity >= 1 always has room.
            let _ = tx.try_send(SubscriberMessage::Initial(initial));
            subscribers.insert(id, SubscriberHandle { tx, connected_at });
            subscribers.len()
        };

        metrics::set_active_subscribers(count);
        tracing::info!(subscriber_id = id, subscribers = count, "Subscriber connected");

        Subscription {
            id,
            connected_at,
            rx,
        }
    }

    /// Remove a subscriber. Returns `false` if it was already gone.
    pub fn disconnect(&self, id: SubscriberId) -> bool {
        let (removed, count) = {
            let mut subscribers = self.subscribers.lock();
            let removed = subscribers.remove(&id);
            (removed, subscribers.len())
        };

        let Some(handle) = removed else {
            return false;
        };

        metrics::set_active_subscribers(count);
        let connected_secs = (Utc::now() - handle.connected_at).num_seconds();
        tracing::info!(
            subscriber_id = id,
            connected_secs,
            subscribers = count,
            "Subscriber disconnected"
        );
        true
    }

    /// Queue a price change to every subscriber.
    ///
    /// A subscriber whose queue is full or closed is removed; delivery to
    /// the others continues.
    pub fn broadcast(&self, instrument: &Instrument, price: f64) -> PublishReport {
        let message = SubscriberMessage::Update(PriceUpdate::new(instrument, price));
        let mut report = PublishReport::default();

        let count = {
            let mut subscribers = self.subscribers.lock();
            subscribers.retain(|id, handle| match handle.tx.try_send(message.clone()) {
                Ok(()) => {
                    report.delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(subscriber_id = *id, "Subscriber queue full, disconnecting");
                    report.dropped += 1;
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(subscriber_id = *id, "Subscriber gone, removing");
                    report.dropped += 1;
                    false
                }
            });
            subscribers.len()
        };

        metrics::record_updates_delivered(report.delivered as u64);
        if report.dropped > 0 {
            metrics::record_subscribers_dropped(report.dropped as u64);
            metrics::set_active_subscribers(count);
        }

        report
    }

    /// Number of connected subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl PricePublisher for BroadcastHub {
    fn publish(&self, instrument: &Instrument, price: f64) {
        self.broadcast(instrument, price);
    }
}

/// Shared broadcast hub reference.
pub type SharedBroadcastHub = Arc<BroadcastHub>;

// =============================================================================
// Tests
// =============================================================================
