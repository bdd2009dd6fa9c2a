//! Prometheus Metrics Module
//!
//! Exposes relay metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Feed**: Upstream messages by kind, parse errors, reconnects
//! - **Prices**: Ticks applied and discarded, snapshot fetch failures
//! - **Fan-out**: Updates delivered, subscribers dropped, active subscribers
//! - **Sink**: Snapshots dropped on a full queue, webhook failures
//! - **Latency**: Tick processing from feed to fan-out
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::price::TickSource;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
#[allow(clippy::expect_used)]
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Feed
    describe_counter!(
        "price_relay_feed_messages_total",
        "Total messages received from the upstream feed by kind"
    );
    describe_counter!(
        "price_relay_parse_errors_total",
        "Total upstream messages discarded as malformed"
    );
    describe_counter!(
        "price_relay_reconnects_total",
        "Total upstream reconnect attempts"
    );

    // Prices
    describe_counter!(
        "price_relay_ticks_applied_total",
        "Total price ticks written to the store by source"
    );
    describe_counter!(
        "price_relay_ticks_discarded_total",
        "Total streamed ticks for unregistered instruments"
    );
    describe_counter!(
        "price_relay_snapshot_fetch_failures_total",
        "Total snapshot quote fetches that failed"
    );

    // Fan-out
    describe_counter!(
        "price_relay_updates_delivered_total",
        "Total price updates queued to subscribers"
    );
    describe_counter!(
        "price_relay_subscribers_dropped_total",
        "Total subscribers removed after a failed delivery"
    );
    describe_gauge!(
        "price_relay_active_subscribers",
        "Number of connected downstream subscribers"
    );

    // Sink
    describe_counter!(
        "price_relay_sink_dropped_total",
        "Total snapshots dropped because the event sink queue was full"
    );
    describe_counter!(
        "price_relay_sink_failures_total",
        "Total event sink webhook calls that failed"
    );

    // Latency
    describe_histogram!(
        "price_relay_tick_processing_seconds",
        "Time from tick receipt to fan-out"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric labels for upstream message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedMessageKind {
    /// Keep-alive ping.
    Ping,
    /// Trade batch.
    Trade,
    /// Upstream error report.
    Error,
    /// Any other message type.
    Other,
}

impl FeedMessageKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Trade => "trade",
            Self::Error => "error",
            Self::Other => "other",
        }
    }
}

/// Record a message received from the upstream feed.
pub fn record_feed_message(kind: FeedMessageKind) {
    counter!("price_relay_feed_messages_total", "kind" => kind.as_str()).increment(1);
}

/// Record a malformed upstream message.
pub fn record_parse_error() {
    counter!("price_relay_parse_errors_total").increment(1);
}

/// Record an upstream reconnect attempt.
pub fn record_reconnect() {
    counter!("price_relay_reconnects_total").increment(1);
}

/// Record a tick written to the store.
pub fn record_tick_applied(source: TickSource) {
    counter!("price_relay_ticks_applied_total", "source" => source.as_str()).increment(1);
}

/// Record ticks discarded for unregistered instruments.
pub fn record_ticks_discarded(count: u64) {
    counter!("price_relay_ticks_discarded_total").increment(count);
}

/// Record a failed snapshot fetch.
pub fn record_snapshot_fetch_failure() {
    counter!("price_relay_snapshot_fetch_failures_total").increment(1);
}

/// Record updates queued to subscribers.
pub fn record_updates_delivered(count: u64) {
    counter!("price_relay_updates_delivered_total").increment(count);
}

/// Record subscribers removed after a failed delivery.
pub fn record_subscribers_dropped(count: u64) {
    counter!("price_relay_subscribers_dropped_total").increment(count);
}

/// Update the active subscriber count.
#[allow(clippy::cast_precision_loss)]
pub fn set_active_subscribers(count: usize) {
    gauge!("price_relay_active_subscribers").set(count as f64);
}

/// Record a snapshot dropped by the event sink.
pub fn record_sink_dropped() {
    counter!("price_relay_sink_dropped_total").increment(1);
}

/// Record a failed webhook call.
pub fn record_sink_failure() {
    counter!("price_relay_sink_failures_total").increment(1);
}

/// Record tick processing duration.
pub fn record_processing_duration(source: TickSource, duration: Duration) {
    histogram!("price_relay_tick_processing_seconds", "source" => source.as_str())
        .record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================
