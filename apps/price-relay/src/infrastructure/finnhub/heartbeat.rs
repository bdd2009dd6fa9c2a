//! Heartbeat Manager
//!
//! Monitors streaming socket liveness. The manager asks the connection task
//! to send a WebSocket ping every interval; any inbound frame counts as
//! proof of life. If nothing arrives within the timeout the connection is
//! treated as failed.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Shortest ping interval the manager will run with.
const MIN_PING_INTERVAL: Duration = Duration::from_millis(10);

use crate::infrastructure::config::FeedSettings;

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatConfig {
    /// Interval between ping frames.
    pub ping_interval: Duration,
    /// Silence tolerated before the connection is considered dead.
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            timeout: Duration::from_secs(60),
        }
    }
}

impl HeartbeatConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(ping_interval: Duration, timeout: Duration) -> Self {
        Self {
            ping_interval,
            timeout,
        }
    }

    /// Create configuration from `FeedSettings`.
    #[must_use]
    pub const fn from_feed_settings(settings: &FeedSettings) -> Self {
        Self {
            ping_interval: settings.heartbeat_interval,
            timeout: settings.heartbeat_timeout,
        }
    }
}

/// Events emitted by the heartbeat manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatEvent {
    /// Send a ping frame.
    SendPing,
    /// No frame within the timeout; restart the connection.
    Timeout,
}

/// Last-activity timestamp shared with the connection task.
#[derive(Debug)]
pub struct HeartbeatState {
    last_activity: RwLock<Instant>,
}

impl Default for HeartbeatState {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartbeatState {
    /// Create state marked active now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_activity: RwLock::new(Instant::now()),
        }
    }

    /// Record an inbound frame.
    pub fn record_activity(&self) {
        *self.last_activity.write() = Instant::now();
    }

    /// Time since the last inbound frame.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_activity.read().elapsed()
    }
}

/// Heartbeat manager that monitors connection liveness.
pub struct HeartbeatManager {
    config: HeartbeatConfig,
    state: Arc<HeartbeatState>,
    event_tx: mpsc::Sender<HeartbeatEvent>,
    cancel: CancellationToken,
}

impl HeartbeatManager {
    /// Create a new heartbeat manager.
    #[must_use]
    pub const fn new(
        config: HeartbeatConfig,
        state: Arc<HeartbeatState>,
        event_tx: mpsc::Sender<HeartbeatEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            state,
            event_tx,
            cancel,
        }
    }

    /// Run until cancelled, the event channel closes, or a timeout fires.
    pub async fn run(self) {
        let period = self.config.ping_interval.max(MIN_PING_INTERVAL);
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Heartbeat manager cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if !self.check_and_ping().await {
                        break;
                    }
                }
            }
        }
    }

    /// Returns `false` when the loop should exit.
    async fn check_and_ping(&self) -> bool {
        let idle = self.state.idle_for();
        if idle > self.config.timeout {
            tracing::warn!(
                idle_secs = idle.as_secs(),
                timeout_secs = self.config.timeout.as_secs(),
                "Heartbeat timeout detected"
            );
            let _ = self.event_tx.send(HeartbeatEvent::Timeout).await;
            return false;
        }

        if self.event_tx.send(HeartbeatEvent::SendPing).await.is_err() {
            tracing::debug!("Event channel closed, stopping heartbeat");
            return false;
        }

        true
    }
}
