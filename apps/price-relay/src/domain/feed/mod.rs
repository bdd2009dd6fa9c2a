//! Upstream Feed State
//!
//! The feed session is an explicit state machine owned by a single
//! supervising task:
//!
//! ```text
//! DISCONNECTED -> CONNECTING -> SUBSCRIBING -> STREAMING
//!                     ^                            |
//!                     |        (error / close)     v
//!                     +-------------------------BACKOFF
//! ```
//!
//! `DISABLED` is terminal and only reachable from `DISCONNECTED`, when the
//! feed cannot start at all (e.g. no usable access token).

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

// =============================================================================
// FeedPhase
// =============================================================================

/// Phase of the upstream feed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedPhase {
    /// No session and none in progress.
    #[default]
    Disconnected,
    /// Snapshot fetch started, transport connecting.
    Connecting,
    /// Transport ready, sending subscriptions.
    Subscribing,
    /// Subscriptions sent, processing inbound messages.
    Streaming,
    /// Waiting out the reconnect delay.
    Backoff,
    /// Permanently stopped due to misconfiguration.
    Disabled,
}

impl FeedPhase {
    /// Phase name for logs and health output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Subscribing => "subscribing",
            Self::Streaming => "streaming",
            Self::Backoff => "backoff",
            Self::Disabled => "disabled",
        }
    }

    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// Any live phase may drop back to `Disconnected` on shutdown.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Disconnected | Self::Backoff, Self::Connecting)
                | (Self::Disconnected, Self::Disabled)
                | (Self::Connecting, Self::Subscribing)
                | (Self::Connecting | Self::Subscribing | Self::Streaming, Self::Backoff)
                | (Self::Subscribing, Self::Streaming)
                | (
                    Self::Connecting | Self::Subscribing | Self::Streaming | Self::Backoff,
                    Self::Disconnected
                )
        )
    }

    /// Whether price updates are currently flowing from the stream.
    #[must_use]
    pub const fn is_streaming(self) -> bool {
        matches!(self, Self::Streaming)
    }
}

// =============================================================================
// FeedStatus
// =============================================================================

/// Observable status of the upstream feed, updated by the relay task and
/// read by the health endpoint.
#[derive(Debug, Default)]
pub struct FeedStatus {
    phase: RwLock<FeedPhase>,
    last_connected_at: RwLock<Option<DateTime<Utc>>>,
    last_error: RwLock<Option<String>>,
    reconnect_attempts: AtomicU32,
    ticks_received: AtomicU64,
}

impl FeedStatus {
    /// Create status in the `Disconnected` phase.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a phase change.
    ///
    /// Reaching `Streaming` clears the error and resets the attempt counter.
    pub fn set_phase(&self, phase: FeedPhase) {
        *self.phase.write() = phase;
        if phase == FeedPhase::Streaming {
            *self.last_connected_at.write() = Some(Utc::now());
            *self.last_error.write() = None;
            self.reconnect_attempts.store(0, Ordering::Relaxed);
        }
    }

    /// Record a reconnect attempt number.
    pub fn set_reconnect_attempt(&self, attempt: u32) {
        self.reconnect_attempts.store(attempt, Ordering::Relaxed);
    }

    /// Record the most recent error without changing phase.
    pub fn set_error(&self, message: impl Into<String>) {
        *self.last_error.write() = Some(message.into());
    }

    /// Mark the feed permanently disabled.
    pub fn disable(&self, reason: impl Into<String>) {
        *self.phase.write() = FeedPhase::Disabled;
        *self.last_error.write() = Some(reason.into());
    }

    /// Count one applied tick.
    pub fn increment_ticks(&self) {
        self.ticks_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> FeedPhase {
        *self.phase.read()
    }

    /// Last time the feed reached `Streaming`.
    #[must_use]
    pub fn last_connected_at(&self) -> Option<DateTime<Utc>> {
        *self.last_connected_at.read()
    }

    /// Most recent error, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Consecutive reconnect attempts since the last successful session.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }

    /// Total ticks applied.
    #[must_use]
    pub fn ticks_received(&self) -> u64 {
        self.ticks_received.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(FeedPhase::Disconnected, FeedPhase::Connecting, true)]
    #[test_case(FeedPhase::Connecting, FeedPhase::Subscribing, true)]
    #[test_case(FeedPhase::Subscribing, FeedPhase::Streaming, true)]
    #[test_case(FeedPhase::Streaming, FeedPhase::Backoff, true)]
    #[test_case(FeedPhase::Connecting, FeedPhase::Backoff, true)]
    #[test_case(FeedPhase::Backoff, FeedPhase::Connecting, true)]
    #[test_case(FeedPhase::Disconnected, FeedPhase::Disabled, true)]
    #[test_case(FeedPhase::Streaming, FeedPhase::Disconnected, true)]
    #[test_case(FeedPhase::Disconnected, FeedPhase::Streaming, false)]
    #[test_case(FeedPhase::Backoff, FeedPhase::Streaming, false)]
    #[test_case(FeedPhase::Streaming, FeedPhase::Connecting, false)]
    #[test_case(FeedPhase::Disabled, FeedPhase::Connecting, false)]
    #[test_case(FeedPhase::Streaming, FeedPhase::Disabled, false)]
    fn transitions(from: FeedPhase, to: FeedPhase, allowed: bool) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn streaming_resets_attempts_and_error() {
        let status = FeedStatus::new();
        status.set_reconnect_attempt(3);
        status.set_error("connection refused");

        status.set_phase(FeedPhase::Streaming);

        assert_eq!(status.reconnect_attempts(), 0);
        assert!(status.last_error().is_none());
        assert!(status.last_connected_at().is_some());
    }

    #[test]
    fn disable_records_reason() {
        let status = FeedStatus::new();
        status.disable("missing token");
        assert_eq!(status.phase(), FeedPhase::Disabled);
        assert_eq!(status.last_error().as_deref(), Some("missing token"));
    }

    #[test]
    fn phase_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&FeedPhase::Backoff).unwrap(),
            "\"backoff\""
        );
    }
}
