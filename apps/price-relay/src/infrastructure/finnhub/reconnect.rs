//! Reconnection Policy
//!
//! Fixed-delay reconnection for the streaming socket. The delay never grows
//! and retries never stop; only process shutdown ends the cycle.

use std::time::Duration;

/// Reconnection policy with a constant delay between attempts.
///
/// # Example
///
/// ```rust
/// use price_relay::infrastructure::finnhub::reconnect::ReconnectPolicy;
/// use std::time::Duration;
///
/// let mut policy = ReconnectPolicy::new(Duration::from_secs(15));
/// assert_eq!(policy.next_delay(), Duration::from_secs(15));
/// assert_eq!(policy.attempt_count(), 1);
///
/// // Successful session
/// policy.reset();
/// assert_eq!(policy.attempt_count(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    delay: Duration,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a policy with the given delay.
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self {
            delay,
            attempt_count: 0,
        }
    }

    /// Record an attempt and return the delay to wait before it.
    pub const fn next_delay(&mut self) -> Duration {
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.delay
    }

    /// Reset the attempt counter after a successful session.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Attempts since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Configured delay.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(15))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_delay_is_fifteen_seconds() {
        assert_eq!(ReconnectPolicy::default().delay(), Duration::from_secs(15));
    }

    #[test]
    fn delay_never_grows() {
        let mut policy = ReconnectPolicy::new(Duration::from_millis(250));
        for attempt in 1..=50 {
            assert_eq!(policy.next_delay(), Duration::from_millis(250));
            assert_eq!(policy.attempt_count(), attempt);
        }
    }

    #[test]
    fn reset_clears_attempts() {
        let mut policy = ReconnectPolicy::new(Duration::from_secs(1));
        let _ = policy.next_delay();
        let _ = policy.next_delay();
        policy.reset();
        assert_eq!(policy.attempt_count(), 0);
        assert_eq!(policy.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn attempt_count_saturates() {
        let mut policy = ReconnectPolicy::new(Duration::ZERO);
        policy.attempt_count = u32::MAX;
        let _ = policy.next_delay();
        assert_eq!(policy.attempt_count(), u32::MAX);
    }
}
