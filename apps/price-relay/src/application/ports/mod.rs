//! Port Interfaces
//!
//! Defines the interfaces (ports) between the relay pipeline and the
//! outside world following the Hexagonal Architecture pattern. These are
//! the contracts that infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `PriceStorePort`: Canonical last-price table
//! - `PricePublisher`: Fan-out of a single price change to subscribers
//! - `EventSink`: Fire-and-forget notification of the full table
//! - `QuoteSource`: Request/response snapshot quotes

use async_trait::async_trait;

use crate::domain::price::{PriceSnapshot, PriceState};
use crate::domain::registry::Instrument;

// =============================================================================
// Price Store
// =============================================================================

/// Canonical mapping from instrument to last observed price.
#[cfg_attr(test, mockall::automock)]
pub trait PriceStorePort: Send + Sync {
    /// Current state for an instrument, `None` if it is not registered.
    fn get(&self, instrument: &Instrument) -> Option<PriceState>;

    /// Overwrite the price for a registered instrument (last write wins).
    ///
    /// Returns `false` if the instrument is not registered.
    fn set(&self, instrument: &Instrument, price: f64) -> bool;

    /// Consistent copy of every entry.
    fn snapshot(&self) -> PriceSnapshot;
}

// =============================================================================
// Fan-out
// =============================================================================

/// Delivers a single price change to every active subscriber.
#[cfg_attr(test, mockall::automock)]
pub trait PricePublisher: Send + Sync {
    /// Best-effort delivery; never fails.
    fn publish(&self, instrument: &Instrument, price: f64);
}

/// Receives the full price table after every change.
///
/// Implementations must not block the caller.
#[cfg_attr(test, mockall::automock)]
pub trait EventSink: Send + Sync {
    /// Hand a snapshot to the sink.
    fn notify(&self, snapshot: PriceSnapshot);
}

// =============================================================================
// Snapshot Quotes
// =============================================================================

/// Errors from a snapshot quote request.
#[derive(Debug, thiserror::Error)]
pub enum QuoteError {
    /// Transport failure or timeout.
    #[error("quote request failed: {0}")]
    Request(String),

    /// Non-success HTTP status.
    #[error("quote request returned status {0}")]
    Status(u16),

    /// Body could not be decoded.
    #[error("invalid quote response: {0}")]
    Decode(String),
}

/// Source of current prices fetched on demand.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Latest price for an instrument, `None` when no price is available.
    ///
    /// # Errors
    ///
    /// Returns `QuoteError` when the request fails.
    async fn latest_price(&self, instrument: &Instrument) -> Result<Option<f64>, QuoteError>;
}
