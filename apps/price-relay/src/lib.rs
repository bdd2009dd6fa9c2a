#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Price Relay - Market Data Fan-out
//!
//! Maintains a single connection to a Finnhub-compatible trade stream,
//! keeps the last known price for a fixed set of instruments, and relays
//! every change to downstream WebSocket subscribers.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core relay types and rules
//!   - `registry`: Static, ordered instrument set
//!   - `price`: Price state, snapshots, formatting
//!   - `feed`: Upstream feed phases and status
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Store, publisher, event sink, and quote interfaces
//!   - `services`: The price relay (single store writer)
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `finnhub`: Stream client and quote API
//!   - `store`: In-memory price table
//!   - `broadcast`: Subscriber fan-out hub
//!   - `sink`: Webhook event sink
//!   - `server`: Downstream WebSocket endpoint
//!   - `config`: Environment configuration
//!   - `health`: Health check HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//!                    snapshot quotes
//! Finnhub REST ──────────────┐
//!                            ▼
//! Finnhub WS ──► FeedClient ──► PriceRelay ──► PriceStore
//!                  (events)        │
//!                                  ├──► BroadcastHub ──► Subscriber 1..N
//!                                  └──► EventSink ──► webhook
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core relay types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::feed::{FeedPhase, FeedStatus};
pub use domain::price::{PriceSnapshot, PriceState, PriceTick, TickSource, format_price};
pub use domain::registry::{DEFAULT_SYMBOLS, Instrument, RegistryError, SymbolRegistry};

// Application
pub use application::ports::{EventSink, PricePublisher, PriceStorePort, QuoteError, QuoteSource};
pub use application::services::{FeedEvent, PriceRelay};

// Infrastructure config
pub use infrastructure::config::{
    BroadcastSettings, ConfigError, FeedSettings, RelayConfig, ServerSettings, SinkSettings,
};

// Upstream feed
pub use infrastructure::finnhub::{
    AccessToken, AuthError, FeedClient, FeedClientConfig, FeedClientError, FinnhubQuoteClient,
};

// Store and fan-out (for integration tests)
pub use infrastructure::broadcast::{
    BroadcastConfig, BroadcastHub, PublishReport, SharedBroadcastHub, SubscriberMessage,
    Subscription,
};
pub use infrastructure::store::InMemoryPriceStore;

// Event sink
pub use infrastructure::sink::{NoopEventSink, QueuedEventSink, WebhookForwarder};

// Servers
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};
pub use infrastructure::server::{RelayServer, RelayServerError};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
