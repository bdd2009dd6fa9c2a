//! Domain Layer - Core relay types and business rules.
//!
//! This layer contains the instrument registry, price state, and the
//! upstream feed state machine. Nothing here performs I/O.

/// Upstream feed phases and connection status tracking.
pub mod feed;

/// Price state, snapshots, and price formatting.
pub mod price;

/// Static instrument registry.
pub mod registry;
