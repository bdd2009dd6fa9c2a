//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the relay service and the port interfaces that
//! define how the pipeline talks to storage, subscribers, and upstream.

/// Port interfaces for the store, fan-out, event sink, and quotes.
pub mod ports;

/// The price relay service.
pub mod services;
