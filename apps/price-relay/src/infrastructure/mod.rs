//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Finnhub stream and quote adapters.
pub mod finnhub;

/// In-memory price store.
pub mod store;

/// Subscriber fan-out hub.
pub mod broadcast;

/// Event sink adapters.
pub mod sink;

/// Downstream WebSocket server.
pub mod server;

/// Configuration loading.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Logging and OpenTelemetry tracing integration.
pub mod telemetry;
