//! Relay Configuration Settings
//!
//! Configuration types for the price relay, loaded from environment variables.

use std::time::Duration;

use crate::domain::registry::{DEFAULT_SYMBOLS, RegistryError, SymbolRegistry};

/// Upstream feed connection settings.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// Streaming WebSocket endpoint (token is appended as a query parameter).
    pub stream_url: String,
    /// Base URL of the snapshot quote API.
    pub quote_url: String,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay: Duration,
    /// Heartbeat ping interval.
    pub heartbeat_interval: Duration,
    /// Heartbeat timeout before considering the connection dead.
    pub heartbeat_timeout: Duration,
    /// Timeout for a single snapshot quote request.
    pub http_timeout: Duration,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            stream_url: "wss://ws.finnhub.io".to_string(),
            quote_url: "https://finnhub.io/api/v1".to_string(),
            reconnect_delay: Duration::from_secs(15),
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(60),
            http_timeout: Duration::from_secs(10),
        }
    }
}

/// Channel and queue sizes.
#[derive(Debug, Clone, Copy)]
pub struct BroadcastSettings {
    /// Messages buffered per downstream subscriber.
    pub subscriber_queue_capacity: usize,
    /// Events buffered between the feed client and the relay task.
    pub feed_event_capacity: usize,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            subscriber_queue_capacity: 256,
            feed_event_capacity: 1024,
        }
    }
}

/// Event sink settings.
#[derive(Debug, Clone)]
pub struct SinkSettings {
    /// Webhook receiving snapshots; `None` disables the sink.
    pub url: Option<String>,
    /// Snapshots buffered before new ones are dropped.
    pub queue_capacity: usize,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            url: None,
            queue_capacity: 64,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone, Copy)]
pub struct ServerSettings {
    /// Downstream WebSocket port.
    pub ws_port: u16,
    /// Health check HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            ws_port: 3001,
            health_port: 8082,
        }
    }
}

/// Complete relay configuration.
#[derive(Clone)]
pub struct RelayConfig {
    /// Upstream access token as configured; validated when the feed starts.
    pub api_key: Option<String>,
    /// Instrument identifiers in subscription order.
    pub symbols: Vec<String>,
    /// Server port settings.
    pub server: ServerSettings,
    /// Upstream feed settings.
    pub feed: FeedSettings,
    /// Channel and queue sizes.
    pub broadcast: BroadcastSettings,
    /// Event sink settings.
    pub sink: SinkSettings,
}

impl std::fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("symbols", &self.symbols)
            .field("server", &self.server)
            .field("feed", &self.feed)
            .field("broadcast", &self.broadcast)
            .field("sink", &self.sink)
            .finish()
    }
}

impl RelayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the symbol list is empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the symbol list is empty.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("FINNHUB_API_KEY");

        let symbols = match lookup("RELAY_SYMBOLS") {
            Some(raw) => {
                let symbols: Vec<String> = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(ToString::to_string)
                    .collect();
                if symbols.is_empty() {
                    return Err(ConfigError::EmptyValue("RELAY_SYMBOLS".to_string()));
                }
                symbols
            }
            None => DEFAULT_SYMBOLS.iter().map(ToString::to_string).collect(),
        };

        let server_defaults = ServerSettings::default();
        let server = ServerSettings {
            ws_port: parse_or(&lookup, "RELAY_WS_PORT", server_defaults.ws_port),
            health_port: parse_or(&lookup, "RELAY_HEALTH_PORT", server_defaults.health_port),
        };

        let feed_defaults = FeedSettings::default();
        let feed = FeedSettings {
            stream_url: lookup("FINNHUB_STREAM_URL").unwrap_or(feed_defaults.stream_url),
            quote_url: lookup("FINNHUB_QUOTE_URL").unwrap_or(feed_defaults.quote_url),
            reconnect_delay: parse_duration_secs(
                &lookup,
                "RELAY_RECONNECT_DELAY_SECS",
                feed_defaults.reconnect_delay,
            ),
            heartbeat_interval: parse_duration_secs(
                &lookup,
                "RELAY_HEARTBEAT_INTERVAL_SECS",
                feed_defaults.heartbeat_interval,
            ),
            heartbeat_timeout: parse_duration_secs(
                &lookup,
                "RELAY_HEARTBEAT_TIMEOUT_SECS",
                feed_defaults.heartbeat_timeout,
            ),
            http_timeout: parse_duration_secs(
                &lookup,
                "RELAY_HTTP_TIMEOUT_SECS",
                feed_defaults.http_timeout,
            ),
        };

        let broadcast_defaults = BroadcastSettings::default();
        let broadcast = BroadcastSettings {
            subscriber_queue_capacity: parse_or(
                &lookup,
                "RELAY_SUBSCRIBER_QUEUE_CAPACITY",
                broadcast_defaults.subscriber_queue_capacity,
            ),
            feed_event_capacity: parse_or(
                &lookup,
                "RELAY_FEED_EVENT_CAPACITY",
                broadcast_defaults.feed_event_capacity,
            ),
        };

        let sink_defaults = SinkSettings::default();
        let sink = SinkSettings {
            url: lookup("RELAY_EVENT_SINK_URL").filter(|url| !url.trim().is_empty()),
            queue_capacity: parse_or(
                &lookup,
                "RELAY_EVENT_SINK_QUEUE_CAPACITY",
                sink_defaults.queue_capacity,
            ),
        };

        Ok(Self {
            api_key,
            symbols,
            server,
            feed,
            broadcast,
            sink,
        })
    }

    /// Build the symbol registry from the configured list.
    ///
    /// # Errors
    ///
    /// Returns an error if the list contains duplicates.
    pub fn registry(&self) -> Result<SymbolRegistry, ConfigError> {
        Ok(SymbolRegistry::new(&self.symbols)?)
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Symbol list is not a valid registry.
    #[error("invalid symbol list: {0}")]
    Registry(#[from] RegistryError),
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_duration_secs<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map_or(default, Duration::from_secs)
}
