//! Finnhub Adapters
//!
//! Implements the upstream side of the relay against Finnhub's API:
//!
//! - **Stream**: WebSocket trade feed (JSON codec, fixed-delay reconnect)
//! - **Quote**: REST `/quote` endpoint for per-instrument snapshots

pub mod auth;
pub mod client;
pub mod codec;
pub mod heartbeat;
pub mod messages;
pub mod quote;
pub mod reconnect;

pub use auth::{AccessToken, AuthError};
pub use client::{FeedClient, FeedClientConfig, FeedClientError};
pub use codec::{CodecError, FeedCodec};
pub use heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatManager, HeartbeatState};
pub use messages::{FeedMessage, SubscribeRequest, TradeTick};
pub use quote::FinnhubQuoteClient;
pub use reconnect::ReconnectPolicy;
