//! Finnhub Stream Messages
//!
//! Wire types for the streaming socket. Inbound frames are JSON objects
//! tagged by `type`:
//!
//! ```json
//! {"type":"ping"}
//! {"type":"trade","data":[{"s":"AAPL","p":150.25,"t":1700000000000,"v":10}]}
//! {"type":"error","msg":"Invalid symbol"}
//! ```
//!
//! Outbound, the client only ever sends subscriptions.

use serde::{Deserialize, Serialize};

/// Inbound message from the stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FeedMessage {
    /// Keep-alive from the server.
    Ping,
    /// Batch of trades, in exchange order.
    Trade {
        /// Trades in the batch.
        data: Vec<TradeTick>,
    },
    /// Server-side error report.
    Error {
        /// Error description.
        #[serde(default)]
        msg: String,
    },
    /// Any other message type.
    #[serde(other)]
    Unknown,
}

/// A single trade inside a `trade` batch.
///
/// Only symbol and price are used; other fields (`t`, `v`, `c`) are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TradeTick {
    /// Instrument identifier.
    #[serde(rename = "s")]
    pub symbol: String,
    /// Trade price.
    #[serde(rename = "p")]
    pub price: f64,
}

/// Subscribe request for one instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscribeRequest<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    /// Instrument identifier.
    pub symbol: &'a str,
}

impl<'a> SubscribeRequest<'a> {
    /// Subscribe to trades for `symbol`.
    #[must_use]
    pub const fn new(symbol: &'a str) -> Self {
        Self {
            kind: "subscribe",
            symbol,
        }
    }

    /// Serialize to the JSON text frame sent on the wire.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_request_format() {
        assert_eq!(
            SubscribeRequest::new("BINANCE:ETHUSDT").to_json().unwrap(),
            r#"{"type":"subscribe","symbol":"BINANCE:ETHUSDT"}"#
        );
    }

    #[test]
    fn trade_ignores_extra_fields() {
        let msg: FeedMessage = serde_json::from_str(
            r#"{"type":"trade","data":[{"s":"AAPL","p":150.25,"t":1700000000000,"v":10,"c":null}]}"#,
        )
        .unwrap();

        assert_eq!(
            msg,
            FeedMessage::Trade {
                data: vec![TradeTick {
                    symbol: "AAPL".to_string(),
                    price: 150.25,
                }],
            }
        );
    }

    #[test]
    fn unknown_type_is_tolerated() {
        let msg: FeedMessage = serde_json::from_str(r#"{"type":"news"}"#).unwrap();
        assert_eq!(msg, FeedMessage::Unknown);
    }
}
