//! Finnhub quote API adapter.

use async_trait::async_trait;
use serde::Deserialize;

use super::auth::AccessToken;
use crate::application::ports::{QuoteError, QuoteSource};
use crate::domain::registry::Instrument;

/// Subset of the `/quote` response the relay uses.
#[derive(Debug, Deserialize)]
struct QuoteResponse {
    /// Current price; Finnhub reports `0` for unknown symbols.
    #[serde(default)]
    c: Option<f64>,
}

/// Finnhub quote adapter.
///
/// Implements `QuoteSource` using `GET {base}/quote?symbol=..&token=..`.
#[derive(Debug, Clone)]
pub struct FinnhubQuoteClient {
    client: reqwest::Client,
    base_url: String,
    token: AccessToken,
}

impl FinnhubQuoteClient {
    /// Create a new quote client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        token: AccessToken,
        timeout: std::time::Duration,
    ) -> Result<Self, QuoteError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| QuoteError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }
}

#[async_trait]
impl QuoteSource for FinnhubQuoteClient {
    async fn latest_price(&self, instrument: &Instrument) -> Result<Option<f64>, QuoteError> {
        let url = format!("{}/quote", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("symbol", instrument.as_str()), ("token", self.token.expose())])
            .send()
            .await
            .map_err(|e| QuoteError::Request(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(QuoteError::Status(status.as_u16()));
        }

        let quote: QuoteResponse = response
            .json()
            .await
            .map_err(|e| QuoteError::Decode(e.without_url().to_string()))?;

        Ok(quote.c.filter(|price| price.is_finite() && *price != 0.0))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client(server: &MockServer) -> FinnhubQuoteClient {
        FinnhubQuoteClient::new(
            server.uri(),
            AccessToken::parse(Some("test-token")).unwrap(),
            Duration::from_secs(2),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn returns_current_price() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quote"))
            .and(query_param("symbol", "AAPL"))
            .and(query_param("token", "test-token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"c": 150.0, "h": 151.0, "l": 149.0})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let price = client(&server)
            .latest_price(&Instrument::new("AAPL"))
            .await
            .unwrap();
        assert_eq!(price, Some(150.0));
    }

    #[tokio::test]
    async fn zero_price_means_no_price() {
        let server = MockServer::start().await;
        Mock::given(path("/quote"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"c": 0})))
            .mount(&server)
            .await;

        let price = client(&server)
            .latest_price(&Instrument::new("GME"))
            .await
            .unwrap();
        assert_eq!(price, None);
    }

    #[tokio::test]
    async fn missing_price_means_no_price() {
        let server = MockServer::start().await;
        Mock::given(path("/quote"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let price = client(&server)
            .latest_price(&Instrument::new("AAPL"))
            .await
            .unwrap();
        assert_eq!(price, None);
    }

    #[tokio::test]
    async fn http_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(path("/quote"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = client(&server)
            .latest_price(&Instrument::new("AAPL"))
            .await
            .unwrap_err();
        assert!(matches!(err, QuoteError::Status(429)));
    }

    #[tokio::test]
    async fn malformed_body_is_reported() {
        let server = MockServer::start().await;
        Mock::given(path("/quote"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = client(&server)
            .latest_price(&Instrument::new("AAPL"))
            .await
            .unwrap_err();
        assert!(matches!(err, QuoteError::Decode(_)));
    }

    #[tokio::test]
    async fn error_does_not_leak_token() {
        let server = MockServer::start().await;
        let base = server.uri();
        drop(server);

        let quotes = FinnhubQuoteClient::new(
            base,
            AccessToken::parse(Some("leaky-token")).unwrap(),
            Duration::from_millis(500),
        )
        .unwrap();

        let err = quotes
            .latest_price(&Instrument::new("AAPL"))
            .await
            .unwrap_err();
        assert!(!err.to_string().contains("leaky-token"));
    }
}
