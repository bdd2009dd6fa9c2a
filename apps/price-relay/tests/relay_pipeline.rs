//! Relay Pipeline Integration Tests
//!
//! Drives the full pipeline against a loopback upstream feed, a mocked
//! quote API, and real subscriber WebSocket connections.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use price_relay::domain::price::UNKNOWN_PRICE;
use price_relay::infrastructure::finnhub::HeartbeatConfig;
use price_relay::infrastructure::server;
use price_relay::{
    AccessToken, BroadcastConfig, BroadcastHub, FeedClient, FeedClientConfig, FeedClientError,
    FeedPhase, FeedStatus, FinnhubQuoteClient, InMemoryPriceStore, Instrument, NoopEventSink,
    PricePublisher, PriceRelay, PriceStorePort, PriceTick, QuoteError, QuoteSource,
    SharedBroadcastHub, SymbolRegistry,
};

const TOKEN: &str = "test-token";
const WAIT: Duration = Duration::from_secs(5);

type Subscriber = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// Harness
// =============================================================================

struct NoQuotes;

#[async_trait]
impl QuoteSource for NoQuotes {
    async fn latest_price(&self, _instrument: &Instrument) -> Result<Option<f64>, QuoteError> {
        Ok(None)
    }
}

/// Loopback upstream that accepts one connection at a time.
struct FakeFeed {
    url: String,
    frames: mpsc::UnboundedSender<String>,
    subscriptions: mpsc::UnboundedReceiver<String>,
    accepts: Arc<AtomicUsize>,
}

impl FakeFeed {
    async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (frames_tx, mut frames_rx) = mpsc::unbounded_channel::<String>();
        let (subs_tx, subs_rx) = mpsc::unbounded_channel::<String>();
        let accepts = Arc::new(AtomicUsize::new(0));

        let accepted = Arc::clone(&accepts);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accepted.fetch_add(1, Ordering::SeqCst);
                let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };
                let (mut write, mut read) = ws.split();
                loop {
                    tokio::select! {
                        frame = frames_rx.recv() => {
                            let Some(frame) = frame else { return };
                            if write.send(Message::Text(frame.into())).await.is_err() {
                                break;
                            }
                        }
                        msg = read.next() => match msg {
                            Some(Ok(Message::Text(text))) => {
                                let _ = subs_tx.send(text.as_str().to_owned());
                            }
                            Some(Ok(_)) => {}
                            _ => break,
                        }
                    }
                }
            }
        });

        Self {
            url: format!("ws://{addr}/"),
            frames: frames_tx,
            subscriptions: subs_rx,
            accepts,
        }
    }

    fn push(&self, frame: &Value) {
        self.push_raw(&frame.to_string());
    }

    fn push_raw(&self, frame: &str) {
        self.frames.send(frame.to_owned()).unwrap();
    }

    fn accepts(&self) -> usize {
        self.accepts.load(Ordering::SeqCst)
    }

    async fn next_subscription(&mut self) -> Value {
        let text = timeout(WAIT, self.subscriptions.recv())
            .await
            .expect("timed out waiting for subscription")
            .expect("feed closed");
        serde_json::from_str(&text).unwrap()
    }
}

struct RunningRelay {
    store: Arc<dyn PriceStorePort>,
    hub: SharedBroadcastHub,
    status: Arc<FeedStatus>,
    cancel: CancellationToken,
    feed_task: JoinHandle<Result<(), FeedClientError>>,
}

impl RunningRelay {
    fn start(
        symbols: &[&str],
        stream_url: &str,
        quotes: Arc<dyn QuoteSource>,
        reconnect_delay: Duration,
    ) -> Self {
        Self::start_with_heartbeat(
            symbols,
            stream_url,
            quotes,
            reconnect_delay,
            HeartbeatConfig::default(),
        )
    }

    fn start_with_heartbeat(
        symbols: &[&str],
        stream_url: &str,
        quotes: Arc<dyn QuoteSource>,
        reconnect_delay: Duration,
        heartbeat: HeartbeatConfig,
    ) -> Self {
        let registry = Arc::new(SymbolRegistry::new(symbols.iter().copied()).unwrap());
        let store: Arc<dyn PriceStorePort> = Arc::new(InMemoryPriceStore::new(&registry));
        let hub = Arc::new(BroadcastHub::new(
            Arc::clone(&store),
            BroadcastConfig::default(),
        ));
        let status = Arc::new(FeedStatus::new());
        let cancel = CancellationToken::new();

        let (event_tx, event_rx) = mpsc::channel(64);
        let relay = PriceRelay::new(
            Arc::clone(&store),
            Arc::clone(&hub) as Arc<dyn PricePublisher>,
            Arc::new(NoopEventSink),
            Arc::clone(&status),
        );
        let relay_cancel = cancel.clone();
        tokio::spawn(async move { relay.run(event_rx, relay_cancel).await });

        let mut config = FeedClientConfig::new(stream_url, AccessToken::parse(Some(TOKEN)).unwrap());
        config.reconnect_delay = reconnect_delay;
        config.heartbeat = heartbeat;
        let client = Arc::new(FeedClient::new(
            config,
            registry,
            quotes,
            event_tx,
            cancel.clone(),
        ));
        let feed_task = tokio::spawn(client.run());

        Self {
            store,
            hub,
            status,
            cancel,
            feed_task,
        }
    }

    fn price_of(&self, symbol: &str) -> Option<f64> {
        self.store.get(&Instrument::new(symbol)).map(|state| state.price)
    }
}

async fn wait_for(condition: impl Fn() -> bool) {
    timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

async fn serve_subscribers(hub: SharedBroadcastHub, cancel: CancellationToken) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = server::router(hub, cancel.clone());
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await
            .unwrap();
    });
    format!("ws://{addr}/ws")
}

async fn next_json(ws: &mut Subscriber) -> Value {
    loop {
        let msg = timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for message")
            .expect("subscriber stream ended")
            .expect("subscriber socket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

fn trade(symbol: &str, price: f64) -> Value {
    json!({"type": "trade", "data": [{"s": symbol, "p": price, "t": 1_700_000_000_000_u64, "v": 1}]})
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn snapshot_and_stream_prices_reach_subscribers() {
    let _ = rustls::crypto::ring::default_provider().install_default();

    let quote_api = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/quote"))
        .and(query_param("symbol", "AAPL"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"c": 150.0})))
        .mount(&quote_api)
        .await;
    Mock::given(method("GET"))
        .and(path("/quote"))
        .and(query_param("symbol", "TSLA"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&quote_api)
        .await;
    let quotes = FinnhubQuoteClient::new(
        quote_api.uri(),
        AccessToken::parse(Some(TOKEN)).unwrap(),
        Duration::from_secs(2),
    )
    .unwrap();

    let mut feed = FakeFeed::spawn().await;
    feed.push(&trade("TSLA", 700.123));

    let relay = RunningRelay::start(
        &["AAPL", "TSLA"],
        &feed.url,
        Arc::new(quotes),
        Duration::from_secs(15),
    );

    assert_eq!(
        feed.next_subscription().await,
        json!({"type": "subscribe", "symbol": "AAPL"})
    );
    assert_eq!(
        feed.next_subscription().await,
        json!({"type": "subscribe", "symbol": "TSLA"})
    );

    wait_for(|| relay.price_of("AAPL") == Some(150.0) && relay.price_of("TSLA") == Some(700.123))
        .await;
    assert_eq!(relay.status.phase(), FeedPhase::Streaming);

    let url = serve_subscribers(Arc::clone(&relay.hub), relay.cancel.clone()).await;
    let (mut subscriber, _) = connect_async(url.as_str()).await.unwrap();

    let initial = next_json(&mut subscriber).await;
    assert_eq!(initial["type"], "initial");
    assert_eq!(initial["data"]["AAPL"]["name"], "AAPL");
    assert_eq!(initial["data"]["AAPL"]["price"], 150.0);
    assert_eq!(initial["data"]["TSLA"]["price"], 700.12);
    assert!(initial["data"]["TSLA"]["lastUpdated"].is_string());

    // Neither a ping nor an unregistered instrument produces an update.
    feed.push(&json!({"type": "ping"}));
    feed.push(&trade("MSFT", 1.0));
    feed.push(&trade("TSLA", 701.5));

    assert_eq!(
        next_json(&mut subscriber).await,
        json!({"symbol": "TSLA", "price": "701.50"})
    );
    assert_eq!(relay.price_of("MSFT"), None);

    relay.cancel.cancel();
    let result = timeout(WAIT, relay.feed_task).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn malformed_frames_are_skipped_without_reconnecting() {
    let mut feed = FakeFeed::spawn().await;
    let relay = RunningRelay::start(
        &["AAPL"],
        &feed.url,
        Arc::new(NoQuotes),
        Duration::from_millis(50),
    );
    feed.next_subscription().await;

    feed.push_raw("{not json");
    feed.push(&json!({"type": "trade", "data": [{"s": "AAPL", "p": "oops"}]}));
    feed.push(&trade("AAPL", 151.0));

    wait_for(|| relay.price_of("AAPL") == Some(151.0)).await;
    assert_eq!(feed.accepts(), 1);
    assert_eq!(relay.status.phase(), FeedPhase::Streaming);
    assert_eq!(relay.status.last_error(), None);

    relay.cancel.cancel();
    let result = timeout(WAIT, relay.feed_task).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn silent_upstream_trips_heartbeat_timeout() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/", listener.local_addr().unwrap());
    tokio::spawn(async move {
        // Held but never polled, so pings go unanswered.
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            if let Ok(ws) = tokio_tungstenite::accept_async(stream).await {
                held.push(ws);
            }
        }
    });

    let relay = RunningRelay::start_with_heartbeat(
        &["AAPL"],
        &url,
        Arc::new(NoQuotes),
        Duration::from_secs(60),
        HeartbeatConfig::new(Duration::from_millis(50), Duration::from_millis(150)),
    );

    wait_for(|| relay.status.phase() == FeedPhase::Streaming).await;
    wait_for(|| relay.status.phase() == FeedPhase::Backoff).await;
    assert_eq!(relay.status.last_error().as_deref(), Some("heartbeat timeout"));

    relay.cancel.cancel();
    let result = timeout(WAIT, relay.feed_task).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn reconnects_after_fixed_delay_when_upstream_drops() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/", listener.local_addr().unwrap());
    let accepted: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));

    let accepted_by_server = Arc::clone(&accepted);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            accepted_by_server.lock().push(Instant::now());
            // Complete the handshake, then hang up.
            drop(tokio_tungstenite::accept_async(stream).await);
        }
    });

    let delay = Duration::from_millis(50);
    let relay = RunningRelay::start(&["AAPL"], &url, Arc::new(NoQuotes), delay);

    wait_for(|| accepted.lock().len() >= 3).await;

    let times = accepted.lock().clone();
    for pair in times.windows(2) {
        assert!(pair[1].duration_since(pair[0]) >= delay);
    }
    assert_eq!(relay.price_of("AAPL"), Some(UNKNOWN_PRICE));

    relay.cancel.cancel();
    let result = timeout(WAIT, relay.feed_task).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn cancellation_interrupts_reconnect_delay() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/", listener.local_addr().unwrap());
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            drop(tokio_tungstenite::accept_async(stream).await);
        }
    });

    let relay = RunningRelay::start(
        &["AAPL"],
        &url,
        Arc::new(NoQuotes),
        Duration::from_secs(60),
    );

    wait_for(|| relay.status.phase() == FeedPhase::Backoff).await;
    assert!(relay.status.last_error().is_some());

    relay.cancel.cancel();
    let result = timeout(Duration::from_secs(1), relay.feed_task)
        .await
        .expect("feed client ignored cancellation")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn closed_subscriber_does_not_affect_others() {
    let registry = SymbolRegistry::new(["AAPL"]).unwrap();
    let store: Arc<dyn PriceStorePort> = Arc::new(InMemoryPriceStore::new(&registry));
    let hub = Arc::new(BroadcastHub::new(
        Arc::clone(&store),
        BroadcastConfig::default(),
    ));
    let relay = PriceRelay::new(
        store,
        Arc::clone(&hub) as Arc<dyn PricePublisher>,
        Arc::new(NoopEventSink),
        Arc::new(FeedStatus::new()),
    );
    let cancel = CancellationToken::new();
    let url = serve_subscribers(Arc::clone(&hub), cancel.clone()).await;

    let (mut leaving, _) = connect_async(url.as_str()).await.unwrap();
    let (mut staying, _) = connect_async(url.as_str()).await.unwrap();
    assert_eq!(next_json(&mut leaving).await["type"], "initial");
    assert_eq!(next_json(&mut staying).await["type"], "initial");
    assert_eq!(hub.subscriber_count(), 2);

    leaving.close(None).await.unwrap();
    drop(leaving);
    wait_for(|| hub.subscriber_count() == 1).await;

    assert!(relay.apply(&PriceTick::stream(Instrument::new("AAPL"), 151.254)));
    assert_eq!(
        next_json(&mut staying).await,
        json!({"symbol": "AAPL", "price": "151.25"})
    );

    cancel.cancel();
}

#[tokio::test]
async fn late_subscriber_sees_current_table_first() {
    let registry = SymbolRegistry::new(["AAPL", "TSLA"]).unwrap();
    let store: Arc<dyn PriceStorePort> = Arc::new(InMemoryPriceStore::new(&registry));
    let hub = Arc::new(BroadcastHub::new(
        Arc::clone(&store),
        BroadcastConfig::default(),
    ));
    let relay = PriceRelay::new(
        store,
        Arc::clone(&hub) as Arc<dyn PricePublisher>,
        Arc::new(NoopEventSink),
        Arc::new(FeedStatus::new()),
    );
    relay.apply(&PriceTick::snapshot(Instrument::new("AAPL"), 189.999));

    let cancel = CancellationToken::new();
    let url = serve_subscribers(Arc::clone(&hub), cancel.clone()).await;
    let (mut subscriber, _) = connect_async(url.as_str()).await.unwrap();

    let initial = next_json(&mut subscriber).await;
    assert_eq!(initial["data"]["AAPL"]["price"], 190.0);
    assert_eq!(initial["data"]["TSLA"]["price"], 0.0);
    assert!(initial["data"]["TSLA"]["lastUpdated"].is_null());

    cancel.cancel();
}
