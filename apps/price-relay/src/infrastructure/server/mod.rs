//! Downstream WebSocket Server
//!
//! Accepts subscriber connections on `/` and `/ws`. Each connection is
//! registered with the [`BroadcastHub`](crate::infrastructure::broadcast::BroadcastHub),
//! receives the initial snapshot, then every price update as a JSON text frame.
//!
//! Subscribers never send anything meaningful; inbound frames are drained
//! only to notice a close.

use std::net::SocketAddr;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::infrastructure::broadcast::{SharedBroadcastHub, Subscription};

/// Relay server errors.
#[derive(Debug, thiserror::Error)]
pub enum RelayServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

#[derive(Clone)]
struct ServerState {
    hub: SharedBroadcastHub,
    cancel: CancellationToken,
}

/// Build the subscriber router.
///
/// Open sockets are closed when `cancel` fires.
pub fn router(hub: SharedBroadcastHub, cancel: CancellationToken) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .with_state(ServerState { hub, cancel })
}

/// Downstream WebSocket server.
pub struct RelayServer {
    port: u16,
    hub: SharedBroadcastHub,
    cancel: CancellationToken,
}

impl RelayServer {
    /// Create a new relay server.
    #[must_use]
    pub const fn new(port: u16, hub: SharedBroadcastHub, cancel: CancellationToken) -> Self {
        Self { port, hub, cancel }
    }

    /// Run the server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `RelayServerError` if binding fails or the server stops
    /// with an error.
    pub async fn run(self) -> Result<(), RelayServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RelayServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Relay server listening");

        let app = router(self.hub, self.cancel.clone());
        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| RelayServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Relay server stopped");
        Ok(())
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ServerState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: ServerState) {
    let Subscription { id, mut rx, .. } = state.hub.connect();
    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let text = match message.to_json() {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(subscriber_id = id, error = %e, "Failed to encode message");
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        // Hub dropped us or the socket failed.
        let _ = sender.close().await;
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            if matches!(message, Message::Close(_)) {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
        () = state.cancel.cancelled() => {
            send_task.abort();
            recv_task.abort();
        }
    }

    state.hub.disconnect(id);
}
