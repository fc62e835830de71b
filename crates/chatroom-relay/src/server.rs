//! Relay WebSocket server — Axum-based HTTP + WS transport

use std::net::SocketAddr;
use std::time::Instant;

use anyhow::Context;
use axum::Router;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, warn};

use crate::protocol::{ClientFrame, ConnectionId, ServerFrame};
use crate::relay::{Relay, RelayStats};
use crate::service::{self, RelayHandle};

/// Shared state for all WebSocket connections
#[derive(Clone)]
pub struct RelayState {
    pub relay: RelayHandle,
    pub start_time: Instant,
    /// Fired on shutdown; open sockets stop reading when it does
    pub shutdown: CancellationToken,
}

/// The relay server
pub struct RelayServer {
    state: RelayState,
    bind: SocketAddr,
    cancel: CancellationToken,
    relay_task: JoinHandle<()>,
}

impl RelayServer {
    /// Create a server and start its relay task.
    ///
    /// Must be called from within a Tokio runtime. Cancelling `cancel` stops
    /// both the relay task and the HTTP listener.
    pub fn new(bind: SocketAddr, cancel: CancellationToken) -> Self {
        let (relay, relay_task) = service::spawn(Relay::new(), cancel.clone());
        let state = RelayState {
            relay,
            start_time: Instant::now(),
            shutdown: cancel.clone(),
        };
        Self {
            state,
            bind,
            cancel,
            relay_task,
        }
    }

    /// Build the Axum router
    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .route("/api/status", get(status_handler))
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Bind the configured address and serve until cancelled
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = match TcpListener::bind(self.bind).await {
            Ok(listener) => listener,
            Err(e) => {
                self.cancel.cancel();
                return Err(e).with_context(|| format!("Failed to bind {}", self.bind));
            }
        };
        self.serve(listener).await
    }

    /// Serve on an already-bound listener until cancelled
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        let router = self.router();
        info!("Relay listening on {}", listener.local_addr()?);

        let cancel = self.cancel.clone();
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

        self.cancel.cancel();
        if let Err(e) = self.relay_task.await {
            error!("Relay task failed: {}", e);
        }
        info!("Relay server stopped");
        Ok(())
    }

    /// Start the server in the background, returning a handle
    pub fn spawn(self) -> JoinHandle<anyhow::Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}

// ── HTTP Handlers ──

/// Body of `GET /api/status`
#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
    #[serde(flatten)]
    stats: RelayStats,
    uptime_secs: u64,
}

async fn status_handler(State(state): State<RelayState>) -> impl IntoResponse {
    let Some(stats) = state.relay.stats().await else {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };

    axum::Json(StatusResponse {
        status: "ok",
        stats,
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
    .into_response()
}

// ── WebSocket Handler ──

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<RelayState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    info!("WebSocket connection from {}", addr);
    ws.on_upgrade(move |socket| handle_ws(socket, state, addr))
}

async fn handle_ws(socket: WebSocket, state: RelayState, addr: SocketAddr) {
    let connection_id = ConnectionId::new();
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (outbox, mut outbox_rx) = mpsc::unbounded_channel::<ServerFrame>();

    state.relay.connect(connection_id, outbox);

    // Forward frames queued by the relay to this client
    let send_task = tokio::spawn(async move {
        while let Some(frame) = outbox_rx.recv().await {
            let json = match frame.encode() {
                Ok(j) => j,
                Err(e) => {
                    error!("Failed to serialize '{}' frame: {}", frame.event(), e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Process incoming frames from this client
    loop {
        let msg = tokio::select! {
            _ = state.shutdown.cancelled() => break,
            msg = ws_receiver.next() => msg,
        };
        let Some(msg) = msg else {
            break;
        };
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => {
                debug!("Client {} ({}) sent close", addr, connection_id);
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!("WebSocket error from {} ({}): {}", addr, connection_id, e);
                break;
            }
        };

        dispatch_frame(&state.relay, connection_id, text.as_str());
    }

    state.relay.disconnect(connection_id);
    send_task.abort();
    info!("Client {} ({}) disconnected", addr, connection_id);
}

/// Decode one client frame and hand it to the relay. Malformed frames are dropped.
fn dispatch_frame(relay: &RelayHandle, connection_id: ConnectionId, raw: &str) -> bool {
    match ClientFrame::parse(raw) {
        Ok(ClientFrame::Join(req)) => {
            relay.join(connection_id, req.user_name, req.room_name);
            true
        }
        Ok(ClientFrame::Chat(req)) => {
            relay.message(connection_id, req.content, req.message_type);
            true
        }
        Err(e) => {
            debug!("Ignoring malformed frame from {}: {}", connection_id, e);
            false
        }
    }
}
