//! HTTP and WebSocket handlers.
//!
//! Each WebSocket runs one task that both reads inbound events and drains
//! the connection's outbox, so every write to the socket happens from the
//! task that owns it.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use crate::pages;
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::BytesMut;
use cuecast_core::{delivery, Hub, Relay, RoomRegistry, Session};
use cuecast_protocol::{codec, ClientEvent, Encoded, Encoding, ProtocolError, ServerEvent};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The event relay, with its registry and hub.
    pub relay: Arc<Relay>,
    /// Server configuration.
    pub config: Config,
    /// Live WebSocket connections, counted from upgrade.
    connections: AtomicUsize,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let relay = Relay::new(Arc::new(RoomRegistry::new()), Arc::new(Hub::new()));
        Self {
            relay: Arc::new(relay),
            config,
            connections: AtomicUsize::new(0),
        }
    }

    /// Get the room registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        self.relay.registry()
    }

    /// Get the number of live WebSocket connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Acquire)
    }

    /// Reserve a connection slot, unless the limit is reached.
    fn try_acquire(self: &Arc<Self>) -> Option<ConnectionSlot> {
        let limit = self.config.limits.max_connections;
        self.connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < limit).then_some(n + 1)
            })
            .ok()
            .map(|_| ConnectionSlot(Arc::clone(self)))
    }
}

/// A reserved connection slot, released on drop.
struct ConnectionSlot(Arc<AppState>);

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.connections.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Build the HTTP router.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/controller", get(controller_handler))
        .route("/receiver", get(receiver_handler))
        .route("/rooms", post(create_room_handler))
        .route("/health", get(health_handler))
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .with_state(state)
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {:#}", e);
        }
    }

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    serve(listener, config).await
}

/// Serve on an already bound listener.
///
/// # Errors
///
/// Returns an error if the listener fails.
pub async fn serve(listener: TcpListener, config: Config) -> Result<()> {
    let addr = listener.local_addr()?;
    let state = Arc::new(AppState::new(config));

    info!("cuecast server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, state.config.transport.websocket_path
    );

    axum::serve(listener, build_app(state)).await?;

    Ok(())
}

/// Landing page.
async fn index_handler() -> Html<String> {
    Html(pages::index())
}

/// Allocate a room and serve its controller page.
async fn controller_handler(State(state): State<Arc<AppState>>) -> Html<String> {
    let code = state.registry().allocate();
    metrics::set_active_rooms(state.registry().stats().room_count);
    debug!(room = %code, "Controller page served");
    Html(pages::controller(
        &code,
        &state.config.transport.websocket_path,
    ))
}

/// Receiver join page.
async fn receiver_handler(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(pages::receiver(&state.config.transport.websocket_path))
}

/// Allocate a room for a client that does not render HTML.
async fn create_room_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let code = state.registry().allocate();
    metrics::set_active_rooms(state.registry().stats().room_count);
    debug!(room = %code, "Room allocated via API");
    (
        StatusCode::CREATED,
        Json(serde_json::json!({ "room_code": code.as_str() })),
    )
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "rooms": state.registry().stats().room_count,
        "connections": state.connection_count(),
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let Some(slot) = state.try_acquire() else {
        warn!(
            limit = state.config.limits.max_connections,
            "Connection limit reached, refusing upgrade"
        );
        metrics::record_error("connection_limit");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };

    let max_message_size = state.config.limits.max_message_size;
    ws.max_message_size(max_message_size)
        .max_frame_size(max_message_size)
        .on_upgrade(move |socket| handle_websocket(socket, state, slot))
}

/// Handle a WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>, _slot: ConnectionSlot) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let (session, mut outbox) = state.relay.connect();
    let connection_id = session.id().clone();
    debug!(connection = %connection_id, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();

    // Replies follow the encoding of the last inbound frame
    let mut encoding = Encoding::Text;

    // Read buffer for events split across binary frames
    let mut read_buffer = BytesMut::with_capacity(4096);

    loop {
        tokio::select! {
            biased;

            Some(event) = outbox.recv() => {
                if send_event(&mut sender, &event, encoding).await.is_err() {
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        encoding = Encoding::Text;
                        metrics::record_bytes(text.len(), "inbound");
                        match codec::decode_json::<ClientEvent>(&text) {
                            Ok(event) => handle_event(&session, event),
                            Err(e) => reject(&session, &e),
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        encoding = Encoding::Binary;
                        metrics::record_bytes(data.len(), "inbound");
                        read_buffer.extend_from_slice(&data);

                        loop {
                            match codec::decode_from::<ClientEvent>(&mut read_buffer) {
                                Ok(Some(event)) => handle_event(&session, event),
                                Ok(None) => break,
                                Err(e @ ProtocolError::FrameTooLarge(_)) => {
                                    reject(&session, &e);
                                    read_buffer.clear();
                                    break;
                                }
                                Err(e) => reject(&session, &e),
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    let result = session.close();
    metrics::set_active_rooms(state.registry().stats().room_count);
    debug!(
        connection = %connection_id,
        from = ?result.transition.from,
        notified = result.deliveries.len(),
        "WebSocket disconnected"
    );
}

/// Apply one decoded event.
fn handle_event(session: &Session, event: ClientEvent) {
    let start = Instant::now();
    let name = event.name();
    metrics::record_event(name, "inbound");

    let result = session.handle(event);

    for d in &result.deliveries {
        metrics::record_event(d.event.name(), "outbound");
    }
    let plays = delivery::count_named(&result.deliveries, "play_command");
    if plays > 0 {
        metrics::record_play_commands(plays);
    }
    if result.transition.is_change() {
        debug!(
            connection = %session.id(),
            event = name,
            from = ?result.transition.from,
            to = ?result.transition.to,
            "Session transition"
        );
    }

    metrics::record_latency(start.elapsed().as_secs_f64());
}

/// Drop a malformed input.
fn reject(session: &Session, error: &ProtocolError) {
    warn!(connection = %session.id(), error = %error, "Dropping invalid event");
    metrics::record_error("protocol");
}

/// Send one event to the WebSocket.
///
/// An event that fails to encode is logged and skipped; only socket
/// failures are returned.
async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
    encoding: Encoding,
) -> Result<()> {
    let encoded = match codec::encode_as(event, encoding) {
        Ok(encoded) => encoded,
        Err(e) => {
            error!(event = event.name(), error = %e, "Failed to encode event");
            metrics::record_error("encode");
            return Ok(());
        }
    };
    metrics::record_bytes(encoded.len(), "outbound");

    let message = match encoded {
        Encoded::Text(text) => Message::Text(text),
        Encoded::Binary(data) => Message::Binary(data.to_vec()),
    };
    sender.send(message).await?;
    Ok(())
}
