//! End-to-end tests against a live server.
//!
//! Each test binds its own server to an ephemeral port and drives it with
//! real WebSocket clients.

use std::net::SocketAddr;
use std::time::Duration;

use cuecast_protocol::{codec, ClientEvent, ServerEvent};
use cuecast_server::{serve, Config};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

// ============================================================================
// Constants
// ============================================================================

/// Maximum time to wait for an expected event
const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// How long to wait before concluding no event is coming
const SILENCE_WINDOW: Duration = Duration::from_millis(200);

// ============================================================================
// Test Helpers
// ============================================================================

/// A server running in the background on an ephemeral port.
struct TestServer {
    addr: SocketAddr,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with(Config::default()).await
    }

    async fn spawn_with(mut config: Config) -> Self {
        config.metrics.enabled = false;
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");

        tokio::spawn(async move {
            let _ = serve(listener, config).await;
        });

        Self { addr }
    }

    async fn connect(&self) -> TestClient {
        let (ws, _) = connect_async(format!("ws://{}/ws", self.addr))
            .await
            .expect("connect");
        TestClient { ws, binary: false }
    }

    async fn connect_binary(&self) -> TestClient {
        TestClient {
            binary: true,
            ..self.connect().await
        }
    }

    /// Issue a bare HTTP/1.1 request and return (status, body).
    async fn http(&self, method: &str, path: &str) -> (u16, String) {
        let mut stream = TcpStream::connect(self.addr).await.expect("connect");
        let request = format!(
            "{method} {path} HTTP/1.1\r\nHost: {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            self.addr
        );
        stream.write_all(request.as_bytes()).await.expect("write");

        let mut response = String::new();
        stream.read_to_string(&mut response).await.expect("read");

        let status = response
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse().ok())
            .expect("status line");
        let body = response
            .split_once("\r\n\r\n")
            .map(|(_, body)| body.to_string())
            .unwrap_or_default();
        (status, body)
    }

    async fn create_room(&self) -> String {
        let (status, body) = self.http("POST", "/rooms").await;
        assert_eq!(status, 201);
        let json: serde_json::Value = serde_json::from_str(&body).expect("json body");
        json["room_code"].as_str().expect("room_code").to_string()
    }

    async fn health(&self) -> serde_json::Value {
        let (status, body) = self.http("GET", "/health").await;
        assert_eq!(status, 200);
        serde_json::from_str(&body).expect("json body")
    }
}

/// A WebSocket client speaking JSON or MessagePack.
struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    binary: bool,
}

impl TestClient {
    async fn send(&mut self, event: ClientEvent) {
        let message = if self.binary {
            Message::Binary(codec::encode(&event).expect("encode").to_vec())
        } else {
            Message::Text(codec::encode_json(&event).expect("encode"))
        };
        self.ws.send(message).await.expect("send");
    }

    async fn send_raw(&mut self, message: Message) {
        self.ws.send(message).await.expect("send");
    }

    async fn recv(&mut self) -> ServerEvent {
        loop {
            let message = timeout(RECV_TIMEOUT, self.ws.next())
                .await
                .expect("timed out waiting for event")
                .expect("stream ended")
                .expect("websocket error");
            match message {
                Message::Text(text) => return codec::decode_json(&text).expect("decode"),
                Message::Binary(data) => return codec::decode(&data).expect("decode"),
                _ => continue,
            }
        }
    }

    async fn expect_silence(&mut self) {
        if let Ok(Some(Ok(message))) = timeout(SILENCE_WINDOW, self.ws.next()).await {
            panic!("expected no event, got {message:?}");
        }
    }

    async fn close(mut self) {
        self.ws.close(None).await.expect("close");
    }
}

/// Connect a controller and attach it to a fresh room.
async fn controller(server: &TestServer) -> (TestClient, String) {
    let code = server.create_room().await;
    let mut client = server.connect().await;
    client.send(ClientEvent::controller_join(&code)).await;
    assert_eq!(client.recv().await, ServerEvent::receiver_update(0));
    (client, code)
}

/// Connect a receiver and join `code`, consuming the controller's update.
async fn receiver(
    server: &TestServer,
    code: &str,
    ctl: &mut TestClient,
    count: usize,
) -> TestClient {
    let mut client = server.connect().await;
    client.send(ClientEvent::receiver_join(code)).await;
    assert_eq!(client.recv().await, ServerEvent::join_success(code));
    assert_eq!(ctl.recv().await, ServerEvent::receiver_update(count));
    client
}

// ============================================================================
// Room Flow
// ============================================================================

#[tokio::test]
async fn test_full_room_flow() {
    let server = TestServer::spawn().await;
    let (mut ctl, code) = controller(&server).await;

    let mut rx = server.connect().await;
    rx.send(ClientEvent::receiver_join(code.to_lowercase())).await;
    assert_eq!(rx.recv().await, ServerEvent::join_success(&code));
    assert_eq!(ctl.recv().await, ServerEvent::receiver_update(1));

    ctl.send(ClientEvent::play_sound(&code)).await;
    assert_eq!(rx.recv().await, ServerEvent::PlayCommand);
    ctl.expect_silence().await;

    rx.send(ClientEvent::receiver_leave(&code)).await;
    assert_eq!(ctl.recv().await, ServerEvent::receiver_update(0));

    ctl.send(ClientEvent::play_sound(&code)).await;
    rx.expect_silence().await;
}

#[tokio::test]
async fn test_play_reaches_every_receiver_once() {
    let server = TestServer::spawn().await;
    let (mut ctl, code) = controller(&server).await;

    let mut receivers = Vec::new();
    for count in 1..=3 {
        receivers.push(receiver(&server, &code, &mut ctl, count).await);
    }

    ctl.send(ClientEvent::play_sound(&code)).await;
    for rx in &mut receivers {
        assert_eq!(rx.recv().await, ServerEvent::PlayCommand);
    }
    for rx in &mut receivers {
        rx.expect_silence().await;
    }
}

#[tokio::test]
async fn test_join_unknown_room() {
    let server = TestServer::spawn().await;
    let mut rx = server.connect().await;

    rx.send(ClientEvent::receiver_join("ZZZZZZ")).await;
    assert_eq!(rx.recv().await, ServerEvent::invalid_room_code());
    assert_eq!(server.health().await["rooms"], 0);
}

#[tokio::test]
async fn test_play_from_receiver_is_ignored() {
    let server = TestServer::spawn().await;
    let (mut ctl, code) = controller(&server).await;
    let mut rx1 = receiver(&server, &code, &mut ctl, 1).await;
    let mut rx2 = receiver(&server, &code, &mut ctl, 2).await;

    rx1.send(ClientEvent::play_sound(&code)).await;
    rx1.expect_silence().await;
    rx2.expect_silence().await;
    ctl.expect_silence().await;
}

// ============================================================================
// Disconnects
// ============================================================================

#[tokio::test]
async fn test_controller_disconnect_closes_room() {
    let server = TestServer::spawn().await;
    let (mut ctl, code) = controller(&server).await;
    let mut rx1 = receiver(&server, &code, &mut ctl, 1).await;
    let mut rx2 = receiver(&server, &code, &mut ctl, 2).await;
    assert_eq!(server.health().await["rooms"], 1);

    ctl.close().await;
    assert_eq!(rx1.recv().await, ServerEvent::RoomClosed);
    assert_eq!(rx2.recv().await, ServerEvent::RoomClosed);

    rx1.send(ClientEvent::receiver_join(&code)).await;
    assert_eq!(rx1.recv().await, ServerEvent::invalid_room_code());
    assert_eq!(server.health().await["rooms"], 0);
}

#[tokio::test]
async fn test_receiver_disconnect_updates_controller() {
    let server = TestServer::spawn().await;
    let (mut ctl, code) = controller(&server).await;
    let rx1 = receiver(&server, &code, &mut ctl, 1).await;
    let _rx2 = receiver(&server, &code, &mut ctl, 2).await;

    rx1.close().await;
    assert_eq!(ctl.recv().await, ServerEvent::receiver_update(1));
}

#[tokio::test]
async fn test_dropped_socket_is_reconciled() {
    let server = TestServer::spawn().await;
    let (mut ctl, code) = controller(&server).await;
    let rx = receiver(&server, &code, &mut ctl, 1).await;

    // No close handshake
    drop(rx);
    assert_eq!(ctl.recv().await, ServerEvent::receiver_update(0));
}

// ============================================================================
// Protocol
// ============================================================================

#[tokio::test]
async fn test_malformed_input_is_dropped() {
    let server = TestServer::spawn().await;
    let (mut ctl, code) = controller(&server).await;

    ctl.send_raw(Message::Text("not json".into())).await;
    ctl.send_raw(Message::Text(r#"{"event":"self_destruct","data":{}}"#.into()))
        .await;
    ctl.send_raw(Message::Text(r#"{"event":"play_sound","data":{}}"#.into()))
        .await;
    ctl.expect_silence().await;

    // Connection still works
    let _rx = receiver(&server, &code, &mut ctl, 1).await;
}

#[tokio::test]
async fn test_binary_client_gets_binary_replies() {
    let server = TestServer::spawn().await;
    let (mut ctl, code) = controller(&server).await;

    let mut rx = server.connect_binary().await;
    rx.send(ClientEvent::receiver_join(&code)).await;

    let reply = timeout(RECV_TIMEOUT, rx.ws.next())
        .await
        .expect("timed out")
        .expect("stream ended")
        .expect("websocket error");
    let Message::Binary(data) = reply else {
        panic!("expected binary reply, got {reply:?}");
    };
    assert_eq!(
        codec::decode::<ServerEvent>(&data).unwrap(),
        ServerEvent::join_success(&code)
    );

    // The controller still speaks JSON
    assert_eq!(ctl.recv().await, ServerEvent::receiver_update(1));

    ctl.send(ClientEvent::play_sound(&code)).await;
    assert_eq!(rx.recv().await, ServerEvent::PlayCommand);
}

#[tokio::test]
async fn test_binary_frame_with_several_events() {
    let server = TestServer::spawn().await;
    let (mut ctl, code) = controller(&server).await;

    let mut buf = bytes::BytesMut::new();
    codec::encode_into(&ClientEvent::receiver_join(&code), &mut buf).unwrap();
    codec::encode_into(&ClientEvent::receiver_leave(&code), &mut buf).unwrap();

    let mut rx = server.connect_binary().await;
    rx.send_raw(Message::Binary(buf.to_vec())).await;

    assert_eq!(rx.recv().await, ServerEvent::join_success(&code));
    assert_eq!(ctl.recv().await, ServerEvent::receiver_update(1));
    assert_eq!(ctl.recv().await, ServerEvent::receiver_update(0));
}

// ============================================================================
// HTTP
// ============================================================================

#[tokio::test]
async fn test_controller_page_allocates_room() {
    let server = TestServer::spawn().await;

    let (status, body) = server.http("GET", "/controller").await;
    assert_eq!(status, 200);
    assert!(body.contains("controller_join"));
    assert_eq!(server.health().await["rooms"], 1);

    let (status, body) = server.http("GET", "/receiver").await;
    assert_eq!(status, 200);
    assert!(body.contains("receiver_join"));
    assert_eq!(server.health().await["rooms"], 1);
}

#[tokio::test]
async fn test_allocated_codes_are_distinct() {
    let server = TestServer::spawn().await;
    let mut codes = std::collections::HashSet::new();
    for _ in 0..20 {
        let code = server.create_room().await;
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        assert!(codes.insert(code));
    }
}

#[tokio::test]
async fn test_health_reports_connections() {
    let server = TestServer::spawn().await;
    let health = server.health().await;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["connections"], 0);

    let _client = server.connect().await;
    assert_eq!(server.health().await["connections"], 1);
}

#[tokio::test]
async fn test_connection_limit() {
    let mut config = Config::default();
    config.limits.max_connections = 1;
    let server = TestServer::spawn_with(config).await;

    let _first = server.connect().await;
    let second = connect_async(format!("ws://{}/ws", server.addr)).await;
    assert!(second.is_err());
}
