#![allow(dead_code)]

use axum::body::Body;
use chathub::config::GatewayLimits;
use chathub::db;
use chathub::models::chat::{Chat, ChatType};
use chathub::models::user::{CreateUser, User};
use chathub::routes;
use chathub::state::AppState;
use futures_util::{SinkExt, StreamExt};
use http::{Method, Request};
use sqlx::SqlitePool;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A user created for testing, bundling the User record with its raw token.
pub struct TestUser {
    pub user: User,
    pub token: String,
}

impl TestUser {
    /// Returns the Authorization header value.
    pub fn auth_header(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

/// Test server that owns an in-memory SQLite pool and full AppState.
/// Each instance is isolated, so tests can run in parallel.
pub struct TestServer {
    pub state: AppState,
}

impl TestServer {
    /// Create a new TestServer with an in-memory SQLite database.
    pub async fn new() -> Self {
        Self::with_limits(GatewayLimits::default()).await
    }

    /// Same, with custom gateway limits (short timeouts, tiny queues).
    pub async fn with_limits(limits: GatewayLimits) -> Self {
        let pool = db::create_pool("sqlite::memory:")
            .await
            .expect("failed to create test pool");

        Self {
            state: AppState::with_limits(pool, limits, 24),
        }
    }

    /// Returns an Axum Router wired to this server's state for `oneshot()` calls.
    pub fn router(&self) -> axum::Router {
        routes::router(self.state.clone())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.state.db
    }

    /// Binds a TCP listener on port 0, spawns the server, and returns `host:port`.
    pub async fn spawn(&self) -> String {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("127.0.0.1:{}", addr.port())
    }

    /// Create a user and issue a bearer token through the normal token path.
    pub async fn create_user_with_token(&self, username: &str) -> TestUser {
        let user = db::users::create_user(
            self.pool(),
            &CreateUser {
                username: username.to_string(),
                display_name: None,
            },
            "not-a-real-hash",
        )
        .await
        .expect("failed to create test user");

        let token = db::tokens::issue_token(self.pool(), &user.id, 24)
            .await
            .expect("failed to issue test token");

        TestUser { user, token }
    }

    /// Create a group chat owned by `owner` with `members` added.
    pub async fn create_group(&self, owner: &TestUser, name: &str, members: &[&TestUser]) -> Chat {
        let members: Vec<User> = members.iter().map(|m| m.user.clone()).collect();
        db::chats::create_chat(self.pool(), &owner.user, ChatType::Group, name, None, &members)
            .await
            .expect("failed to create test chat")
    }

    /// Number of sessions the hub currently holds.
    pub async fn session_count(&self) -> usize {
        self.state.hub.snapshot().await.unwrap().session_count()
    }

    /// Poll the hub until it holds `expected` sessions.
    pub async fn wait_for_sessions(&self, expected: usize) {
        for _ in 0..200 {
            if self.session_count().await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!(
            "hub never reached {expected} sessions (has {})",
            self.session_count().await
        );
    }
}

// ---------------------------------------------------------------------------
// WebSocket client helpers
// ---------------------------------------------------------------------------

/// Connect with `?token=` and wait until the hub has registered the session.
pub async fn connect(server: &TestServer, addr: &str, user: &TestUser) -> Client {
    let before = server.session_count().await;
    let (ws, _) = connect_async(format!("ws://{addr}/ws?token={}", user.token))
        .await
        .expect("websocket connect failed");
    server.wait_for_sessions(before + 1).await;
    ws
}

pub async fn send_json(ws: &mut Client, value: serde_json::Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("websocket send failed");
}

/// Next text frame as JSON, skipping pings. Panics after two seconds.
pub async fn recv_json(ws: &mut Client) -> serde_json::Value {
    let deadline = Duration::from_secs(2);
    loop {
        let msg = tokio::time::timeout(deadline, ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("websocket error");
        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// Assert that no text frame arrives within `wait`.
pub async fn assert_silent(ws: &mut Client, wait: Duration) {
    match tokio::time::timeout(wait, ws.next()).await {
        Err(_) => {}
        Ok(Some(Ok(Message::Text(text)))) => panic!("unexpected frame: {text}"),
        Ok(other) => panic!("unexpected stream event: {other:?}"),
    }
}

/// Join a room and consume the `joined_chat` acknowledgement.
pub async fn join(ws: &mut Client, chat_id: &str) {
    send_json(ws, serde_json::json!({ "type": "join_room", "chatId": chat_id })).await;
    let ack = recv_json(ws).await;
    assert_eq!(ack["type"], "joined_chat", "join failed: {ack}");
    assert_eq!(ack["chatId"], chat_id);
}

// ---------------------------------------------------------------------------
// Request builder helpers
// ---------------------------------------------------------------------------

/// Build an authenticated request with no body.
pub fn authenticated_request(method: Method, uri: &str, auth_header: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", auth_header)
        .body(Body::empty())
        .unwrap()
}

/// Build an authenticated request with a JSON body.
pub fn authenticated_json_request(
    method: Method,
    uri: &str,
    auth_header: &str,
    body: &serde_json::Value,
) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", auth_header)
        .header("Content-Type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

/// Build an unauthenticated request with a JSON body.
pub fn json_request(method: Method, uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

/// Parse a response body into a `serde_json::Value`.
pub async fn parse_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
