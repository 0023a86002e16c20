//! In-process mock console backend for integration tests.
//!
//! Serves the REST routes, the generic command endpoint and `/ws` with
//! axum, and records everything it receives.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Json;
use console_transport::{Client, Subscription, TransportOptions};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;

// ============================================================================
// Recorded Requests
// ============================================================================

/// One HTTP request as the backend saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub body: Value,
}

/// Shared backend state.
#[derive(Default)]
pub struct MockState {
    pub requests: Mutex<Vec<Recorded>>,
    pub ws_connections: AtomicUsize,
    pub ws_tokens: Mutex<Vec<Option<String>>>,
    pub ws_received: Mutex<Vec<Value>>,
    /// Frames pushed to every socket right after it opens.
    pub push_on_connect: Mutex<Vec<String>>,
    /// Close the first socket right after the pushes.
    pub close_first_socket: AtomicBool,
    /// Never answer pings.
    pub silent: AtomicBool,
}

impl MockState {
    pub fn requests_to(&self, path: &str) -> Vec<Recorded> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }

    pub fn pings_received(&self) -> usize {
        self.ws_received
            .lock()
            .iter()
            .filter(|frame| frame["type"] == "ping")
            .count()
    }
}

// ============================================================================
// MockBackend
// ============================================================================

pub struct MockBackend {
    pub addr: SocketAddr,
    pub state: Arc<MockState>,
}

impl MockBackend {
    pub async fn spawn() -> anyhow::Result<Self> {
        Self::spawn_with(MockState::default()).await
    }

    pub async fn spawn_with(state: MockState) -> anyhow::Result<Self> {
        let state = Arc::new(state);
        let app = Router::new()
            .route("/ws", get(upgrade))
            .fallback(record)
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self { addr, state })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Options pointing at this backend, WebSocket not auto-connected.
    pub fn options(&self) -> TransportOptions {
        TransportOptions::new()
            .with_base_url(self.base_url())
            .without_auto_connect()
    }

    pub fn client(&self, options: TransportOptions) -> anyhow::Result<Client> {
        Ok(Client::builder().options(options).build()?)
    }
}

// ============================================================================
// HTTP
// ============================================================================

async fn record(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let authorization = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let response = respond(method.as_str(), uri.path(), authorization.is_some(), &body);

    state.requests.lock().push(Recorded {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        authorization,
        body,
    });

    response
}

fn respond(method: &str, path: &str, authorized: bool, body: &Value) -> Response {
    match (method, path) {
        ("POST", "/api/command") => match body["command"].as_str() {
            Some("custom-report-export") => {
                Json(json!({"success": true, "data": {"url": "x"}})).into_response()
            }
            Some("get-system-status") => {
                Json(json!({"success": true, "data": {"status": "ok"}})).into_response()
            }
            _ => (StatusCode::BAD_REQUEST, Json(json!({"error": "unknown command"}))).into_response(),
        },
        ("GET", "/api/v1/accounts") if !authorized => {
            (StatusCode::UNAUTHORIZED, Json(json!({"error": "unauthorized"}))).into_response()
        }
        ("GET", "/api/v1/accounts") => Json(json!({"accounts": [{"id": 1}]})).into_response(),
        ("PUT", p) if p.starts_with("/api/v1/accounts/") => {
            Json(json!({"success": true, "data": {"id": 42}})).into_response()
        }
        ("POST", "/api/v1/accounts/7/login") => Json(json!({
            "success": true,
            "requires_code": true,
            "phone": "+1555",
            "phone_code_hash": "abc",
        }))
        .into_response(),
        ("GET", "/api/health") => Json(json!({"status": "ok"})).into_response(),
        ("POST", "/api/v1/monitoring/start") => Json(json!({
            "success": true,
            "events": [{"name": "toast", "data": "started"}],
        }))
        .into_response(),
        ("GET", "/api/v1/dashboard/stats") => {
            (StatusCode::INTERNAL_SERVER_ERROR, "upstream down").into_response()
        }
        _ => (StatusCode::NOT_FOUND, Json(json!({"error": "not found"}))).into_response(),
    }
}

// ============================================================================
// WebSocket
// ============================================================================

async fn upgrade(
    State(state): State<Arc<MockState>>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    state.ws_tokens.lock().push(params.get("token").cloned());
    ws.on_upgrade(move |socket| serve_socket(socket, state))
}

async fn serve_socket(mut socket: WebSocket, state: Arc<MockState>) {
    let n = state.ws_connections.fetch_add(1, Ordering::SeqCst) + 1;

    let frames = state.push_on_connect.lock().clone();
    for frame in frames {
        if socket.send(Message::Text(frame.into())).await.is_err() {
            return;
        }
    }

    if n == 1 && state.close_first_socket.load(Ordering::SeqCst) {
        let frame = CloseFrame {
            code: 4001,
            reason: "kicked".into(),
        };
        let _ = socket.send(Message::Close(Some(frame))).await;
        return;
    }

    while let Some(Ok(message)) = socket.recv().await {
        let Message::Text(text) = message else {
            continue;
        };
        let frame: Value = serde_json::from_str(text.as_str()).unwrap_or(Value::Null);
        let is_ping = frame["type"] == "ping";
        state.ws_received.lock().push(frame);

        if is_ping && !state.silent.load(Ordering::SeqCst) {
            let pong = Message::Text(r#"{"type":"pong"}"#.into());
            if socket.send(pong).await.is_err() {
                return;
            }
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Collects every payload emitted on `event`.
pub fn record_events(client: &Client, event: &str) -> (Subscription, Arc<Mutex<Vec<Value>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let sub = client.on(event, move |payload| sink.lock().push(payload.clone()));
    (sub, seen)
}

/// Polls `condition` every 10ms for up to `timeout`.
pub async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
