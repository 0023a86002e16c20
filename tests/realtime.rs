//! WebSocket push channel, heartbeat, reconnect and polling fallback.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use console_transport::{Client, ConnectionState, TransportOptions, names};
use serde_json::json;

use common::{MockBackend, MockState, init_tracing, record_events, wait_until};

const WAIT: Duration = Duration::from_secs(5);

fn live_options(backend: &MockBackend) -> TransportOptions {
    TransportOptions::new().with_base_url(backend.base_url())
}

#[tokio::test]
async fn test_pushed_event_is_dispatched() -> anyhow::Result<()> {
    init_tracing();
    let state = MockState::default();
    state
        .push_on_connect
        .lock()
        .push(r#"{"event":"lead-updated","data":{"id":5}}"#.to_string());
    let backend = MockBackend::spawn_with(state).await?;

    let client = backend.client(backend.options())?;
    let (_a, connected) = record_events(&client, names::WEBSOCKET_CONNECTED);
    let (_b, leads) = record_events(&client, "lead-updated");
    client.connect();

    assert!(wait_until(WAIT, || !leads.lock().is_empty()).await);
    assert_eq!(*leads.lock(), vec![json!({"id": 5})]);
    assert_eq!(*connected.lock(), vec![json!({"reconnected": false})]);
    assert_eq!(client.connection_state(), ConnectionState::Connected);
    Ok(())
}

#[tokio::test]
async fn test_pong_is_not_dispatched() -> anyhow::Result<()> {
    let state = MockState::default();
    state.push_on_connect.lock().extend([
        r#"{"type":"pong"}"#.to_string(),
        r#"{"event":"marker","data":1}"#.to_string(),
    ]);
    let backend = MockBackend::spawn_with(state).await?;

    let client = backend.client(backend.options())?;
    let (_a, pongs) = record_events(&client, names::PONG);
    let (_b, markers) = record_events(&client, "marker");
    client.connect();

    // Frames arrive in order, so the pong was handled before the marker.
    assert!(wait_until(WAIT, || !markers.lock().is_empty()).await);
    assert!(pongs.lock().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_token_sent_in_socket_query() -> anyhow::Result<()> {
    let backend = MockBackend::spawn().await?;
    let client = Client::builder()
        .options(live_options(&backend))
        .auth_token("t0k")
        .build()?;

    assert!(wait_until(WAIT, || !backend.state.ws_tokens.lock().is_empty()).await);
    assert_eq!(*backend.state.ws_tokens.lock(), vec![Some("t0k".to_string())]);
    drop(client);
    Ok(())
}

#[tokio::test]
async fn test_heartbeat_pings_are_sent() -> anyhow::Result<()> {
    let backend = MockBackend::spawn().await?;
    let options = live_options(&backend)
        .with_heartbeat(Duration::from_millis(30), Duration::from_secs(5));
    let client = backend.client(options)?;
    let (_sub, disconnected) = record_events(&client, names::WEBSOCKET_DISCONNECTED);

    assert!(wait_until(WAIT, || backend.state.pings_received() >= 2).await);
    assert!(disconnected.lock().is_empty());
    assert_eq!(client.connection_state(), ConnectionState::Connected);
    Ok(())
}

#[tokio::test]
async fn test_send_realtime_reaches_server() -> anyhow::Result<()> {
    let backend = MockBackend::spawn().await?;
    let client = backend.client(live_options(&backend))?;

    assert!(wait_until(WAIT, || client.connection_state() == ConnectionState::Connected).await);
    assert!(client.send_realtime("typing", json!({"chat": 1})));

    let received = wait_until(WAIT, || {
        backend
            .state
            .ws_received
            .lock()
            .contains(&json!({"type": "typing", "data": {"chat": 1}}))
    })
    .await;
    assert!(received);
    Ok(())
}

#[tokio::test]
async fn test_reconnects_after_server_close() -> anyhow::Result<()> {
    let state = MockState {
        close_first_socket: AtomicBool::new(true),
        ..MockState::default()
    };
    let backend = MockBackend::spawn_with(state).await?;
    let options = backend
        .options()
        .with_reconnect_backoff([Duration::from_millis(50)]);
    let client = backend.client(options)?;
    let (_a, connected) = record_events(&client, names::WEBSOCKET_CONNECTED);
    let (_b, disconnected) = record_events(&client, names::WEBSOCKET_DISCONNECTED);
    client.connect();

    assert!(wait_until(WAIT, || connected.lock().len() >= 2).await);
    assert_eq!(
        *connected.lock(),
        vec![json!({"reconnected": false}), json!({"reconnected": true})]
    );
    assert_eq!(
        *disconnected.lock(),
        vec![json!({"code": 4001, "reason": "kicked"})]
    );
    let connections = &backend.state.ws_connections;
    assert!(wait_until(WAIT, || connections.load(Ordering::SeqCst) == 2).await);
    assert!(!client.is_degraded());
    Ok(())
}

#[tokio::test]
async fn test_silent_server_times_out() -> anyhow::Result<()> {
    let state = MockState {
        silent: AtomicBool::new(true),
        ..MockState::default()
    };
    let backend = MockBackend::spawn_with(state).await?;
    let options = backend
        .options()
        .with_heartbeat(Duration::from_millis(30), Duration::from_millis(30))
        .with_reconnect_backoff([Duration::from_secs(60)]);
    let client = backend.client(options)?;
    let (_sub, disconnected) = record_events(&client, names::WEBSOCKET_DISCONNECTED);
    client.connect();

    assert!(wait_until(WAIT, || !disconnected.lock().is_empty()).await);
    assert_eq!(
        disconnected.lock()[0],
        json!({"code": 1006, "reason": "heartbeat timeout"})
    );
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    Ok(())
}

#[tokio::test]
async fn test_degrades_to_polling_after_max_attempts() -> anyhow::Result<()> {
    let backend = MockBackend::spawn().await?;
    let options = backend
        .options()
        .with_ws_path("/nows")
        .with_reconnect_backoff([Duration::from_millis(10)])
        .with_max_reconnect_attempts(2)
        .with_degraded_intervals(Duration::from_millis(50), Duration::from_secs(60));
    let client = backend.client(options)?;
    let (_a, modes) = record_events(&client, names::CONNECTION_MODE_CHANGED);
    let (_b, status) = record_events(&client, "system-status");
    client.connect();

    assert!(wait_until(WAIT, || status.lock().len() >= 2).await);
    assert!(client.is_degraded());
    assert_eq!(*modes.lock(), vec![json!({"mode": "polling"})]);

    let polls = backend.state.requests_to("/api/command");
    assert!(polls.len() >= 2);
    assert!(polls.iter().all(|r| r.body["command"] == "get-system-status"));
    assert_eq!(backend.state.requests_to("/nows").len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_hung_handshake_counts_as_failed_attempt() -> anyhow::Result<()> {
    // Accepts TCP connections and never answers the upgrade.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let options = TransportOptions::new()
        .with_base_url(format!("http://{addr}"))
        .without_auto_connect()
        .with_connect_timeout(Duration::from_millis(100))
        .with_reconnect_backoff([Duration::from_millis(10)])
        .with_max_reconnect_attempts(2)
        .with_degraded_intervals(Duration::from_secs(60), Duration::from_secs(60));
    let client = Client::builder().options(options).build()?;
    let (_a, disconnected) = record_events(&client, names::WEBSOCKET_DISCONNECTED);
    let (_b, modes) = record_events(&client, names::CONNECTION_MODE_CHANGED);
    client.connect();

    assert!(wait_until(WAIT, || client.is_degraded()).await);
    let disconnected = disconnected.lock();
    assert!(disconnected.len() >= 2);
    assert!(
        disconnected
            .iter()
            .all(|d| *d == json!({"code": 1006, "reason": "connect timeout"}))
    );
    assert_eq!(*modes.lock(), vec![json!({"mode": "polling"})]);
    Ok(())
}

#[tokio::test]
async fn test_shutdown_closes_socket() -> anyhow::Result<()> {
    let backend = MockBackend::spawn().await?;
    let client = backend.client(live_options(&backend))?;
    let _sub = client.on(names::WEBSOCKET_DISCONNECTED, |_| {});

    assert!(wait_until(WAIT, || client.connection_state() == ConnectionState::Connected).await);
    client.shutdown();

    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    assert_eq!(client.listener_count(names::WEBSOCKET_DISCONNECTED), 0);
    assert!(!client.send_realtime("typing", json!({})));

    // Torn down: no reconnect follows the close.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(backend.state.ws_connections.load(Ordering::SeqCst), 1);
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    Ok(())
}
