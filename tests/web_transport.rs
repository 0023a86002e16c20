//! HTTP command path against the mock backend.

mod common;

use std::time::Duration;

use console_transport::{Client, TransportOptions, names};
use serde_json::json;

use common::{MockBackend, init_tracing, record_events};

#[tokio::test]
async fn test_unregistered_command_posts_envelope() -> anyhow::Result<()> {
    init_tracing();
    let backend = MockBackend::spawn().await?;
    let client = backend.client(backend.options())?;
    let (_sub, results) = record_events(&client, "custom-report-export-result");

    let reply = client.invoke("custom-report-export", json!({"id": 7})).await;

    assert_eq!(reply, json!({"success": true, "data": {"url": "x"}}));
    let requests = backend.state.requests_to("/api/command");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "POST");
    assert_eq!(
        requests[0].body,
        json!({"command": "custom-report-export", "payload": {"id": 7}})
    );
    assert_eq!(
        *results.lock(),
        vec![json!({"success": true, "data": {"url": "x"}})]
    );
    Ok(())
}

#[tokio::test]
async fn test_path_templating_and_bearer_token() -> anyhow::Result<()> {
    let backend = MockBackend::spawn().await?;
    let client = backend.client(backend.options())?;
    client.set_auth_token(Some("t0k".into()));
    let (_sub, updated) = record_events(&client, "account-updated");

    client
        .invoke("update-account", json!({"id": 42, "name": "ops"}))
        .await;

    let requests = backend.state.requests_to("/api/v1/accounts/42");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "PUT");
    assert_eq!(requests[0].authorization.as_deref(), Some("Bearer t0k"));
    assert_eq!(requests[0].body, json!({"id": 42, "name": "ops"}));
    assert_eq!(
        *updated.lock(),
        vec![json!({"success": true, "data": {"id": 42}})]
    );
    Ok(())
}

#[tokio::test]
async fn test_public_command_skips_auth_header() -> anyhow::Result<()> {
    let backend = MockBackend::spawn().await?;
    let client = Client::builder()
        .options(backend.options())
        .auth_token("t0k")
        .build()?;

    client.invoke("get-health", json!({})).await;

    let requests = backend.state.requests_to("/api/health");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].authorization, None);
    Ok(())
}

#[tokio::test]
async fn test_unauthorized_emits_auth_error_and_failure() -> anyhow::Result<()> {
    let backend = MockBackend::spawn().await?;
    let client = backend.client(backend.options())?;
    let (_a, connection_errors) = record_events(&client, names::CONNECTION_ERROR);
    let (_b, auth_errors) = record_events(&client, names::AUTH_ERROR);
    let (_c, accounts) = record_events(&client, "accounts-updated");

    let reply = client.invoke("get-accounts", json!({})).await;

    assert_eq!(reply, json!({"success": false, "error": "unauthorized"}));
    assert_eq!(backend.state.requests_to("/api/v1/accounts")[0].authorization, None);

    let connection_errors = connection_errors.lock();
    assert_eq!(connection_errors.len(), 1);
    assert_eq!(connection_errors[0]["command"], "get-accounts");
    assert_eq!(connection_errors[0]["error"], "unauthorized");
    assert_eq!(auth_errors.lock().len(), 1);
    assert_eq!(
        *accounts.lock(),
        vec![json!({"success": false, "error": "unauthorized"})]
    );
    Ok(())
}

#[tokio::test]
async fn test_server_error_without_json_body() -> anyhow::Result<()> {
    let backend = MockBackend::spawn().await?;
    let client = backend.client(backend.options())?;
    let (_a, auth_errors) = record_events(&client, names::AUTH_ERROR);
    let (_b, stats) = record_events(&client, "dashboard-stats");

    let reply = client.invoke("get-dashboard-stats", json!({})).await;

    assert_eq!(reply["success"], false);
    assert_eq!(reply["error"], "Internal Server Error");
    assert!(auth_errors.lock().is_empty());
    assert_eq!(stats.lock().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_connection_confirmed_fires_once() -> anyhow::Result<()> {
    let backend = MockBackend::spawn().await?;
    let client = backend.client(backend.options())?;
    let (_sub, confirmed) = record_events(&client, names::CONNECTION_CONFIRMED);

    client.invoke("get-system-status", json!({})).await;
    client.invoke("get-health", json!({})).await;
    client.invoke("get-system-status", json!({})).await;

    assert_eq!(confirmed.lock().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_login_requires_code() -> anyhow::Result<()> {
    let backend = MockBackend::spawn().await?;
    let client = backend.client(backend.options())?;
    let (_a, code) = record_events(&client, "login-requires-code");
    let (_b, twofa) = record_events(&client, "login-requires-2fa");
    let (_c, success) = record_events(&client, "login-success");
    let (_d, error) = record_events(&client, "login-error");

    client
        .invoke("login-account", json!({"accountId": 7, "phone": "+1555"}))
        .await;

    assert_eq!(backend.state.requests_to("/api/v1/accounts/7/login").len(), 1);
    assert_eq!(
        *code.lock(),
        vec![json!({"phone": "+1555", "phoneCodeHash": "abc"})]
    );
    assert!(twofa.lock().is_empty());
    assert!(success.lock().is_empty());
    assert!(error.lock().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_get_sends_query_string() -> anyhow::Result<()> {
    let backend = MockBackend::spawn().await?;
    let client = backend.client(backend.options())?;
    client.set_auth_token(Some("t0k".into()));

    client.invoke("get-accounts", json!({"page": 2})).await;

    let requests = backend.state.requests_to("/api/v1/accounts");
    assert_eq!(requests[0].query.as_deref(), Some("page=2"));
    assert_eq!(requests[0].body, serde_json::Value::Null);
    Ok(())
}

#[tokio::test]
async fn test_embedded_events_dispatched() -> anyhow::Result<()> {
    let backend = MockBackend::spawn().await?;
    let client = backend.client(backend.options())?;
    let (_a, toasts) = record_events(&client, "toast");
    let (_b, status) = record_events(&client, "monitoring-status");

    client.invoke("start-monitoring", json!({})).await;

    assert_eq!(*toasts.lock(), vec![json!("started")]);
    assert_eq!(status.lock().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_send_is_fire_and_forget() -> anyhow::Result<()> {
    let backend = MockBackend::spawn().await?;
    let client = backend.client(backend.options())?;
    let (_sub, results) = record_events(&client, "custom-report-export-result");

    client.send("custom-report-export", json!({"id": 1}));

    let seen = common::wait_until(Duration::from_secs(5), || !results.lock().is_empty()).await;
    assert!(seen);
    Ok(())
}

#[tokio::test]
async fn test_unreachable_backend_resolves_with_failure() -> anyhow::Result<()> {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        listener.local_addr()?.port()
    };
    let client = Client::builder()
        .options(
            TransportOptions::new()
                .with_base_url(format!("http://127.0.0.1:{port}"))
                .without_auto_connect(),
        )
        .build()?;
    let (_a, errors) = record_events(&client, names::CONNECTION_ERROR);
    let (_b, results) = record_events(&client, "whatever-result");

    let reply = client.invoke("whatever", json!({})).await;

    assert_eq!(reply["success"], false);
    assert_eq!(errors.lock().len(), 1);
    assert_eq!(results.lock()[0]["success"], false);
    Ok(())
}
