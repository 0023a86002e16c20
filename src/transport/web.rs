//! Web transport: HTTP commands plus the WebSocket push channel.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Value;
use tokio::runtime::Handle;
use url::Url;

use crate::client::TransportOptions;
use crate::error::{Error, Result};
use crate::identifiers::ClientId;
use crate::listener::{Callback, Dispatcher, Subscription};
use crate::protocol::OutboundRequest;

use super::auth::AuthToken;
use super::connection::ConnectionManager;
use super::http::HttpClient;
use super::state::ConnectionState;

// ============================================================================
// WebTransport
// ============================================================================

/// HTTP command client and WebSocket connection manager sharing one
/// dispatcher and one token cell.
#[derive(Debug)]
pub struct WebTransport {
    /// Event sink shared with both halves.
    dispatcher: Arc<Dispatcher>,
    /// Commands.
    http: Arc<HttpClient>,
    /// Push channel.
    connection: ConnectionManager,
}

impl WebTransport {
    /// Assembles the web stack. Does not connect.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        client_id: ClientId,
        base_url: &Url,
        ws_url: Url,
        options: &TransportOptions,
        auth: Arc<AuthToken>,
        dispatcher: Arc<Dispatcher>,
    ) -> Result<Self> {
        let http = Arc::new(HttpClient::new(
            base_url,
            &options.command_path,
            options.request_timeout,
            Arc::clone(&auth),
            Arc::clone(&dispatcher),
        )?);

        let connection = ConnectionManager::new(
            client_id,
            ws_url,
            options.reconnect_policy(),
            options.polling_config(),
            auth,
            Arc::clone(&dispatcher),
            Arc::clone(&http),
        );

        Ok(Self {
            dispatcher,
            http,
            connection,
        })
    }

    /// Issues `command` in the background; results arrive as events.
    ///
    /// Outside a Tokio runtime the command cannot run, so its failure
    /// events are emitted before this returns.
    pub fn send(&self, command: &str, payload: Value) {
        let Ok(runtime) = Handle::try_current() else {
            let request = OutboundRequest::new(command, payload);
            let error = Error::config("no Tokio runtime to run the command");
            let _ = self.http.on_failure(&request, &error);
            return;
        };

        let http = Arc::clone(&self.http);
        let command = command.to_string();
        runtime.spawn(async move {
            http.invoke(&command, payload).await;
        });
    }

    /// Issues `command` and resolves to its reply or `{success: false, error}`.
    pub async fn invoke(&self, command: &str, payload: Value) -> Value {
        self.http.invoke(command, payload).await
    }

    /// Registers a listener.
    pub fn on(&self, channel: &str, callback: Callback, once: bool) -> Subscription {
        self.dispatcher
            .registry()
            .insert(channel.to_string(), callback, once)
    }

    /// Removes every listener on `channel`.
    pub fn cleanup(&self, channel: &str) -> usize {
        self.dispatcher.registry().remove_all(channel)
    }

    /// Removes every listener.
    pub fn cleanup_all(&self) -> usize {
        self.dispatcher.registry().clear()
    }

    /// Opens the push channel.
    pub fn connect(&self) {
        self.connection.connect();
    }

    /// Closes the push channel and stops every timer.
    pub fn shutdown(&self) {
        self.connection.shutdown();
    }

    /// Writes a `{type, data}` frame on the open socket.
    pub fn send_realtime(&self, kind: &str, data: Value) -> bool {
        self.connection.send_realtime(kind, data)
    }

    /// Returns the push channel state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Returns `true` while polling instead of pushing.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.connection.is_degraded()
    }

    /// Returns `true` once any HTTP request has succeeded.
    #[must_use]
    pub fn is_reachable(&self) -> bool {
        self.http.is_reachable()
    }
}
