//! The client facade.
//!
//! [`Client`] exposes one API regardless of the backing transport:
//!
//! | Method | Native host | Web |
//! |--------|-------------|-----|
//! | [`send`](Client::send) | host `send` | background HTTP call |
//! | [`invoke`](Client::invoke) | host `invoke` | HTTP call |
//! | [`on`](Client::on) / [`once`](Client::once) | host listener → dispatcher | dispatcher |
//! | [`cleanup`](Client::cleanup) | local + host listeners | local listeners |
//!
//! No method returns an error for network or host failures; those surface
//! as events and as `{success: false, error}` from `invoke`.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::identifiers::ClientId;
use crate::listener::{Callback, Dispatcher, Subscription};
use crate::transport::{AuthToken, ConnectionState, NativeTransport, WebTransport};

use super::builder::ClientBuilder;

// ============================================================================
// TransportMode
// ============================================================================

/// Which transport backs a [`Client`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportMode {
    /// Desktop shell bridge.
    Native,
    /// HTTP + WebSocket.
    Web,
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Native => "native",
            Self::Web => "web",
        })
    }
}

/// The selected transport.
#[derive(Debug)]
pub(crate) enum Backend {
    Native(NativeTransport),
    Web(WebTransport),
}

// ============================================================================
// Client
// ============================================================================

/// Uniform send / invoke / subscribe API over the selected transport.
///
/// Dropping the client tears the transport down.
pub struct Client {
    /// Identity for logs.
    id: ClientId,
    /// Backing transport.
    backend: Backend,
    /// Listener fan-out.
    dispatcher: Arc<Dispatcher>,
    /// Bearer token cell.
    auth: Arc<AuthToken>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("mode", &self.mode())
            .field("listeners", &self.dispatcher.registry().total_listeners())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Client - Construction
// ============================================================================

impl Client {
    /// Creates a builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub(crate) fn from_parts(
        id: ClientId,
        backend: Backend,
        dispatcher: Arc<Dispatcher>,
        auth: Arc<AuthToken>,
    ) -> Self {
        Self {
            id,
            backend,
            dispatcher,
            auth,
        }
    }

    /// Returns the client identity.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Returns the backing transport.
    #[inline]
    #[must_use]
    pub fn mode(&self) -> TransportMode {
        match self.backend {
            Backend::Native(_) => TransportMode::Native,
            Backend::Web(_) => TransportMode::Web,
        }
    }
}

// ============================================================================
// Client - Commands
// ============================================================================

impl Client {
    /// Fire-and-forget: issues `command` and returns immediately.
    ///
    /// The outcome arrives as events only.
    pub fn send(&self, command: &str, payload: Value) {
        match &self.backend {
            Backend::Native(native) => native.send(command, payload),
            Backend::Web(web) => web.send(command, payload),
        }
    }

    /// Issues `command` and waits for its result.
    ///
    /// Never fails: resolves to `{success: false, error}` when the call
    /// does. The command's events are emitted either way.
    pub async fn invoke(&self, command: &str, payload: Value) -> Value {
        match &self.backend {
            Backend::Native(native) => native.invoke(command, payload).await,
            Backend::Web(web) => web.invoke(command, payload).await,
        }
    }

    /// Writes a realtime `{type, data}` message.
    ///
    /// Over the web transport this needs an open WebSocket; returns `false`
    /// if the message was dropped.
    pub fn send_realtime(&self, kind: &str, data: Value) -> bool {
        match &self.backend {
            Backend::Native(native) => {
                native.send(kind, data);
                true
            }
            Backend::Web(web) => web.send_realtime(kind, data),
        }
    }

    /// Sets (or with `None`, clears) the bearer token.
    ///
    /// Applies to subsequent requests and reconnects.
    pub fn set_auth_token(&self, token: Option<String>) {
        self.auth.set(token);
    }
}

// ============================================================================
// Client - Listeners
// ============================================================================

impl Client {
    /// Subscribes to `channel` until the returned handle is disposed.
    pub fn on<F>(&self, channel: &str, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.subscribe(channel, Arc::new(callback), false)
    }

    /// Subscribes to the next event on `channel` only.
    pub fn once<F>(&self, channel: &str, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.subscribe(channel, Arc::new(callback), true)
    }

    /// Disposes `subscription`. Returns `false` if it was already disposed.
    pub fn off(&self, subscription: &Subscription) -> bool {
        subscription.unsubscribe()
    }

    /// Removes every listener on `channel`. Returns how many were removed.
    pub fn cleanup(&self, channel: &str) -> usize {
        match &self.backend {
            Backend::Native(native) => native.cleanup(channel),
            Backend::Web(web) => web.cleanup(channel),
        }
    }

    /// Removes every listener on every channel.
    pub fn cleanup_all(&self) -> usize {
        match &self.backend {
            Backend::Native(native) => native.cleanup_all(),
            Backend::Web(web) => web.cleanup_all(),
        }
    }

    /// Number of listeners on `channel`.
    #[must_use]
    pub fn listener_count(&self, channel: &str) -> usize {
        self.dispatcher.registry().listener_count(channel)
    }

    fn subscribe(&self, channel: &str, callback: Callback, once: bool) -> Subscription {
        match &self.backend {
            Backend::Native(native) if once => native.once(channel, callback),
            Backend::Native(native) => native.on(channel, callback),
            Backend::Web(web) => web.on(channel, callback, once),
        }
    }
}

// ============================================================================
// Client - Lifecycle
// ============================================================================

impl Client {
    /// Opens the WebSocket when built without `auto_connect`.
    ///
    /// Must be called within a Tokio runtime. No-op for the native transport.
    pub fn connect(&self) {
        if let Backend::Web(web) = &self.backend {
            web.connect();
        }
    }

    /// Tears the transport down: closes the socket, stops every timer and
    /// drops every listener. Idempotent; also run on drop.
    pub fn shutdown(&self) {
        let removed = self.cleanup_all();
        if let Backend::Web(web) = &self.backend {
            web.shutdown();
        }
        if removed > 0 {
            info!(client = %self.id, listeners = removed, "Client shut down");
        }
    }

    /// Returns the push channel state.
    ///
    /// The native bridge is always reported as connected.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        match &self.backend {
            Backend::Native(_) => ConnectionState::Connected,
            Backend::Web(web) => web.state(),
        }
    }

    /// Returns `true` while the web transport polls instead of pushing.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        match &self.backend {
            Backend::Native(_) => false,
            Backend::Web(web) => web.is_degraded(),
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// Tests
// ============================================================================
