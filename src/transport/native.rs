//! Native host transport.
//!
//! When the console runs inside a desktop shell, the shell exposes a
//! message-passing bridge. [`NativeTransport`] maps the public API straight
//! onto it: `send` and `invoke` go to the host, and inbound host messages
//! are re-dispatched through the local [`Dispatcher`] so listeners run
//! inside the configured update context.
//!
//! The transport keeps exactly one host listener per channel that has
//! local listeners; local `on`/`once` calls are fanned out from it.

// ============================================================================
// Imports
// ============================================================================

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::listener::{Callback, Dispatcher, Subscription};
use crate::protocol::mapping::failure_payload;
use crate::protocol::names;

// ============================================================================
// NativeHost
// ============================================================================

/// Handle the host returns for a registered listener.
pub type HostListenerId = u64;

/// The host shell's message-passing bridge.
///
/// Implementations wrap whatever IPC the shell provides. Callbacks passed
/// to [`NativeHost::on`] may be invoked from any thread.
#[async_trait]
pub trait NativeHost: Send + Sync {
    /// Posts a message without waiting for an answer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NativeHost`] if the bridge rejects the message.
    fn send(&self, channel: &str, payload: Value) -> Result<()>;

    /// Calls a host handler and waits for its answer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NativeHost`] if the handler fails.
    async fn invoke(&self, channel: &str, payload: Value) -> Result<Value>;

    /// Registers `callback` for messages on `channel`.
    fn on(&self, channel: &str, callback: Callback) -> HostListenerId;

    /// Removes one listener registered with [`NativeHost::on`].
    fn remove_listener(&self, channel: &str, id: HostListenerId);
}

// ============================================================================
// NativeTransport
// ============================================================================

/// Pass-through transport over a [`NativeHost`].
pub struct NativeTransport {
    /// Host bridge.
    host: Arc<dyn NativeHost>,
    /// Local fan-out.
    dispatcher: Arc<Dispatcher>,
    /// Channel → forwarding listener on the host.
    forwarders: Mutex<FxHashMap<String, HostListenerId>>,
}

impl std::fmt::Debug for NativeTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeTransport")
            .field("forwarded_channels", &self.forwarders.lock().len())
            .finish_non_exhaustive()
    }
}

impl NativeTransport {
    /// Creates a transport over `host`.
    #[must_use]
    pub fn new(host: Arc<dyn NativeHost>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            host,
            dispatcher,
            forwarders: Mutex::new(FxHashMap::default()),
        }
    }

    /// Posts `payload` to `channel`; failures are reported as events.
    pub fn send(&self, channel: &str, payload: Value) {
        if let Err(e) = self.host.send(channel, payload) {
            self.report_failure(channel, &e);
        }
    }

    /// Calls `channel` on the host.
    ///
    /// Returns the host's answer, or `{success: false, error}` on failure.
    pub async fn invoke(&self, channel: &str, payload: Value) -> Value {
        match self.host.invoke(channel, payload).await {
            Ok(value) => value,
            Err(e) => {
                self.report_failure(channel, &e);
                failure_payload(&e.to_string())
            }
        }
    }

    /// Registers a durable listener.
    pub fn on(&self, channel: &str, callback: Callback) -> Subscription {
        self.ensure_forwarder(channel);
        self.dispatcher
            .registry()
            .insert(channel.to_string(), callback, false)
    }

    /// Registers a one-shot listener.
    pub fn once(&self, channel: &str, callback: Callback) -> Subscription {
        self.ensure_forwarder(channel);
        self.dispatcher
            .registry()
            .insert(channel.to_string(), callback, true)
    }

    /// Removes every listener on `channel`, local and host-side.
    pub fn cleanup(&self, channel: &str) -> usize {
        let removed = self.dispatcher.registry().remove_all(channel);
        if let Some(id) = self.forwarders.lock().remove(channel) {
            self.host.remove_listener(channel, id);
        }
        removed
    }

    /// Removes every listener on every channel.
    pub fn cleanup_all(&self) -> usize {
        let removed = self.dispatcher.registry().clear();
        let forwarders: Vec<_> = self.forwarders.lock().drain().collect();
        for (channel, id) in forwarders {
            self.host.remove_listener(&channel, id);
        }
        removed
    }

    /// Number of channels currently forwarded from the host.
    #[inline]
    #[must_use]
    pub fn forwarded_channels(&self) -> usize {
        self.forwarders.lock().len()
    }

    /// Registers the host-side forwarder for `channel` if missing.
    fn ensure_forwarder(&self, channel: &str) {
        let mut forwarders = self.forwarders.lock();
        if forwarders.contains_key(channel) {
            return;
        }

        let dispatcher: Weak<Dispatcher> = Arc::downgrade(&self.dispatcher);
        let name = channel.to_string();
        let forward: Callback = Arc::new(move |payload: &Value| {
            if let Some(dispatcher) = dispatcher.upgrade() {
                dispatcher.emit(&name, payload.clone());
            }
        });

        let id = self.host.on(channel, forward);
        debug!(channel, host_listener = id, "Forwarding host channel");
        forwarders.insert(channel.to_string(), id);
    }

    fn report_failure(&self, channel: &str, error: &Error) {
        warn!(channel, error = %error, "Native host call failed");
        self.dispatcher.emit(
            names::CONNECTION_ERROR,
            json!({
                "error": error.to_string(),
                "message": format!("Host call `{channel}` failed"),
                "command": channel,
            }),
        );
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    /// In-memory host: records sends, echoes invokes, lets tests push messages.
    #[derive(Default)]
    struct MockHost {
        sent: Mutex<Vec<(String, Value)>>,
        listeners: Mutex<FxHashMap<HostListenerId, (String, Callback)>>,
        next_id: AtomicU64,
    }

    impl MockHost {
        fn push(&self, channel: &str, payload: Value) {
            let callbacks: Vec<Callback> = self
                .listeners
                .lock()
                .values()
                .filter(|(c, _)| c == channel)
                .map(|(_, cb)| Arc::clone(cb))
                .collect();
            for callback in callbacks {
                callback(&payload);
            }
        }
    }

    #[async_trait]
    impl NativeHost for MockHost {
        fn send(&self, channel: &str, payload: Value) -> Result<()> {
            if channel == "broken" {
                return Err(Error::native_host("bridge closed"));
            }
            self.sent.lock().push((channel.to_string(), payload));
            Ok(())
        }

        async fn invoke(&self, channel: &str, payload: Value) -> Result<Value> {
            match channel {
                "broken" => Err(Error::native_host("no handler")),
                _ => Ok(json!({"echo": payload})),
            }
        }

        fn on(&self, channel: &str, callback: Callback) -> HostListenerId {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            self.listeners.lock().insert(id, (channel.to_string(), callback));
            id
        }

        fn remove_listener(&self, _channel: &str, id: HostListenerId) {
            self.listeners.lock().remove(&id);
        }
    }

    fn transport() -> (NativeTransport, Arc<MockHost>) {
        let host = Arc::new(MockHost::default());
        let transport = NativeTransport::new(host.clone(), Arc::new(Dispatcher::direct()));
        (transport, host)
    }

    fn counter() -> (Arc<AtomicUsize>, Callback) {
        let hits = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&hits);
        let callback: Callback = Arc::new(move |_: &Value| {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        (hits, callback)
    }

    #[test]
    fn test_send_passes_through() {
        let (transport, host) = transport();
        transport.send("start-monitoring", json!({"interval": 5}));
        assert_eq!(
            *host.sent.lock(),
            vec![("start-monitoring".to_string(), json!({"interval": 5}))]
        );
    }

    #[tokio::test]
    async fn test_invoke_passes_through() {
        let (transport, _) = transport();
        let value = transport.invoke("get-accounts", json!({"page": 1})).await;
        assert_eq!(value, json!({"echo": {"page": 1}}));
    }

    #[tokio::test]
    async fn test_invoke_failure_resolves() {
        let (transport, _) = transport();
        let (errors, callback) = counter();
        let _sub = transport.on(names::CONNECTION_ERROR, callback);

        let value = transport.invoke("broken", json!({})).await;
        assert_eq!(value["success"], false);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_one_forwarder_per_channel() {
        let (transport, host) = transport();
        let (hits, callback) = counter();
        let _a = transport.on("accounts-updated", Arc::clone(&callback));
        let _b = transport.on("accounts-updated", callback);

        assert_eq!(host.listeners.lock().len(), 1);
        host.push("accounts-updated", json!([]));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_once_over_host() {
        let (transport, host) = transport();
        let (hits, callback) = counter();
        let _sub = transport.once("login-success", callback);

        host.push("login-success", json!({}));
        host.push("login-success", json!({}));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cleanup_removes_host_listener() {
        let (transport, host) = transport();
        let (hits, callback) = counter();
        let _sub = transport.on("lead-updated", callback);

        assert_eq!(transport.cleanup("lead-updated"), 1);
        assert_eq!(transport.cleanup("lead-updated"), 0);
        assert!(host.listeners.lock().is_empty());

        host.push("lead-updated", json!({}));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cleanup_all() {
        let (transport, host) = transport();
        let (_, callback) = counter();
        let _a = transport.on("a", Arc::clone(&callback));
        let _b = transport.on("b", callback);

        assert_eq!(transport.cleanup_all(), 2);
        assert_eq!(transport.forwarded_channels(), 0);
        assert!(host.listeners.lock().is_empty());
    }
}
