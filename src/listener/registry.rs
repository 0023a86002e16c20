//! Listener registry.
//!
//! Tracks active subscriptions per channel (event name). Each channel maps
//! listener ids to entries; ids are allocated monotonically, so iterating a
//! channel yields listeners in registration order and removing one listener
//! does not scan the others.
//!
//! # Example
//!
//! ```
//! use console_transport::listener::ListenerRegistry;
//!
//! let registry = ListenerRegistry::new();
//! let sub = registry.on("accounts-updated", |payload| {
//!     println!("accounts: {payload}");
//! });
//!
//! assert_eq!(registry.listener_count("accounts-updated"), 1);
//! sub.unsubscribe();
//! sub.unsubscribe(); // no-op
//! assert_eq!(registry.listener_count("accounts-updated"), 0);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::trace;

use crate::identifiers::ListenerId;

// ============================================================================
// Types
// ============================================================================

/// Listener callback.
///
/// Receives the event payload. Runs on the dispatching task, inside the
/// configured [`UpdateContext`](super::UpdateContext).
pub type Callback = Arc<dyn Fn(&Value) + Send + Sync>;

/// One registered listener.
struct ListenerEntry {
    /// The callback.
    callback: Callback,
    /// Removed right before its first invocation.
    once: bool,
}

/// Channel → (id → entry).
type ChannelMap = FxHashMap<String, BTreeMap<ListenerId, ListenerEntry>>;

// ============================================================================
// ListenerRegistry
// ============================================================================

/// Registry of listeners keyed by channel.
///
/// Cheap to clone; clones share the same maps.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    /// Shared channel map.
    channels: Arc<Mutex<ChannelMap>>,
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let channels = self.channels.lock();
        f.debug_struct("ListenerRegistry")
            .field("channels", &channels.len())
            .field(
                "listeners",
                &channels.values().map(BTreeMap::len).sum::<usize>(),
            )
            .finish()
    }
}

impl ListenerRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a durable listener.
    pub fn on<F>(&self, channel: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.insert(channel.into(), Arc::new(callback), false)
    }

    /// Registers a listener that fires at most once.
    ///
    /// The entry is removed immediately before its first invocation, so
    /// concurrent dispatches cannot both run it.
    pub fn once<F>(&self, channel: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.insert(channel.into(), Arc::new(callback), true)
    }

    /// Registers an already shared callback.
    pub(crate) fn insert(&self, channel: String, callback: Callback, once: bool) -> Subscription {
        let id = ListenerId::generate();
        self.channels
            .lock()
            .entry(channel.clone())
            .or_default()
            .insert(id, ListenerEntry { callback, once });

        trace!(%channel, %id, once, "Listener registered");

        Subscription {
            channel,
            id,
            channels: Arc::downgrade(&self.channels),
            disposed: AtomicBool::new(false),
        }
    }

    /// Removes the listener behind `subscription`.
    ///
    /// Returns `true` if this call removed it.
    pub fn remove(&self, subscription: &Subscription) -> bool {
        subscription.unsubscribe()
    }

    /// Removes every listener on `channel`.
    ///
    /// Returns the number removed; zero for an unknown channel.
    pub fn remove_all(&self, channel: &str) -> usize {
        let removed = self
            .channels
            .lock()
            .remove(channel)
            .map_or(0, |entries| entries.len());
        trace!(%channel, removed, "Channel listeners removed");
        removed
    }

    /// Removes every listener on every channel.
    ///
    /// Returns the number removed.
    pub fn clear(&self) -> usize {
        let drained: Vec<_> = self.channels.lock().drain().collect();
        let removed = drained.iter().map(|(_, entries)| entries.len()).sum();
        trace!(removed, "All listeners removed");
        removed
    }

    /// Returns the number of listeners on `channel`.
    #[must_use]
    pub fn listener_count(&self, channel: &str) -> usize {
        self.channels.lock().get(channel).map_or(0, BTreeMap::len)
    }

    /// Returns the total number of listeners.
    #[must_use]
    pub fn total_listeners(&self) -> usize {
        self.channels.lock().values().map(BTreeMap::len).sum()
    }

    /// Returns `true` if `channel` has at least one listener.
    #[must_use]
    pub fn has_listeners(&self, channel: &str) -> bool {
        self.listener_count(channel) > 0
    }

    /// Returns the channels with at least one listener.
    #[must_use]
    pub fn channels(&self) -> Vec<String> {
        self.channels.lock().keys().cloned().collect()
    }

    /// Returns the callbacks to run for one dispatch of `channel`, in
    /// registration order.
    ///
    /// One-shot entries are removed under the same lock that takes the
    /// snapshot, so each fires in exactly one dispatch.
    pub(crate) fn take_for_dispatch(&self, channel: &str) -> Vec<Callback> {
        let mut channels = self.channels.lock();
        let Some(entries) = channels.get_mut(channel) else {
            return Vec::new();
        };

        let callbacks = entries
            .values()
            .map(|entry| Arc::clone(&entry.callback))
            .collect();

        entries.retain(|_, entry| !entry.once);
        if entries.is_empty() {
            channels.remove(channel);
        }

        callbacks
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// Handle to one registered listener.
///
/// Its only capability is disposal. Dropping the handle does **not**
/// remove the listener.
pub struct Subscription {
    /// Channel the listener is registered on.
    channel: String,
    /// Listener id.
    id: ListenerId,
    /// Registry maps; dead once the registry is gone.
    channels: Weak<Mutex<ChannelMap>>,
    /// Set by the first [`Subscription::unsubscribe`].
    disposed: AtomicBool,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .field("id", &self.id)
            .field("disposed", &self.disposed.load(Ordering::Relaxed))
            .finish()
    }
}

impl Subscription {
    /// Removes the listener. Idempotent.
    ///
    /// Returns `true` only for the call that actually removed the entry;
    /// later calls, or calls after a one-shot listener already fired or the
    /// channel was cleared, return `false`.
    pub fn unsubscribe(&self) -> bool {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return false;
        }

        let Some(channels) = self.channels.upgrade() else {
            return false;
        };

        let mut channels = channels.lock();
        let Some(entries) = channels.get_mut(&self.channel) else {
            return false;
        };

        let removed = entries.remove(&self.id).is_some();
        if entries.is_empty() {
            channels.remove(&self.channel);
        }

        trace!(channel = %self.channel, id = %self.id, removed, "Listener unsubscribed");
        removed
    }

    /// Returns the channel name.
    #[inline]
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Returns the listener id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Returns `true` while the listener is still registered.
    #[must_use]
    pub fn is_active(&self) -> bool {
        if self.disposed.load(Ordering::Acquire) {
            return false;
        }
        self.channels.upgrade().is_some_and(|channels| {
            channels
                .lock()
                .get(&self.channel)
                .is_some_and(|entries| entries.contains_key(&self.id))
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
