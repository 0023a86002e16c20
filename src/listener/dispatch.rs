//! Event dispatcher.
//!
//! Delivers envelopes from either transport to the listeners registered
//! for their name. All callbacks for one envelope run synchronously, in
//! registration order, inside one [`UpdateContext::run`] call so the host
//! UI observes the resulting state changes together.
//!
//! A panicking callback is caught and logged; the remaining callbacks for
//! the same envelope still run.

// ============================================================================
// Imports
// ============================================================================

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde_json::Value;
use tracing::{error, trace};

use crate::protocol::EventEnvelope;

use super::registry::ListenerRegistry;

// ============================================================================
// UpdateContext
// ============================================================================

/// The host UI framework's update cycle.
///
/// Implementations run `update` wherever state changes made by listeners
/// become visible to the UI (a render batch, a main-thread queue, ...).
/// `update` must be called exactly once before `run` returns.
pub trait UpdateContext: Send + Sync {
    /// Runs `update` inside the host's update cycle.
    fn run(&self, update: &mut dyn FnMut());
}

/// Runs updates inline on the dispatching task.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectContext;

impl UpdateContext for DirectContext {
    #[inline]
    fn run(&self, update: &mut dyn FnMut()) {
        update();
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Fans envelopes out to registered listeners.
pub struct Dispatcher {
    /// Listener registry.
    registry: ListenerRegistry,
    /// Host update cycle.
    context: Arc<dyn UpdateContext>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Creates a dispatcher over `registry`.
    #[inline]
    #[must_use]
    pub fn new(registry: ListenerRegistry, context: Arc<dyn UpdateContext>) -> Self {
        Self { registry, context }
    }

    /// Creates a dispatcher with a fresh registry and [`DirectContext`].
    #[inline]
    #[must_use]
    pub fn direct() -> Self {
        Self::new(ListenerRegistry::new(), Arc::new(DirectContext))
    }

    /// Returns the listener registry.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &ListenerRegistry {
        &self.registry
    }

    /// Dispatches `envelope` to its listeners.
    ///
    /// Returns the number of listeners invoked (including ones that panicked).
    pub fn dispatch(&self, envelope: EventEnvelope) -> usize {
        let callbacks = self.registry.take_for_dispatch(&envelope.name);
        if callbacks.is_empty() {
            trace!(event = %envelope.name, "No listeners");
            return 0;
        }

        let EventEnvelope { name, payload, .. } = envelope;
        let count = callbacks.len();

        self.context.run(&mut || {
            for callback in &callbacks {
                if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(&payload))) {
                    error!(
                        event = %name,
                        panic = %panic_message(panic.as_ref()),
                        "Listener panicked"
                    );
                }
            }
        });

        trace!(event = %name, listeners = count, "Event dispatched");
        count
    }

    /// Dispatches a locally produced event.
    #[inline]
    pub fn emit(&self, name: &str, payload: Value) -> usize {
        self.dispatch(EventEnvelope::new(name, payload))
    }
}

/// Best-effort text of a panic payload.
fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================
