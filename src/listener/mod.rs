//! Subscriptions and event delivery.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ListenerRegistry`] | Channel → listeners, with `on`/`once`/remove/clear |
//! | [`Subscription`] | Disposal handle returned by `on`/`once` |
//! | [`Dispatcher`] | Delivers envelopes to listeners inside an [`UpdateContext`] |
//!
//! Both transports feed the same dispatcher, so a listener never needs to
//! know where an event came from.

// ============================================================================
// Submodules
// ============================================================================

/// Event dispatcher and host update context.
pub mod dispatch;

/// Listener registry and subscriptions.
pub mod registry;

// ============================================================================
// Re-exports
// ============================================================================

pub use dispatch::{DirectContext, Dispatcher, UpdateContext};
pub use registry::{Callback, ListenerRegistry, Subscription};
