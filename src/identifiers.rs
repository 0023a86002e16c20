//! Type-safe identifiers.
//!
//! Newtype wrappers keep listener handles, socket epochs and client
//! identities from being mixed up.
//!
//! | Type | Backing | Purpose |
//! |------|---------|---------|
//! | [`ListenerId`] | `u64` | One registered listener; ordering = registration order |
//! | [`ConnectionEpoch`] | `u64` | One WebSocket connection attempt |
//! | [`ClientId`] | UUID v4 | One [`Client`](crate::Client) instance, for logs |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

// ============================================================================
// ListenerId
// ============================================================================

/// Process-wide counter backing [`ListenerId::generate`].
static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of one registered listener.
///
/// Ids are allocated from a monotonic counter, so comparing two ids
/// compares their registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Allocates the next listener id.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

// ============================================================================
// ConnectionEpoch
// ============================================================================

/// Identifier of one WebSocket connection attempt.
///
/// Inputs produced by a socket task carry the epoch they were started
/// with; the manager ignores inputs from superseded epochs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ConnectionEpoch(u64);

impl ConnectionEpoch {
    /// The epoch before any connection attempt.
    #[inline]
    #[must_use]
    pub const fn initial() -> Self {
        Self(0)
    }

    /// Returns the following epoch.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "epoch#{}", self.0)
    }
}

// ============================================================================
// ClientId
// ============================================================================

/// Identity of one client instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(Uuid);

impl ClientId {
    /// Generates a random client id.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[inline]
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_ids_are_ordered() {
        let first = ListenerId::generate();
        let second = ListenerId::generate();
        assert!(first < second);
        assert_ne!(first, second);
    }

    #[test]
    fn test_epoch_next() {
        let epoch = ConnectionEpoch::initial();
        assert_eq!(epoch.as_u64(), 0);
        assert_eq!(epoch.next().as_u64(), 1);
        assert_eq!(epoch.next().to_string(), "epoch#1");
    }

    #[test]
    fn test_client_id_unique() {
        assert_ne!(ClientId::generate(), ClientId::generate());
    }
}
