//! Bearer token resolution.
//!
//! The HTTP client asks an [`AuthToken`] for the current token before each
//! request. An explicitly set token wins; otherwise the injected
//! [`TokenProvider`] (typically the persisted login) is consulted. A
//! missing token is not an error: the request goes out unauthenticated and
//! the server decides.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

// ============================================================================
// TokenProvider
// ============================================================================

/// Source of a fallback bearer token.
pub trait TokenProvider: Send + Sync {
    /// Returns the token, if one is available.
    fn token(&self) -> Option<String>;
}

/// Provider that never has a token.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoToken;

impl TokenProvider for NoToken {
    #[inline]
    fn token(&self) -> Option<String> {
        None
    }
}

/// Provider returning a fixed token.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    /// Creates a provider for `token`.
    #[inline]
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StaticToken(***)")
    }
}

impl TokenProvider for StaticToken {
    #[inline]
    fn token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Provider reading an environment variable on every request.
#[derive(Debug, Clone)]
pub struct EnvToken {
    /// Variable name.
    var: String,
}

impl EnvToken {
    /// Default variable name.
    pub const DEFAULT_VAR: &'static str = "CONSOLE_AUTH_TOKEN";

    /// Creates a provider reading `var`.
    #[inline]
    #[must_use]
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvToken {
    fn default() -> Self {
        Self::new(Self::DEFAULT_VAR)
    }
}

impl TokenProvider for EnvToken {
    fn token(&self) -> Option<String> {
        std::env::var(&self.var).ok().filter(|t| !t.is_empty())
    }
}

impl<F> TokenProvider for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    #[inline]
    fn token(&self) -> Option<String> {
        self()
    }
}

// ============================================================================
// AuthToken
// ============================================================================

/// Mutable token cell owned by the transport.
pub struct AuthToken {
    /// Token set at runtime; overrides the provider.
    explicit: RwLock<Option<String>>,
    /// Fallback source.
    provider: Arc<dyn TokenProvider>,
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("explicit", &self.explicit.read().is_some())
            .finish_non_exhaustive()
    }
}

impl Default for AuthToken {
    fn default() -> Self {
        Self::new(Arc::new(NoToken))
    }
}

impl AuthToken {
    /// Creates a cell backed by `provider`.
    #[inline]
    #[must_use]
    pub fn new(provider: Arc<dyn TokenProvider>) -> Self {
        Self {
            explicit: RwLock::new(None),
            provider,
        }
    }

    /// Sets (or clears, with `None`) the runtime token.
    pub fn set(&self, token: Option<String>) {
        *self.explicit.write() = token.filter(|t| !t.is_empty());
    }

    /// Returns the token to send: runtime token first, then the provider.
    #[must_use]
    pub fn current(&self) -> Option<String> {
        if let Some(token) = self.explicit.read().as_ref() {
            return Some(token.clone());
        }
        self.provider.token().filter(|t| !t.is_empty())
    }

    /// Returns `true` if a token is available.
    #[inline]
    #[must_use]
    pub fn is_present(&self) -> bool {
        self.current().is_some()
    }
}

// ============================================================================
// Tests
// ============================================================================
