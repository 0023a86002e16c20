//! Error types for the console transport.
//!
//! This module defines all error types used throughout the crate.
//!
//! Errors never escape [`Client::send`](crate::Client::send) or
//! [`Client::invoke`](crate::Client::invoke): those paths convert every
//! failure into a `{ "success": false, "error": ... }` value plus emitted
//! events. [`Error`] surfaces on construction paths, inside the transport
//! runners, and from [`NativeHost`](crate::transport::NativeHost)
//! implementations.
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::ConnectionClosed`] |
//! | Protocol | [`Error::InvalidArgument`], [`Error::Protocol`] |
//! | HTTP | [`Error::HttpStatus`] |
//! | Native host | [`Error::NativeHost`] |
//! | External | [`Error::Http`], [`Error::WebSocket`], [`Error::Json`], [`Error::Url`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when client options are invalid (bad base URL, bad
    /// environment value).
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// The push channel is not open; the frame was not queued.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Invalid argument (unresolvable path parameter, bad header value).
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    /// Malformed frame or response body.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // HTTP Errors
    // ========================================================================
    /// Server answered with a status code of 400 or above.
    #[error("HTTP {status}: {message}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the body, or the canonical reason.
        message: String,
    },

    // ========================================================================
    // Native Host Errors
    // ========================================================================
    /// The native host bridge rejected or failed a call.
    #[error("Native host error: {message}")]
    NativeHost {
        /// Description from the host.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates an HTTP status error.
    #[inline]
    pub fn http_status(status: u16, message: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            message: message.into(),
        }
    }

    /// Creates a native host error.
    #[inline]
    pub fn native_host(message: impl Into<String>) -> Self {
        Self::NativeHost {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a connection-level failure.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        match self {
            Self::ConnectionClosed | Self::WebSocket(_) => true,
            Self::Http(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }

    /// Returns `true` if the server rejected the credentials (HTTP 401).
    #[inline]
    #[must_use]
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Self::HttpStatus { status: 401, .. })
    }

    /// Returns the HTTP status code, if this error carries one.
    #[inline]
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            other => other.is_connection_error(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
