//! Transport configuration.
//!
//! Holds endpoints and timing for the web transport. The native transport
//! ignores everything here.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use console_transport::TransportOptions;
//!
//! let options = TransportOptions::new()
//!     .with_base_url("https://console.example.com")
//!     .with_request_timeout(Duration::from_secs(10))
//!     .with_max_reconnect_attempts(5);
//!
//! assert_eq!(options.ws_path, "/ws");
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::transport::ReconnectPolicy;
use crate::transport::connection::PollingConfig;

// ============================================================================
// Constants
// ============================================================================

/// Default backend address.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";

/// Default generic command endpoint.
pub const DEFAULT_COMMAND_PATH: &str = "/api/command";

/// Default WebSocket path.
pub const DEFAULT_WS_PATH: &str = "/ws";

/// Default polling command while degraded.
pub const DEFAULT_POLLING_COMMAND: &str = "get-system-status";

/// Reconnect delays indexed by consecutive failures.
const DEFAULT_BACKOFF_SECS: [u64; 6] = [1, 2, 4, 8, 16, 30];

/// Environment variables read by [`TransportOptions::from_env`].
pub mod env {
    /// Backend base URL.
    pub const BASE_URL: &str = "CONSOLE_BASE_URL";
    /// WebSocket path.
    pub const WS_PATH: &str = "CONSOLE_WS_PATH";
    /// Generic command path.
    pub const COMMAND_PATH: &str = "CONSOLE_COMMAND_PATH";
    /// Request timeout in milliseconds.
    pub const REQUEST_TIMEOUT_MS: &str = "CONSOLE_REQUEST_TIMEOUT_MS";
    /// `true`/`false`: connect the WebSocket on build.
    pub const AUTO_CONNECT: &str = "CONSOLE_AUTO_CONNECT";
}

// ============================================================================
// TransportOptions
// ============================================================================

/// Web transport configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    /// Backend base URL (`http` or `https`).
    pub base_url: String,

    /// Generic command endpoint path.
    pub command_path: String,

    /// WebSocket path.
    pub ws_path: String,

    /// Per-request HTTP timeout.
    pub request_timeout: Duration,

    /// Interval between pings.
    pub heartbeat_interval: Duration,

    /// Grace period on top of the heartbeat interval.
    pub pong_timeout: Duration,

    /// Deadline for the WebSocket handshake.
    pub connect_timeout: Duration,

    /// Reconnect delays; the last entry repeats.
    pub reconnect_backoff: Vec<Duration>,

    /// Consecutive failures before degraded mode.
    pub max_reconnect_attempts: u32,

    /// Polling interval while degraded.
    pub polling_interval: Duration,

    /// Reconnect interval while degraded.
    pub background_reconnect_interval: Duration,

    /// Command issued by each poll.
    pub polling_command: String,

    /// Open the WebSocket when the client is built.
    pub auto_connect: bool,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl TransportOptions {
    /// Creates options with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            command_path: DEFAULT_COMMAND_PATH.to_string(),
            ws_path: DEFAULT_WS_PATH.to_string(),
            request_timeout: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            reconnect_backoff: DEFAULT_BACKOFF_SECS.map(Duration::from_secs).to_vec(),
            max_reconnect_attempts: 10,
            polling_interval: Duration::from_secs(30),
            background_reconnect_interval: Duration::from_secs(60),
            polling_command: DEFAULT_POLLING_COMMAND.to_string(),
            auto_connect: true,
        }
    }

    /// Loads options from the environment, after loading `.env` if present.
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a numeric or boolean variable is set but
    /// does not parse.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads options through `lookup` instead of the process environment.
    ///
    /// # Errors
    ///
    /// Same as [`from_env`](Self::from_env).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut options = Self::new();

        if let Some(base_url) = lookup(env::BASE_URL) {
            options.base_url = base_url;
        }
        if let Some(ws_path) = lookup(env::WS_PATH) {
            options.ws_path = ws_path;
        }
        if let Some(command_path) = lookup(env::COMMAND_PATH) {
            options.command_path = command_path;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, env::REQUEST_TIMEOUT_MS)? {
            options.request_timeout = Duration::from_millis(ms);
        }
        if let Some(raw) = lookup(env::AUTO_CONNECT) {
            options.auto_connect = parse_bool(env::AUTO_CONNECT, &raw)?;
        }

        Ok(options)
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl TransportOptions {
    /// Sets the backend base URL.
    #[inline]
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the generic command path.
    #[inline]
    #[must_use]
    pub fn with_command_path(mut self, path: impl Into<String>) -> Self {
        self.command_path = path.into();
        self
    }

    /// Sets the WebSocket path.
    #[inline]
    #[must_use]
    pub fn with_ws_path(mut self, path: impl Into<String>) -> Self {
        self.ws_path = path.into();
        self
    }

    /// Sets the per-request HTTP timeout.
    #[inline]
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets heartbeat interval and pong grace period.
    #[inline]
    #[must_use]
    pub fn with_heartbeat(mut self, interval: Duration, pong_timeout: Duration) -> Self {
        self.heartbeat_interval = interval;
        self.pong_timeout = pong_timeout;
        self
    }

    /// Sets the WebSocket handshake deadline.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the reconnect backoff table.
    #[inline]
    #[must_use]
    pub fn with_reconnect_backoff(mut self, delays: impl IntoIterator<Item = Duration>) -> Self {
        self.reconnect_backoff = delays.into_iter().collect();
        self
    }

    /// Sets the failure count that enters degraded mode.
    #[inline]
    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Sets polling and background reconnect intervals for degraded mode.
    #[inline]
    #[must_use]
    pub fn with_degraded_intervals(mut self, polling: Duration, reconnect: Duration) -> Self {
        self.polling_interval = polling;
        self.background_reconnect_interval = reconnect;
        self
    }

    /// Sets the polling command.
    #[inline]
    #[must_use]
    pub fn with_polling_command(mut self, command: impl Into<String>) -> Self {
        self.polling_command = command.into();
        self
    }

    /// Disables connecting the WebSocket on build.
    #[inline]
    #[must_use]
    pub fn without_auto_connect(mut self) -> Self {
        self.auto_connect = false;
        self
    }
}

// ============================================================================
// Conversion Methods
// ============================================================================

impl TransportOptions {
    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval.is_zero() {
            return Err(Error::config("heartbeat_interval must be greater than zero"));
        }
        if self.connect_timeout.is_zero() {
            return Err(Error::config("connect_timeout must be greater than zero"));
        }
        if self.polling_interval.is_zero() {
            return Err(Error::config("polling_interval must be greater than zero"));
        }
        if self.polling_command.is_empty() {
            return Err(Error::config("polling_command must not be empty"));
        }
        Ok(())
    }

    /// Returns the state machine timing.
    #[must_use]
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            backoff: self.reconnect_backoff.clone(),
            max_attempts: self.max_reconnect_attempts,
            background_interval: self.background_reconnect_interval,
            heartbeat_interval: self.heartbeat_interval,
            pong_timeout: self.pong_timeout,
            connect_timeout: self.connect_timeout,
        }
    }

    /// Returns the degraded-mode polling parameters.
    #[must_use]
    pub fn polling_config(&self) -> PollingConfig {
        PollingConfig {
            command: self.polling_command.clone(),
            interval: self.polling_interval,
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| Error::config(format!("{key}={raw}: {e}")))
        })
        .transpose()
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(Error::config(format!("{key}={raw}: expected true or false"))),
    }
}

// ============================================================================
// Tests
// ============================================================================
