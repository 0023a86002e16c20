//! Event message types.
//!
//! Inbound WebSocket frames, outbound heartbeat/data frames, and the names
//! of the local events the transport itself emits.
//!
//! # Frame Formats
//!
//! | Direction | Shape |
//! |-----------|-------|
//! | Remote → Local (data) | `{"event" \| "type": name, "data" \| "payload": any}` |
//! | Remote → Local (ack) | `{"type": "pong"}` or `{"event": "pong"}` |
//! | Local → Remote (ping) | `{"type": "ping", "timestamp": ms}` |
//! | Local → Remote (data) | `{"type": name, "data": any}` |

// ============================================================================
// Imports
// ============================================================================

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::{Map, Value, json};
use tokio::time::Instant;

use crate::error::{Error, Result};

// ============================================================================
// Local Event Names
// ============================================================================

/// Events emitted by the transport layer itself.
pub mod names {
    /// First successful HTTP response (emitted once per client).
    pub const CONNECTION_CONFIRMED: &str = "connection-confirmed";
    /// Network or HTTP failure: `{error, message, command}`.
    pub const CONNECTION_ERROR: &str = "connection-error";
    /// HTTP 401: `{error, message, command}`.
    pub const AUTH_ERROR: &str = "auth-error";
    /// Push channel opened: `{reconnected}`.
    pub const WEBSOCKET_CONNECTED: &str = "websocket-connected";
    /// Push channel lost: `{code, reason}`.
    pub const WEBSOCKET_DISCONNECTED: &str = "websocket-disconnected";
    /// Switch between push and polling: `{mode}`.
    pub const CONNECTION_MODE_CHANGED: &str = "connection-mode-changed";
    /// Heartbeat acknowledgement (never dispatched).
    pub const PONG: &str = "pong";
    /// Heartbeat request.
    pub const PING: &str = "ping";
}

// ============================================================================
// ConnectionMode
// ============================================================================

/// How realtime state reaches the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMode {
    /// Live WebSocket push.
    WebSocket,
    /// Fixed-interval HTTP polling.
    Polling,
}

impl ConnectionMode {
    /// Returns the wire name.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::WebSocket => "websocket",
            Self::Polling => "polling",
        }
    }

    /// Payload of the `connection-mode-changed` event.
    #[inline]
    #[must_use]
    pub fn changed_payload(&self) -> Value {
        json!({ "mode": self.as_str() })
    }
}

// ============================================================================
// EventEnvelope
// ============================================================================

/// One event on its way to listeners.
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    /// Event or channel name.
    pub name: String,
    /// Event data.
    pub payload: Value,
    /// When the event entered the process.
    pub received_at: Instant,
}

impl EventEnvelope {
    /// Creates an envelope stamped with the current time.
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
            received_at: Instant::now(),
        }
    }
}

// ============================================================================
// InboundFrame
// ============================================================================

/// A parsed text frame from the push channel.
#[derive(Debug, Clone)]
pub enum InboundFrame {
    /// Heartbeat acknowledgement; refreshes liveness only.
    HeartbeatAck,
    /// Application event to dispatch.
    Data(EventEnvelope),
}

impl InboundFrame {
    /// Parses a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] for invalid JSON and [`Error::Protocol`] when
    /// the frame is not an object or carries no event name.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Object(mut fields) = value else {
            return Err(Error::protocol("frame is not a JSON object"));
        };

        let name = take_string(&mut fields, "event").or_else(|| take_string(&mut fields, "type"));
        let Some(name) = name else {
            return Err(Error::protocol("frame has no `event` or `type` field"));
        };

        if name == names::PONG {
            return Ok(Self::HeartbeatAck);
        }

        let payload = fields
            .remove("data")
            .or_else(|| fields.remove("payload"))
            .unwrap_or(Value::Null);

        Ok(Self::Data(EventEnvelope::new(name, payload)))
    }
}

/// Removes `key` from `fields` if it holds a string.
fn take_string(fields: &mut Map<String, Value>, key: &str) -> Option<String> {
    match fields.get(key) {
        Some(Value::String(_)) => match fields.remove(key) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        },
        _ => None,
    }
}

// ============================================================================
// Outbound Frames
// ============================================================================

/// Heartbeat request sent on every healthy heartbeat tick.
#[derive(Debug, Clone, Serialize)]
pub struct Ping {
    /// Always `"ping"`.
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

impl Ping {
    /// Creates a ping stamped with the wall clock.
    #[must_use]
    pub fn now() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self {
            kind: names::PING,
            timestamp,
        }
    }
}

/// Application data frame sent over the push channel.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundFrame {
    /// Event name.
    #[serde(rename = "type")]
    pub kind: String,
    /// Event data.
    pub data: Value,
}

impl OutboundFrame {
    /// Creates a data frame.
    #[inline]
    #[must_use]
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
