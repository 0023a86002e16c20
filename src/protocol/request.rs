//! Request and reply message types for the HTTP side.
//!
//! # Formats
//!
//! Generic command endpoint body:
//! ```json
//! { "command": "export-leads", "payload": { ... } }
//! ```
//!
//! Reply bodies are free-form command results that may also carry events
//! for the client to emit:
//! ```json
//! { "success": true, "data": { ... }, "events": [{ "name": "x", "data": { ... } }] }
//! { "success": true, "event": "x", "data": { ... } }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;
use serde_json::{Value, json};

use super::event::EventEnvelope;

// ============================================================================
// OutboundRequest
// ============================================================================

/// One `send`/`invoke` call in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    /// Logical command name.
    pub command: String,
    /// Command arguments.
    pub payload: Value,
}

impl OutboundRequest {
    /// Creates a request; a `null` payload is normalized to `{}`.
    #[inline]
    #[must_use]
    pub fn new(command: impl Into<String>, payload: Value) -> Self {
        let payload = if payload.is_null() { json!({}) } else { payload };
        Self {
            command: command.into(),
            payload,
        }
    }

    /// Returns the generic endpoint body for this request.
    #[inline]
    #[must_use]
    pub fn envelope(&self) -> CommandEnvelope<'_> {
        CommandEnvelope {
            command: &self.command,
            payload: &self.payload,
        }
    }
}

// ============================================================================
// CommandEnvelope
// ============================================================================

/// Body of a `POST` to the generic command endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CommandEnvelope<'a> {
    /// Logical command name.
    pub command: &'a str,
    /// Command arguments.
    pub payload: &'a Value,
}

// ============================================================================
// ServerReply
// ============================================================================

/// A parsed JSON reply from a successful HTTP call.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerReply {
    /// Raw body.
    pub body: Value,
}

impl ServerReply {
    /// Wraps a parsed body.
    #[inline]
    #[must_use]
    pub fn new(body: Value) -> Self {
        Self { body }
    }

    /// Returns `false` only if the body explicitly reports `success: false`
    /// or carries an `error`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        match self.body.get("success").and_then(Value::as_bool) {
            Some(flag) => flag,
            None => self.error_message().is_none(),
        }
    }

    /// Returns the server's error description, if any.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        error_message(&self.body)
    }

    /// Returns `data` if present, otherwise the whole body.
    #[must_use]
    pub fn data(&self) -> Value {
        match self.body.get("data") {
            Some(data) => data.clone(),
            None => self.body.clone(),
        }
    }

    /// Returns the events the server asked the client to emit.
    ///
    /// Reads the `events` array (`{name, data}` objects or bare names)
    /// and the single `event`/`data` pair, in that order.
    #[must_use]
    pub fn embedded_events(&self) -> Vec<EventEnvelope> {
        let mut events = Vec::new();

        if let Some(list) = self.body.get("events").and_then(Value::as_array) {
            for item in list {
                match item {
                    Value::String(name) => events.push(EventEnvelope::new(name.clone(), Value::Null)),
                    Value::Object(fields) => {
                        let name = fields
                            .get("name")
                            .or_else(|| fields.get("event"))
                            .and_then(Value::as_str);
                        if let Some(name) = name {
                            let data = fields.get("data").cloned().unwrap_or(Value::Null);
                            events.push(EventEnvelope::new(name, data));
                        }
                    }
                    _ => {}
                }
            }
        }

        if let Some(name) = self.body.get("event").and_then(Value::as_str) {
            let data = self.body.get("data").cloned().unwrap_or(Value::Null);
            events.push(EventEnvelope::new(name, data));
        }

        events
    }
}

/// Extracts an error description from a reply or error body.
///
/// Accepts `error` as a string or as an object with a `message`, then
/// falls back to a top-level `message` or `detail`.
#[must_use]
pub fn error_message(body: &Value) -> Option<String> {
    match body.get("error") {
        Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
        Some(Value::Object(fields)) => {
            if let Some(message) = fields.get("message").and_then(Value::as_str) {
                return Some(message.to_string());
            }
        }
        _ => {}
    }

    if body.get("success").and_then(Value::as_bool) == Some(false) {
        return ["message", "detail"]
            .into_iter()
            .find_map(|key| body.get(key).and_then(Value::as_str))
            .map(str::to_string)
            .or_else(|| Some("request failed".to_string()));
    }

    None
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_serialization() {
        let request = OutboundRequest::new("custom-report-export", json!({"id": 7}));
        let json = serde_json::to_value(request.envelope()).expect("serialize");
        assert_eq!(
            json,
            json!({"command": "custom-report-export", "payload": {"id": 7}})
        );
    }

    #[test]
    fn test_null_payload_normalized() {
        let request = OutboundRequest::new("get-accounts", Value::Null);
        assert_eq!(request.payload, json!({}));
    }

    #[test]
    fn test_reply_success_flags() {
        assert!(ServerReply::new(json!({"accounts": []})).is_success());
        assert!(ServerReply::new(json!({"success": true})).is_success());
        assert!(!ServerReply::new(json!({"success": false})).is_success());
        assert!(!ServerReply::new(json!({"error": "boom"})).is_success());
    }

    #[test]
    fn test_reply_data() {
        let reply = ServerReply::new(json!({"success": true, "data": {"url": "x"}}));
        assert_eq!(reply.data(), json!({"url": "x"}));

        let reply = ServerReply::new(json!({"accounts": [1]}));
        assert_eq!(reply.data(), json!({"accounts": [1]}));
    }

    #[test]
    fn test_error_message_forms() {
        assert_eq!(error_message(&json!({"error": "flood wait"})).as_deref(), Some("flood wait"));
        assert_eq!(
            error_message(&json!({"error": {"message": "bad code"}})).as_deref(),
            Some("bad code")
        );
        assert_eq!(
            error_message(&json!({"success": false, "message": "nope"})).as_deref(),
            Some("nope")
        );
        assert_eq!(
            error_message(&json!({"success": false})).as_deref(),
            Some("request failed")
        );
        assert_eq!(error_message(&json!({"success": true})), None);
    }

    #[test]
    fn test_embedded_events() {
        let reply = ServerReply::new(json!({
            "success": true,
            "events": [
                {"name": "accounts-updated", "data": [1, 2]},
                "refresh-dashboard",
                {"data": "nameless"},
            ],
            "event": "toast",
            "data": {"text": "saved"}
        }));

        let events = reply.embedded_events();
        let names: Vec<_> = events.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["accounts-updated", "refresh-dashboard", "toast"]);
        assert_eq!(events[0].payload, json!([1, 2]));
        assert_eq!(events[2].payload, json!({"text": "saved"}));
    }
}
