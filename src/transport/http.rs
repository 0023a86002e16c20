//! HTTP command client.
//!
//! Turns one `(command, payload)` pair into an HTTP call and the call's
//! result into events:
//!
//! 1. Registered, REST-routed commands go to their own endpoint. `GET`
//!    carries unconsumed payload fields as a query string; other methods
//!    send the payload as a JSON body.
//! 2. Everything else is `POST {command_path}` with `{command, payload}`.
//! 3. A bearer token is attached when one is available and the command
//!    requires authentication.
//! 4. Status ≥ 400 or a network failure emits `connection-error`
//!    (`auth-error` too for 401) and the command's failure events.
//! 5. A successful reply emits its embedded events, then the mapped
//!    completion events. The first success also emits
//!    `connection-confirmed`.
//!
//! [`HttpClient::invoke`] never fails: it resolves to the reply body or to
//! `{success: false, error}`.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{Client as ReqwestClient, RequestBuilder};
use serde_json::{Value, json};
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::listener::Dispatcher;
use crate::protocol::command::render_endpoint;
use crate::protocol::mapping::failure_payload;
use crate::protocol::request::error_message;
use crate::protocol::{CommandResult, EventEnvelope, OutboundRequest, ServerReply, lookup, names};

use super::auth::AuthToken;

// ============================================================================
// HttpClient
// ============================================================================

/// Issues commands over HTTP and emits their events.
pub struct HttpClient {
    /// Underlying HTTP client.
    client: ReqwestClient,
    /// Base URL, without trailing slash.
    base_url: String,
    /// Generic command endpoint.
    command_url: Url,
    /// Bearer token source.
    auth: Arc<AuthToken>,
    /// Event sink.
    dispatcher: Arc<Dispatcher>,
    /// Set by the first successful response.
    reachable: AtomicBool,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url)
            .field("command_url", &self.command_url.as_str())
            .field("reachable", &self.is_reachable())
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    /// Creates a client for `base_url`.
    ///
    /// # Errors
    ///
    /// - [`Error::Url`] if the command endpoint cannot be formed
    /// - [`Error::Http`] if the HTTP client cannot be built
    pub fn new(
        base_url: &Url,
        command_path: &str,
        request_timeout: Duration,
        auth: Arc<AuthToken>,
        dispatcher: Arc<Dispatcher>,
    ) -> Result<Self> {
        let base_url = base_url.as_str().trim_end_matches('/').to_string();
        let command_url = Url::parse(&join_path(&base_url, command_path))?;
        let client = ReqwestClient::builder().timeout(request_timeout).build()?;

        Ok(Self {
            client,
            base_url,
            command_url,
            auth,
            dispatcher,
            reachable: AtomicBool::new(false),
        })
    }

    /// Returns `true` once any request has succeeded.
    #[inline]
    #[must_use]
    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::Acquire)
    }

    /// Runs `command` and emits its events.
    ///
    /// Returns the reply body, or `{success: false, error}` on failure.
    pub async fn invoke(&self, command: &str, payload: Value) -> Value {
        let request = OutboundRequest::new(command, payload);

        match self.execute(&request).await {
            Ok(body) => self.on_success(&request, body),
            Err(error) => self.on_failure(&request, &error),
        }
    }

    /// Sends `request` and returns the parsed body of a successful reply.
    async fn execute(&self, request: &OutboundRequest) -> Result<Value> {
        let builder = self.prepare(request)?;
        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        trace!(
            command = %request.command,
            status = status.as_u16(),
            bytes = text.len(),
            "Response received"
        );

        let body = if text.trim().is_empty() {
            Ok(json!({}))
        } else {
            serde_json::from_str::<Value>(&text)
        };

        if status.is_client_error() || status.is_server_error() {
            let message = body
                .ok()
                .as_ref()
                .and_then(error_message)
                .or_else(|| status.canonical_reason().map(str::to_string))
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            return Err(Error::http_status(status.as_u16(), message));
        }

        Ok(body?)
    }

    /// Builds the HTTP request for `request`.
    fn prepare(&self, request: &OutboundRequest) -> Result<RequestBuilder> {
        let descriptor = lookup(&request.command);

        let builder = match descriptor {
            Some(descriptor) if !descriptor.use_generic_endpoint() => {
                let rendered = render_endpoint(descriptor.endpoint_template, &request.payload);
                for name in &rendered.missing {
                    warn!(
                        command = descriptor.command,
                        param = %name,
                        "Unresolved path parameter left in URL"
                    );
                }

                let mut url = Url::parse(&join_path(&self.base_url, &rendered.path))?;
                let method = reqwest::Method::from(descriptor.http_method);

                if descriptor.http_method.has_body() {
                    self.client.request(method, url).json(&request.payload)
                } else {
                    let query = query_pairs(&request.payload, |key| rendered.consumed.contains(key));
                    if !query.is_empty() {
                        url.query_pairs_mut().extend_pairs(query);
                    }
                    self.client.request(method, url)
                }
            }
            _ => self
                .client
                .post(self.command_url.clone())
                .json(&request.envelope()),
        };

        debug!(
            command = %request.command,
            generic = descriptor.is_none_or(|d| d.use_generic_endpoint()),
            "Dispatching command over HTTP"
        );

        // Unregistered commands are sent authenticated.
        let requires_auth = descriptor.is_none_or(|d| d.requires_auth);
        match self.auth.current() {
            Some(token) if requires_auth => {
                let mut value = HeaderValue::try_from(format!("Bearer {token}")).map_err(|e| {
                    Error::invalid_argument(format!("Invalid auth token characters: {e}"))
                })?;
                value.set_sensitive(true);
                Ok(builder.header(AUTHORIZATION, value))
            }
            _ => Ok(builder),
        }
    }

    /// Emits the events of a successful reply.
    fn on_success(&self, request: &OutboundRequest, body: Value) -> Value {
        if self
            .reachable
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            debug!(base_url = %self.base_url, "HTTP backend reachable");
            self.dispatcher.emit(
                names::CONNECTION_CONFIRMED,
                json!({ "baseUrl": self.base_url }),
            );
        }

        let reply = ServerReply::new(body);
        for envelope in reply.embedded_events() {
            self.dispatcher.dispatch(envelope);
        }

        let result = CommandResult::from_reply(&request.command, &request.payload, &reply);
        self.emit_all(result.into_events());

        reply.body
    }

    /// Emits the transport and command failure events for `error`.
    pub(crate) fn on_failure(&self, request: &OutboundRequest, error: &Error) -> Value {
        let command = request.command.as_str();
        let reason = match error {
            Error::HttpStatus { message, .. } => message.clone(),
            other => other.to_string(),
        };

        warn!(
            command,
            status = ?error.status(),
            recoverable = error.is_recoverable(),
            error = %error,
            "Command failed"
        );

        let mut details = json!({
            "error": reason,
            "message": format!("Request for `{command}` failed"),
            "command": command,
        });
        if let Some(status) = error.status() {
            details["status"] = json!(status);
        }

        self.dispatcher.emit(names::CONNECTION_ERROR, details.clone());
        if error.is_auth_error() {
            self.dispatcher.emit(names::AUTH_ERROR, details);
        }

        self.emit_all(CommandResult::from_failure(command, reason.as_str()).into_events());

        failure_payload(&reason)
    }

    fn emit_all(&self, events: Vec<EventEnvelope>) {
        for envelope in events {
            self.dispatcher.dispatch(envelope);
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Appends `path` to `base`, keeping any path prefix on `base`.
fn join_path(base: &str, path: &str) -> String {
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

/// Scalar payload fields not consumed by the path, as query pairs.
fn query_pairs(payload: &Value, consumed: impl Fn(&str) -> bool) -> Vec<(String, String)> {
    let Some(fields) = payload.as_object() else {
        return Vec::new();
    };

    fields
        .iter()
        .filter(|(key, _)| !consumed(key))
        .filter_map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((key.clone(), value))
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
