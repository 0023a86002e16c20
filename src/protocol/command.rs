//! Command registry.
//!
//! A static table mapping logical command names to concrete wire
//! operations: HTTP method, endpoint template, the events a completed
//! command produces, whether the call carries credentials, and whether it
//! is routed RESTfully or through the generic command endpoint.
//!
//! # Command Families
//!
//! | Family | Commands |
//! |--------|----------|
//! | `accounts` | `get-accounts`, `add-account`, `update-account`, `remove-account` |
//! | `login` | `login-account`, `submit-code`, `submit-2fa`, `logout-account` |
//! | `groups` | `get-groups`, `add-group`, `remove-group`, `join-group` |
//! | `keywords` | `get-keywords`, `add-keyword`, `remove-keyword` |
//! | `leads` | `get-leads`, `update-lead-status` |
//! | `monitoring` | `start-monitoring`, `stop-monitoring`, `get-monitoring-status` |
//! | `dashboard` | `get-dashboard-stats` |
//! | `settings` | `get-settings`, `save-settings` |
//! | `system` | `get-health`, `admin-login`, `get-system-status` |
//! | generic-only | `import-accounts`, `export-leads`, `check-proxies` |
//!
//! Unregistered commands are still valid: they go through the generic
//! endpoint and complete with a synthesized `<command>-result` event.

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Cow;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Suffix of the synthesized completion event for unregistered commands.
pub const RESULT_EVENT_SUFFIX: &str = "-result";

/// Payload key used when a placeholder has no key of its own.
const FALLBACK_PARAM: &str = "id";

/// Matches `{param}` placeholders in endpoint templates.
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
});

// ============================================================================
// HttpMethod
// ============================================================================

/// HTTP method of a RESTful command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// `GET` (no body; leftover payload fields become the query string).
    Get,
    /// `POST`.
    Post,
    /// `PUT`.
    Put,
    /// `DELETE`.
    Delete,
}

impl HttpMethod {
    /// Returns the method name.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }

    /// Returns `true` if the payload travels as a JSON body.
    #[inline]
    #[must_use]
    pub const fn has_body(&self) -> bool {
        !matches!(self, Self::Get)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Self::GET,
            HttpMethod::Post => Self::POST,
            HttpMethod::Put => Self::PUT,
            HttpMethod::Delete => Self::DELETE,
        }
    }
}

// ============================================================================
// RoutingMode
// ============================================================================

/// How a registered command reaches the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoutingMode {
    /// Dedicated RESTful endpoint built from the template.
    Rest,
    /// `POST` to the generic command endpoint with a `{command, payload}` body.
    Generic,
}

// ============================================================================
// CommandDescriptor
// ============================================================================

/// Immutable description of one logical command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandDescriptor {
    /// Logical command name, unique across the table.
    pub command: &'static str,
    /// HTTP method for RESTful routing.
    pub http_method: HttpMethod,
    /// Endpoint path, may contain `{param}` placeholders.
    pub endpoint_template: &'static str,
    /// Events emitted when the command completes.
    pub response_events: &'static [&'static str],
    /// Whether the `Authorization` header is attached.
    pub requires_auth: bool,
    /// RESTful or generic routing.
    pub routing: RoutingMode,
}

impl CommandDescriptor {
    /// Describes an authenticated RESTful command.
    const fn rest(
        command: &'static str,
        http_method: HttpMethod,
        endpoint_template: &'static str,
        response_events: &'static [&'static str],
    ) -> Self {
        Self {
            command,
            http_method,
            endpoint_template,
            response_events,
            requires_auth: true,
            routing: RoutingMode::Rest,
        }
    }

    /// Describes an authenticated command that only exists on the generic endpoint.
    const fn generic(command: &'static str, response_events: &'static [&'static str]) -> Self {
        Self {
            command,
            http_method: HttpMethod::Post,
            endpoint_template: "",
            response_events,
            requires_auth: true,
            routing: RoutingMode::Generic,
        }
    }

    /// Marks the command as callable without credentials.
    const fn public(mut self) -> Self {
        self.requires_auth = false;
        self
    }

    /// Returns `true` if the command must go through the generic endpoint.
    #[inline]
    #[must_use]
    pub const fn use_generic_endpoint(&self) -> bool {
        matches!(self.routing, RoutingMode::Generic)
    }
}

// ============================================================================
// Command Table
// ============================================================================

/// Events produced by every step of the interactive login flow.
const LOGIN_EVENTS: &[&str] = &[
    "login-requires-code",
    "login-requires-2fa",
    "login-success",
    "login-error",
];

/// The full command table.
#[rustfmt::skip]
pub static COMMANDS: &[CommandDescriptor] = &[
    // Accounts
    CommandDescriptor::rest("get-accounts", HttpMethod::Get, "/api/v1/accounts", &["accounts-updated"]),
    CommandDescriptor::rest("add-account", HttpMethod::Post, "/api/v1/accounts", &["account-added"]),
    CommandDescriptor::rest("update-account", HttpMethod::Put, "/api/v1/accounts/{id}", &["account-updated"]),
    CommandDescriptor::rest("remove-account", HttpMethod::Delete, "/api/v1/accounts/{id}", &["account-removed"]),
    // Login flow
    CommandDescriptor::rest("login-account", HttpMethod::Post, "/api/v1/accounts/{accountId}/login", LOGIN_EVENTS),
    CommandDescriptor::rest("submit-code", HttpMethod::Post, "/api/v1/accounts/{accountId}/code", LOGIN_EVENTS),
    CommandDescriptor::rest("submit-2fa", HttpMethod::Post, "/api/v1/accounts/{accountId}/2fa", LOGIN_EVENTS),
    CommandDescriptor::rest("logout-account", HttpMethod::Post, "/api/v1/accounts/{accountId}/logout", &["logout-result"]),
    // Groups
    CommandDescriptor::rest("get-groups", HttpMethod::Get, "/api/v1/groups", &["groups-updated"]),
    CommandDescriptor::rest("add-group", HttpMethod::Post, "/api/v1/groups", &["group-added"]),
    CommandDescriptor::rest("remove-group", HttpMethod::Delete, "/api/v1/groups/{id}", &["group-removed"]),
    CommandDescriptor::rest("join-group", HttpMethod::Post, "/api/v1/groups/{id}/join", &["group-joined"]),
    // Keywords
    CommandDescriptor::rest("get-keywords", HttpMethod::Get, "/api/v1/keywords", &["keywords-updated"]),
    CommandDescriptor::rest("add-keyword", HttpMethod::Post, "/api/v1/keywords", &["keyword-added"]),
    CommandDescriptor::rest("remove-keyword", HttpMethod::Delete, "/api/v1/keywords/{id}", &["keyword-removed"]),
    // Leads
    CommandDescriptor::rest("get-leads", HttpMethod::Get, "/api/v1/leads", &["leads-updated"]),
    CommandDescriptor::rest("update-lead-status", HttpMethod::Put, "/api/v1/leads/{id}/status", &["lead-updated"]),
    // Monitoring
    CommandDescriptor::rest("start-monitoring", HttpMethod::Post, "/api/v1/monitoring/start", &["monitoring-status"]),
    CommandDescriptor::rest("stop-monitoring", HttpMethod::Post, "/api/v1/monitoring/stop", &["monitoring-status"]),
    CommandDescriptor::rest("get-monitoring-status", HttpMethod::Get, "/api/v1/monitoring/status", &["monitoring-status"]),
    // Dashboard
    CommandDescriptor::rest("get-dashboard-stats", HttpMethod::Get, "/api/v1/dashboard/stats", &["dashboard-stats"]),
    // Settings
    CommandDescriptor::rest("get-settings", HttpMethod::Get, "/api/v1/settings", &["settings-loaded"]),
    CommandDescriptor::rest("save-settings", HttpMethod::Put, "/api/v1/settings", &["settings-saved"]),
    // System
    CommandDescriptor::rest("get-health", HttpMethod::Get, "/api/health", &["health-status"]).public(),
    CommandDescriptor::rest("admin-login", HttpMethod::Post, "/api/v1/auth/login", &["admin-login-result"]).public(),
    CommandDescriptor::generic("get-system-status", &["system-status"]),
    // Generic-only
    CommandDescriptor::generic("import-accounts", &["accounts-imported"]),
    CommandDescriptor::generic("export-leads", &["leads-exported"]),
    CommandDescriptor::generic("check-proxies", &["proxies-checked"]),
];

/// Name → descriptor index over [`COMMANDS`].
static INDEX: LazyLock<FxHashMap<&'static str, &'static CommandDescriptor>> =
    LazyLock::new(|| COMMANDS.iter().map(|d| (d.command, d)).collect());

// ============================================================================
// Lookup
// ============================================================================

/// Returns the descriptor registered for `command`.
#[inline]
#[must_use]
pub fn lookup(command: &str) -> Option<&'static CommandDescriptor> {
    INDEX.get(command).copied()
}

/// Iterates over every registered descriptor, in table order.
#[inline]
pub fn registry() -> impl Iterator<Item = &'static CommandDescriptor> {
    COMMANDS.iter()
}

/// Returns the synthesized completion event name for `command`.
#[inline]
#[must_use]
pub fn result_event_name(command: &str) -> String {
    format!("{command}{RESULT_EVENT_SUFFIX}")
}

/// Returns the events `command` produces on completion.
///
/// Unregistered commands produce a single `<command>-result` event, so
/// every command has at least one observable completion event.
#[must_use]
pub fn response_events_for(command: &str) -> Vec<Cow<'static, str>> {
    match lookup(command) {
        Some(descriptor) if !descriptor.response_events.is_empty() => descriptor
            .response_events
            .iter()
            .map(|e| Cow::Borrowed(*e))
            .collect(),
        _ => vec![Cow::Owned(result_event_name(command))],
    }
}

// ============================================================================
// URL Building
// ============================================================================

/// Outcome of substituting placeholders into an endpoint template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RenderedEndpoint {
    /// Path with every resolvable placeholder substituted.
    pub path: String,
    /// Payload keys consumed by substitution.
    pub consumed: FxHashSet<String>,
    /// Placeholders left literal because no payload key matched.
    pub missing: Vec<String>,
}

/// Substitutes `{param}` placeholders with `payload[param]`, falling back
/// to `payload.id`.
pub(crate) fn render_endpoint(template: &str, payload: &Value) -> RenderedEndpoint {
    let mut consumed = FxHashSet::default();
    let mut missing = Vec::new();

    let path = PLACEHOLDER.replace_all(template, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        let resolved = [name, FALLBACK_PARAM]
            .into_iter()
            .find_map(|key| path_value(payload, key).map(|v| (key, v)));

        match resolved {
            Some((key, value)) => {
                consumed.insert(key.to_string());
                value
            }
            None => {
                missing.push(name.to_string());
                caps[0].to_string()
            }
        }
    });

    RenderedEndpoint {
        path: path.into_owned(),
        consumed,
        missing,
    }
}

/// Renders one payload field as a percent-encoded path segment.
fn path_value(payload: &Value, key: &str) -> Option<String> {
    let raw = match payload.get(key)? {
        Value::Null => return None,
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    };
    Some(urlencoding::encode(&raw).into_owned())
}

/// Builds the request path for `descriptor` from `payload`.
///
/// Placeholders with no matching payload key (nor `id`) stay literal in the
/// returned path, so an incomplete payload yields a visibly broken URL
/// instead of an error. Each unresolved placeholder is logged.
#[must_use]
pub fn build_url(descriptor: &CommandDescriptor, payload: &Value) -> String {
    let rendered = render_endpoint(descriptor.endpoint_template, payload);
    for name in &rendered.missing {
        warn!(
            command = descriptor.command,
            param = %name,
            "Unresolved path parameter left in URL"
        );
    }
    rendered.path
}

/// Strict variant of [`build_url`].
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] naming the first unresolved placeholder.
pub fn try_build_url(descriptor: &CommandDescriptor, payload: &Value) -> Result<String> {
    let rendered = render_endpoint(descriptor.endpoint_template, payload);
    match rendered.missing.first() {
        Some(name) => Err(Error::invalid_argument(format!(
            "{}: no value for path parameter `{name}`",
            descriptor.command
        ))),
        None => Ok(rendered.path),
    }
}

// ============================================================================
// Tests
// ============================================================================
