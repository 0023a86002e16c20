//! Response-event mapping.
//!
//! The backend answers in several shapes (`{accounts: [...]}`,
//! `{success, data}`, login flags such as `requires_code`). This module
//! classifies a reply into a per-family result type and turns it into the
//! semantic events UI code listens for.
//!
//! Every mapped command emits the same named event on success and on
//! failure (the failure variant carries `{success: false, error}`), so one
//! listener handles both outcomes. The login family is the exception: its
//! outcome is split across `login-requires-code`, `login-requires-2fa`,
//! `login-success` and `login-error`, and exactly one of them fires.
//!
//! Commands without a mapping fall back to the events from
//! [`response_events_for`], which is `<command>-result` for unregistered
//! commands, with payload `{success, data}` or `{success, error}`.

// ============================================================================
// Imports
// ============================================================================

use std::sync::LazyLock;

use rustc_hash::FxHashMap;
use serde_json::{Value, json};

use super::command::response_events_for;
use super::event::EventEnvelope;
use super::request::ServerReply;

// ============================================================================
// Constants
// ============================================================================

/// Login step needs the code Telegram sent to the phone.
pub const LOGIN_REQUIRES_CODE: &str = "login-requires-code";
/// Login step needs the cloud password.
pub const LOGIN_REQUIRES_2FA: &str = "login-requires-2fa";
/// Login completed.
pub const LOGIN_SUCCESS: &str = "login-success";
/// Login failed at any step.
pub const LOGIN_ERROR: &str = "login-error";

// ============================================================================
// ResponseMapping
// ============================================================================

/// How a command's reply becomes events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMapping {
    /// Interactive login step, see [`LoginResult`].
    Login,
    /// List query whose items live under `key` (or `data`).
    Collection {
        /// Body field holding the items.
        key: &'static str,
        /// Completion event.
        event: &'static str,
    },
    /// Mutation or status query completing with one event.
    Outcome {
        /// Completion event.
        event: &'static str,
    },
}

impl ResponseMapping {
    /// Returns every event name this mapping can emit.
    #[must_use]
    pub fn event_names(&self) -> Vec<&'static str> {
        match self {
            Self::Login => vec![
                LOGIN_REQUIRES_CODE,
                LOGIN_REQUIRES_2FA,
                LOGIN_SUCCESS,
                LOGIN_ERROR,
            ],
            Self::Collection { event, .. } | Self::Outcome { event } => vec![event],
        }
    }
}

/// Shorthand for an [`ResponseMapping::Outcome`] entry.
const fn outcome(event: &'static str) -> ResponseMapping {
    ResponseMapping::Outcome { event }
}

/// Shorthand for a [`ResponseMapping::Collection`] entry.
const fn collection(key: &'static str, event: &'static str) -> ResponseMapping {
    ResponseMapping::Collection { key, event }
}

/// Per-command mapping table.
static MAPPINGS: &[(&str, ResponseMapping)] = &[
    // Login flow
    ("login-account", ResponseMapping::Login),
    ("submit-code", ResponseMapping::Login),
    ("submit-2fa", ResponseMapping::Login),
    ("logout-account", outcome("logout-result")),
    // Collections
    ("get-accounts", collection("accounts", "accounts-updated")),
    ("get-groups", collection("groups", "groups-updated")),
    ("get-keywords", collection("keywords", "keywords-updated")),
    ("get-leads", collection("leads", "leads-updated")),
    // Mutations
    ("add-account", outcome("account-added")),
    ("update-account", outcome("account-updated")),
    ("remove-account", outcome("account-removed")),
    ("add-group", outcome("group-added")),
    ("remove-group", outcome("group-removed")),
    ("join-group", outcome("group-joined")),
    ("add-keyword", outcome("keyword-added")),
    ("remove-keyword", outcome("keyword-removed")),
    ("update-lead-status", outcome("lead-updated")),
    ("save-settings", outcome("settings-saved")),
    ("import-accounts", outcome("accounts-imported")),
    ("export-leads", outcome("leads-exported")),
    ("check-proxies", outcome("proxies-checked")),
    // Status queries
    ("start-monitoring", outcome("monitoring-status")),
    ("stop-monitoring", outcome("monitoring-status")),
    ("get-monitoring-status", outcome("monitoring-status")),
    ("get-dashboard-stats", outcome("dashboard-stats")),
    ("get-settings", outcome("settings-loaded")),
    ("get-health", outcome("health-status")),
    ("admin-login", outcome("admin-login-result")),
    ("get-system-status", outcome("system-status")),
];

/// Name → mapping index over [`MAPPINGS`].
static MAPPING_INDEX: LazyLock<FxHashMap<&'static str, ResponseMapping>> =
    LazyLock::new(|| MAPPINGS.iter().copied().collect());

/// Returns the mapping registered for `command`.
#[inline]
#[must_use]
pub fn mapping_for(command: &str) -> Option<ResponseMapping> {
    MAPPING_INDEX.get(command).copied()
}

// ============================================================================
// Family Results
// ============================================================================

/// Outcome of one login step.
#[derive(Debug, Clone, PartialEq)]
pub enum LoginResult {
    /// A login code was sent; the UI must ask for it.
    RequiresCode {
        /// Phone the code was sent to.
        phone: Option<String>,
        /// Hash to echo back with the code.
        phone_code_hash: Option<String>,
    },
    /// The account has a cloud password.
    Requires2fa {
        /// Phone being logged in.
        phone: Option<String>,
        /// Password hint, if the server sent one.
        hint: Option<String>,
    },
    /// The account is logged in.
    Success {
        /// Account record from the reply.
        account: Value,
    },
    /// The step failed.
    Failure {
        /// Error description.
        error: String,
    },
}

impl LoginResult {
    /// Classifies a reply; `request` supplies the phone when the reply omits it.
    #[must_use]
    pub fn from_reply(reply: &ServerReply, request: &Value) -> Self {
        if !reply.is_success() {
            return Self::Failure {
                error: reply
                    .error_message()
                    .unwrap_or_else(|| "login failed".to_string()),
            };
        }

        let body = &reply.body;
        let phone = string_field(body, &["phone"]).or_else(|| string_field(request, &["phone"]));

        if flag(body, &["requires_code", "requiresCode", "code_required"]) {
            return Self::RequiresCode {
                phone,
                phone_code_hash: string_field(body, &["phone_code_hash", "phoneCodeHash"]),
            };
        }

        if flag(body, &["requires_2fa", "requires2fa", "requires_password"]) {
            return Self::Requires2fa {
                phone,
                hint: string_field(body, &["hint", "password_hint"]),
            };
        }

        let account = body
            .get("account")
            .or_else(|| body.get("data"))
            .cloned()
            .unwrap_or(Value::Null);
        Self::Success { account }
    }

    /// Converts into the single login event this step produces.
    #[must_use]
    pub fn into_event(self) -> EventEnvelope {
        match self {
            Self::RequiresCode {
                phone,
                phone_code_hash,
            } => EventEnvelope::new(
                LOGIN_REQUIRES_CODE,
                json!({ "phone": phone, "phoneCodeHash": phone_code_hash }),
            ),
            Self::Requires2fa { phone, hint } => EventEnvelope::new(
                LOGIN_REQUIRES_2FA,
                json!({ "phone": phone, "hint": hint }),
            ),
            Self::Success { account } => EventEnvelope::new(
                LOGIN_SUCCESS,
                json!({ "success": true, "account": account }),
            ),
            Self::Failure { error } => EventEnvelope::new(LOGIN_ERROR, failure_payload(&error)),
        }
    }
}

/// Outcome of a list query.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionResult {
    /// Items loaded.
    Loaded {
        /// The items (a JSON array when the server sent one).
        items: Value,
    },
    /// Query failed.
    Failure {
        /// Error description.
        error: String,
    },
}

impl CollectionResult {
    /// Classifies a reply, reading items from `key`, then `data`, then a bare array.
    #[must_use]
    pub fn from_reply(reply: &ServerReply, key: &str) -> Self {
        if !reply.is_success() {
            return Self::Failure {
                error: reply
                    .error_message()
                    .unwrap_or_else(|| "request failed".to_string()),
            };
        }

        let body = &reply.body;
        let items = body
            .get(key)
            .or_else(|| body.get("data"))
            .cloned()
            .or_else(|| body.is_array().then(|| body.clone()))
            .unwrap_or_else(|| Value::Array(Vec::new()));
        Self::Loaded { items }
    }

    /// Returns the event payload.
    #[must_use]
    pub fn into_payload(self) -> Value {
        match self {
            Self::Loaded { items } => json!({ "success": true, "data": items }),
            Self::Failure { error } => failure_payload(&error),
        }
    }
}

/// Outcome of a mutation or status query.
#[derive(Debug, Clone, PartialEq)]
pub enum OutcomeResult {
    /// Command completed.
    Completed {
        /// `data` from the reply, or the whole reply.
        data: Value,
    },
    /// Command failed.
    Failure {
        /// Error description.
        error: String,
    },
}

impl OutcomeResult {
    /// Classifies a reply.
    #[must_use]
    pub fn from_reply(reply: &ServerReply) -> Self {
        if reply.is_success() {
            Self::Completed { data: reply.data() }
        } else {
            Self::Failure {
                error: reply
                    .error_message()
                    .unwrap_or_else(|| "request failed".to_string()),
            }
        }
    }

    /// Returns the event payload.
    #[must_use]
    pub fn into_payload(self) -> Value {
        match self {
            Self::Completed { data } => json!({ "success": true, "data": data }),
            Self::Failure { error } => failure_payload(&error),
        }
    }
}

// ============================================================================
// CommandResult
// ============================================================================

/// A command's classified result, ready to become events.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    /// Login family.
    Login(LoginResult),
    /// List family.
    Collection {
        /// Completion event.
        event: &'static str,
        /// Classified result.
        result: CollectionResult,
    },
    /// Mutation/status family.
    Outcome {
        /// Completion event.
        event: &'static str,
        /// Classified result.
        result: OutcomeResult,
    },
    /// Unmapped command: emitted on every name from [`response_events_for`].
    Fallback {
        /// Command name.
        command: String,
        /// Classified result.
        result: OutcomeResult,
    },
}

impl CommandResult {
    /// Classifies a successful HTTP reply for `command`.
    #[must_use]
    pub fn from_reply(command: &str, request: &Value, reply: &ServerReply) -> Self {
        match mapping_for(command) {
            Some(ResponseMapping::Login) => Self::Login(LoginResult::from_reply(reply, request)),
            Some(ResponseMapping::Collection { key, event }) => Self::Collection {
                event,
                result: CollectionResult::from_reply(reply, key),
            },
            Some(ResponseMapping::Outcome { event }) => Self::Outcome {
                event,
                result: OutcomeResult::from_reply(reply),
            },
            None => Self::Fallback {
                command: command.to_string(),
                result: OutcomeResult::from_reply(reply),
            },
        }
    }

    /// Builds the failure result for `command` (transport or HTTP failure).
    #[must_use]
    pub fn from_failure(command: &str, error: impl Into<String>) -> Self {
        let error = error.into();
        match mapping_for(command) {
            Some(ResponseMapping::Login) => Self::Login(LoginResult::Failure { error }),
            Some(ResponseMapping::Collection { event, .. }) => Self::Collection {
                event,
                result: CollectionResult::Failure { error },
            },
            Some(ResponseMapping::Outcome { event }) => Self::Outcome {
                event,
                result: OutcomeResult::Failure { error },
            },
            None => Self::Fallback {
                command: command.to_string(),
                result: OutcomeResult::Failure { error },
            },
        }
    }

    /// Returns `true` for any successful variant.
    #[must_use]
    pub fn is_success(&self) -> bool {
        !matches!(
            self,
            Self::Login(LoginResult::Failure { .. })
                | Self::Collection {
                    result: CollectionResult::Failure { .. },
                    ..
                }
                | Self::Outcome {
                    result: OutcomeResult::Failure { .. },
                    ..
                }
                | Self::Fallback {
                    result: OutcomeResult::Failure { .. },
                    ..
                }
        )
    }

    /// Converts into the events to emit.
    #[must_use]
    pub fn into_events(self) -> Vec<EventEnvelope> {
        match self {
            Self::Login(result) => vec![result.into_event()],
            Self::Collection { event, result } => {
                vec![EventEnvelope::new(event, result.into_payload())]
            }
            Self::Outcome { event, result } => {
                vec![EventEnvelope::new(event, result.into_payload())]
            }
            Self::Fallback { command, result } => {
                let payload = result.into_payload();
                response_events_for(&command)
                    .into_iter()
                    .map(|name| EventEnvelope::new(name, payload.clone()))
                    .collect()
            }
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Standard failure payload.
#[inline]
#[must_use]
pub fn failure_payload(error: &str) -> Value {
    json!({ "success": false, "error": error })
}

/// First string found under any of `keys`.
fn string_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

/// `true` if any of `keys` holds `true`.
fn flag(value: &Value, keys: &[&str]) -> bool {
    keys.iter()
        .any(|key| value.get(*key).and_then(Value::as_bool) == Some(true))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::protocol::command::{lookup, registry};

    fn events_for(command: &str, request: Value, body: Value) -> Vec<EventEnvelope> {
        CommandResult::from_reply(command, &request, &ServerReply::new(body)).into_events()
    }

    #[test]
    fn test_every_registered_command_is_mapped() {
        for descriptor in registry() {
            let mapping = mapping_for(descriptor.command)
                .unwrap_or_else(|| panic!("{} has no mapping", descriptor.command));
            for name in mapping.event_names() {
                assert!(
                    descriptor.response_events.contains(&name),
                    "{} emits unregistered event {name}",
                    descriptor.command
                );
            }
        }
    }

    #[test]
    fn test_every_mapping_is_registered() {
        for (command, _) in MAPPINGS {
            assert!(lookup(command).is_some(), "{command} is mapped but not registered");
        }
    }

    #[test]
    fn test_login_requires_code() {
        let events = events_for(
            "login-account",
            json!({"accountId": 1}),
            json!({"success": true, "requires_code": true, "phone": "+1555", "phone_code_hash": "abc"}),
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "login-requires-code");
        assert_eq!(
            events[0].payload,
            json!({"phone": "+1555", "phoneCodeHash": "abc"})
        );
    }

    #[test]
    fn test_login_requires_2fa_uses_request_phone() {
        let events = events_for(
            "submit-code",
            json!({"accountId": 1, "phone": "+4420"}),
            json!({"success": true, "requires_2fa": true, "hint": "pet"}),
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "login-requires-2fa");
        assert_eq!(events[0].payload, json!({"phone": "+4420", "hint": "pet"}));
    }

    #[test]
    fn test_login_success() {
        let events = events_for(
            "submit-2fa",
            json!({"accountId": 1}),
            json!({"success": true, "account": {"id": 1, "username": "bot"}}),
        );
        assert_eq!(events[0].name, "login-success");
        assert_eq!(events[0].payload["account"]["username"], "bot");
    }

    #[test]
    fn test_login_application_failure() {
        let events = events_for(
            "login-account",
            json!({}),
            json!({"success": false, "error": "PHONE_NUMBER_BANNED"}),
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "login-error");
        assert_eq!(
            events[0].payload,
            json!({"success": false, "error": "PHONE_NUMBER_BANNED"})
        );
    }

    #[test]
    fn test_collection_key_and_data_shapes() {
        let events = events_for("get-accounts", json!({}), json!({"accounts": [{"id": 1}]}));
        assert_eq!(events[0].name, "accounts-updated");
        assert_eq!(events[0].payload, json!({"success": true, "data": [{"id": 1}]}));

        let events = events_for("get-groups", json!({}), json!({"success": true, "data": [2]}));
        assert_eq!(events[0].payload, json!({"success": true, "data": [2]}));

        let events = events_for("get-leads", json!({}), json!([3, 4]));
        assert_eq!(events[0].payload, json!({"success": true, "data": [3, 4]}));
    }

    #[test]
    fn test_same_event_on_both_paths() {
        let ok = events_for("add-keyword", json!({}), json!({"success": true, "data": {"id": 9}}));
        let failed = CommandResult::from_failure("add-keyword", "HTTP 500").into_events();
        assert_eq!(ok[0].name, "keyword-added");
        assert_eq!(failed[0].name, "keyword-added");
        assert_eq!(failed[0].payload, json!({"success": false, "error": "HTTP 500"}));
    }

    #[test]
    fn test_unknown_command_fallback() {
        let events = events_for(
            "custom-report-export",
            json!({"id": 7}),
            json!({"success": true, "data": {"url": "x"}}),
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "custom-report-export-result");
        assert_eq!(events[0].payload, json!({"success": true, "data": {"url": "x"}}));
    }

    #[test]
    fn test_unknown_command_failure_fallback() {
        let result = CommandResult::from_failure("custom-report-export", "offline");
        assert!(!result.is_success());
        let events = result.into_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "custom-report-export-result");
        assert_eq!(events[0].payload, json!({"success": false, "error": "offline"}));
    }

    #[test]
    fn test_is_success() {
        let reply = ServerReply::new(json!({"running": true}));
        assert!(CommandResult::from_reply("get-monitoring-status", &json!({}), &reply).is_success());
        assert!(!CommandResult::from_failure("get-accounts", "x").is_success());
    }
}
