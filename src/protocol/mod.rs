//! Wire-level and declarative protocol types.
//!
//! # Protocol Overview
//!
//! | Message | Direction | Purpose |
//! |---------|-----------|---------|
//! | REST call | Local → Remote | Registered command with a dedicated endpoint |
//! | [`CommandEnvelope`] | Local → Remote | `POST /api/command` for everything else |
//! | [`ServerReply`] | Remote → Local | Command result, may embed events |
//! | [`InboundFrame`] | Remote → Local | WebSocket push event or heartbeat ack |
//! | [`Ping`] | Local → Remote | WebSocket heartbeat |
//!
//! # Command Naming
//!
//! Commands are kebab-case verbs on a domain noun: `get-accounts`,
//! `login-account`, `update-lead-status`. Completion events are named
//! after what changed: `accounts-updated`, `lead-updated`.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Command registry and URL building |
//! | `event` | Frames, envelopes and local event names |
//! | `mapping` | Reply → semantic events |
//! | `request` | Outbound requests and parsed replies |

// ============================================================================
// Submodules
// ============================================================================

/// Command registry.
pub mod command;

/// Frames, envelopes and local event names.
pub mod event;

/// Response-event mapping.
pub mod mapping;

/// Outbound requests and parsed replies.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::{
    COMMANDS, CommandDescriptor, HttpMethod, RoutingMode, build_url, lookup, registry,
    response_events_for, result_event_name, try_build_url,
};
pub use event::{ConnectionMode, EventEnvelope, InboundFrame, OutboundFrame, Ping, names};
pub use mapping::{
    CollectionResult, CommandResult, LoginResult, OutcomeResult, ResponseMapping, mapping_for,
};
pub use request::{CommandEnvelope, OutboundRequest, ServerReply};
