//! Console Transport - uniform command and event transport for the
//! Telegram automation console.
//!
//! Application code issues fire-and-forget sends, request/response
//! invocations and event subscriptions through one [`Client`] API. The
//! client runs over either:
//!
//! - **Native host**: a desktop shell's message-passing bridge
//!   ([`NativeHost`]), when the console is embedded in one
//! - **Web**: HTTP for commands plus a WebSocket push channel with
//!   heartbeat, exponential-backoff reconnect and fallback to HTTP polling
//!
//! Consumer code never branches on which one is active.
//!
//! # Quick Start
//!
//! ```no_run
//! use console_transport::{Client, Result};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Client::builder()
//!         .base_url("http://127.0.0.1:8080")
//!         .auth_token("secret")
//!         .build()?;
//!
//!     let _sub = client.on("login-requires-code", |payload| {
//!         println!("code sent to {}", payload["phone"]);
//!     });
//!
//!     let reply = client
//!         .invoke("login-account", json!({"accountId": 7, "phone": "+1555"}))
//!         .await;
//!     println!("{reply}");
//!
//!     Ok(())
//! }
//! ```
//!
//! # Events
//!
//! Besides every command's completion events (see
//! [`protocol::mapping`]), the transport emits:
//!
//! | Event | When |
//! |-------|------|
//! | `connection-confirmed` | First successful HTTP response |
//! | `connection-error` | HTTP/network failure (`{error, message, command}`) |
//! | `auth-error` | HTTP 401 |
//! | `websocket-connected` | Socket opened (`{reconnected}`) |
//! | `websocket-disconnected` | Socket closed (`{code, reason}`) |
//! | `connection-mode-changed` | Entered or left polling (`{mode}`) |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`Client`] facade, builder and options |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`listener`] | Listener registry and event dispatcher |
//! | [`protocol`] | Command registry, wire frames and response mapping |
//! | [`transport`] | Native and web transports |

// ============================================================================
// Modules
// ============================================================================

/// Client facade and configuration.
///
/// Use [`Client::builder()`] to create a configured client.
pub mod client;

/// Error types and result aliases.
///
/// Construction paths return [`Result<T>`]; runtime failures surface as
/// events instead.
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Listener registry and event dispatcher.
pub mod listener;

/// Command registry, wire frames and response-event mapping.
pub mod protocol;

/// Native host and web transports.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{Client, ClientBuilder, TransportMode, TransportOptions};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ClientId, ConnectionEpoch, ListenerId};

// Listener types
pub use listener::{Callback, DirectContext, Subscription, UpdateContext};

// Protocol types
pub use protocol::{CommandDescriptor, ConnectionMode, EventEnvelope, HttpMethod, names};

// Transport types
pub use transport::{ConnectionState, EnvToken, NativeHost, StaticToken, TokenProvider};
