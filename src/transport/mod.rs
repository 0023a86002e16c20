//! Backing transports.
//!
//! # Architecture
//!
//! ```text
//!                         ┌──────────────────────────────┐
//!                         │            Client            │
//!                         └──────┬────────────────┬──────┘
//!                    native host │                │ no host
//!                                ▼                ▼
//!                    ┌────────────────┐  ┌──────────────────────────┐
//!                    │NativeTransport │  │       WebTransport       │
//!                    │  host bridge   │  │ HttpClient   Connection- │
//!                    └───────┬────────┘  │  (REST /     Manager     │
//!                            │           │   generic)   (WS, timers)│
//!                            │           └──────┬────────────┬──────┘
//!                            ▼                  ▼            ▼
//!                    ┌───────────────────────────────────────────────┐
//!                    │            Dispatcher → listeners             │
//!                    └───────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `auth` | Bearer token cell and providers |
//! | `connection` | WebSocket runner: socket, heartbeat, reconnect, polling |
//! | `http` | HTTP command client |
//! | `native` | Native host bridge |
//! | `state` | Pure connection state machine |
//! | `web` | HTTP + WebSocket composition |

// ============================================================================
// Submodules
// ============================================================================

/// Bearer token resolution.
pub mod auth;

/// WebSocket connection manager.
pub mod connection;

/// HTTP command client.
pub mod http;

/// Native host transport.
pub mod native;

/// Connection state machine.
pub mod state;

/// Web transport.
pub mod web;

// ============================================================================
// Re-exports
// ============================================================================

pub use auth::{AuthToken, EnvToken, NoToken, StaticToken, TokenProvider};
pub use connection::{ConnectionManager, PollingConfig};
pub use http::HttpClient;
pub use native::{HostListenerId, NativeHost, NativeTransport};
pub use state::{ConnectionMachine, ConnectionState, Effect, Input, ReconnectPolicy};
pub use web::WebTransport;
