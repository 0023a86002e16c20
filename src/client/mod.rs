//! Client facade and configuration.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Client`] | One send/invoke/subscribe API over either transport |
//! | [`ClientBuilder`] | Selects the transport and wires the stack |
//! | [`TransportOptions`] | Endpoints and timing for the web transport |

// ============================================================================
// Submodules
// ============================================================================

/// Client builder.
pub mod builder;

/// Client facade.
pub mod core;

/// Transport options.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ClientBuilder;
pub use self::core::{Client, TransportMode};
pub use options::TransportOptions;
