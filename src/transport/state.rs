//! WebSocket connection state machine.
//!
//! [`ConnectionMachine`] is a pure value: [`ConnectionMachine::handle`]
//! takes one [`Input`] and returns the [`Effect`]s the runner must carry
//! out (open a socket, arm a timer, emit an event). It performs no I/O and
//! reads no clock, so every transition can be tested with explicit
//! instants.
//!
//! # States
//!
//! ```text
//!              Start / ReconnectTimer
//! Disconnected ──────────────────────► Connecting ──Opened──► Connected
//!      ▲                                  │  ▲                   │
//!      │        Closed (attempts < max)   │  │ ReconnectTimer    │ Closed /
//!      └──────────────────────────────────┘  │ (background)      │ heartbeat timeout
//!                                            │                   │
//!                      Closed (attempts ≥ max)                   ▼
//!                 Connecting ─────────────────────────────► Degraded
//! ```
//!
//! The degraded flag survives background retries (`Degraded → Connecting
//! → Degraded`) and only clears when a socket actually opens.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::time::Instant;

use crate::protocol::{ConnectionMode, names};

// ============================================================================
// Constants
// ============================================================================

/// Close code reported when the socket failed without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Reason reported for a heartbeat-forced close.
pub const HEARTBEAT_TIMEOUT_REASON: &str = "heartbeat timeout";

/// Reason reported when the WebSocket handshake does not finish in time.
pub const CONNECT_TIMEOUT_REASON: &str = "connect timeout";

// ============================================================================
// ConnectionState
// ============================================================================

/// Observable state of the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No socket and no attempt in progress.
    #[default]
    Disconnected,
    /// A socket is being opened.
    Connecting,
    /// The socket is open.
    Connected,
    /// Retries exhausted; polling until a background retry succeeds.
    Degraded,
}

impl ConnectionState {
    /// Returns the lowercase name.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Degraded => "degraded",
        }
    }

    /// Returns `true` while a socket exists (opening or open).
    #[inline]
    #[must_use]
    pub const fn has_socket(&self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ReconnectPolicy
// ============================================================================

/// Timing parameters of the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before retry N (1-based) is `backoff[min(N - 1, len - 1)]`.
    pub backoff: Vec<Duration>,
    /// Consecutive failed attempts that enter degraded mode.
    pub max_attempts: u32,
    /// Retry interval while degraded.
    pub background_interval: Duration,
    /// Ping interval.
    pub heartbeat_interval: Duration,
    /// Grace period after a missed heartbeat.
    pub pong_timeout: Duration,
    /// Deadline for the WebSocket handshake; expiry counts as a failed attempt.
    pub connect_timeout: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            backoff: [1, 2, 4, 8, 16, 30].map(Duration::from_secs).to_vec(),
            max_attempts: 10,
            background_interval: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the retry following `attempt` consecutive failures.
    ///
    /// Clamps to the last table entry; an empty table falls back to the
    /// background interval.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let index = (attempt.max(1) - 1) as usize;
        self.backoff
            .get(index)
            .or_else(|| self.backoff.last())
            .copied()
            .unwrap_or(self.background_interval)
    }

    /// Silence after which the socket is considered dead.
    #[inline]
    #[must_use]
    pub fn liveness_deadline(&self) -> Duration {
        self.heartbeat_interval + self.pong_timeout
    }
}

// ============================================================================
// Input / Effect
// ============================================================================

/// Something that happened to the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Caller asked to connect.
    Start,
    /// The socket opened.
    Opened {
        /// When it opened.
        at: Instant,
    },
    /// A frame arrived (including heartbeat acks).
    Message {
        /// When it arrived.
        at: Instant,
    },
    /// The socket closed or failed to open.
    Closed {
        /// Close code ([`ABNORMAL_CLOSURE`] when none was received).
        code: u16,
        /// Close reason or error text.
        reason: String,
    },
    /// The heartbeat timer fired.
    HeartbeatTick {
        /// Current time.
        now: Instant,
    },
    /// The reconnect timer fired.
    ReconnectTimer,
    /// Caller tore the connection down.
    Teardown,
}

/// Work the runner must perform after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Open a new socket (new epoch).
    OpenSocket,
    /// Close the current socket; its later inputs are stale.
    CloseSocket,
    /// Arm the periodic heartbeat.
    StartHeartbeat,
    /// Disarm the heartbeat.
    StopHeartbeat,
    /// Write one ping frame.
    SendPing,
    /// Arm the reconnect timer (replacing any armed one).
    ScheduleReconnect(Duration),
    /// Disarm the reconnect timer.
    CancelReconnect,
    /// Begin HTTP polling.
    StartPolling,
    /// Stop HTTP polling.
    StopPolling,
    /// Dispatch a local event.
    Emit {
        /// Event name.
        event: &'static str,
        /// Event payload.
        payload: Value,
    },
}

// ============================================================================
// ConnectionMachine
// ============================================================================

/// The connection manager's state as one value.
#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    /// Current state.
    state: ConnectionState,
    /// Consecutive failed attempts since the last successful open.
    attempts: u32,
    /// Set on entering degraded mode, cleared on the next open.
    degraded: bool,
    /// Last liveness signal on the open socket.
    last_seen: Option<Instant>,
    /// Whether a socket has ever opened.
    opened_before: bool,
    /// Set by [`Input::Teardown`]; every later input is ignored.
    torn_down: bool,
    /// Timing parameters.
    policy: ReconnectPolicy,
}

impl ConnectionMachine {
    /// Creates a disconnected machine.
    #[must_use]
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            attempts: 0,
            degraded: false,
            last_seen: None,
            opened_before: false,
            torn_down: false,
            policy,
        }
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Returns `true` while in degraded mode (including background retries).
    #[inline]
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Returns the consecutive failure count.
    #[inline]
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Returns `true` after teardown.
    #[inline]
    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Returns the timing parameters.
    #[inline]
    #[must_use]
    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Applies `input` and returns the resulting effects in order.
    pub fn handle(&mut self, input: Input) -> Vec<Effect> {
        if self.torn_down {
            // A socket that finished opening after teardown still has to go.
            return match input {
                Input::Opened { .. } => vec![Effect::CloseSocket],
                _ => Vec::new(),
            };
        }

        match input {
            Input::Start => self.on_start(),
            Input::Opened { at } => self.on_opened(at),
            Input::Message { at } => {
                if self.state == ConnectionState::Connected {
                    self.last_seen = Some(at);
                }
                Vec::new()
            }
            Input::Closed { code, reason } => {
                if !self.state.has_socket() {
                    return Vec::new();
                }
                self.on_closed(code, reason)
            }
            Input::HeartbeatTick { now } => self.on_heartbeat(now),
            Input::ReconnectTimer => self.on_reconnect_timer(),
            Input::Teardown => self.on_teardown(),
        }
    }

    fn on_start(&mut self) -> Vec<Effect> {
        match self.state {
            ConnectionState::Disconnected => {
                self.state = ConnectionState::Connecting;
                vec![Effect::CancelReconnect, Effect::OpenSocket]
            }
            // Already connecting, connected, or retrying in the background.
            _ => Vec::new(),
        }
    }

    fn on_reconnect_timer(&mut self) -> Vec<Effect> {
        match self.state {
            ConnectionState::Disconnected | ConnectionState::Degraded => {
                self.state = ConnectionState::Connecting;
                vec![Effect::OpenSocket]
            }
            _ => Vec::new(),
        }
    }

    fn on_opened(&mut self, at: Instant) -> Vec<Effect> {
        if self.state != ConnectionState::Connecting {
            return Vec::new();
        }

        let reconnected = self.opened_before;
        self.state = ConnectionState::Connected;
        self.attempts = 0;
        self.last_seen = Some(at);
        self.opened_before = true;

        let mut effects = vec![
            Effect::CancelReconnect,
            Effect::StartHeartbeat,
            Effect::Emit {
                event: names::WEBSOCKET_CONNECTED,
                payload: json!({ "reconnected": reconnected }),
            },
        ];

        if self.degraded {
            self.degraded = false;
            effects.push(Effect::StopPolling);
            effects.push(Effect::Emit {
                event: names::CONNECTION_MODE_CHANGED,
                payload: ConnectionMode::WebSocket.changed_payload(),
            });
        }

        effects
    }

    fn on_heartbeat(&mut self, now: Instant) -> Vec<Effect> {
        if self.state != ConnectionState::Connected {
            return Vec::new();
        }

        let silent_for = self
            .last_seen
            .map_or(Duration::MAX, |seen| now.saturating_duration_since(seen));

        if silent_for > self.policy.liveness_deadline() {
            let mut effects = vec![Effect::CloseSocket];
            effects.extend(self.on_closed(ABNORMAL_CLOSURE, HEARTBEAT_TIMEOUT_REASON.to_string()));
            effects
        } else {
            vec![Effect::SendPing]
        }
    }

    fn on_closed(&mut self, code: u16, reason: String) -> Vec<Effect> {
        self.last_seen = None;

        let mut effects = vec![
            Effect::StopHeartbeat,
            Effect::Emit {
                event: names::WEBSOCKET_DISCONNECTED,
                payload: json!({ "code": code, "reason": reason }),
            },
        ];

        if self.degraded {
            self.state = ConnectionState::Degraded;
            effects.push(Effect::ScheduleReconnect(self.policy.background_interval));
            return effects;
        }

        self.attempts = self.attempts.saturating_add(1);

        if self.attempts >= self.policy.max_attempts {
            self.degraded = true;
            self.state = ConnectionState::Degraded;
            effects.push(Effect::StartPolling);
            effects.push(Effect::Emit {
                event: names::CONNECTION_MODE_CHANGED,
                payload: ConnectionMode::Polling.changed_payload(),
            });
            effects.push(Effect::ScheduleReconnect(self.policy.background_interval));
        } else {
            self.state = ConnectionState::Disconnected;
            effects.push(Effect::ScheduleReconnect(self.policy.delay_for(self.attempts)));
        }

        effects
    }

    fn on_teardown(&mut self) -> Vec<Effect> {
        self.torn_down = true;
        self.state = ConnectionState::Disconnected;
        self.degraded = false;
        self.last_seen = None;

        vec![
            Effect::CloseSocket,
            Effect::StopHeartbeat,
            Effect::CancelReconnect,
            Effect::StopPolling,
        ]
    }
}

// ============================================================================
// Tests
// ============================================================================
