//! WebSocket connection manager.
//!
//! Runs the [`ConnectionMachine`]: every socket event and timer tick is fed
//! in as an [`Input`], and the returned [`Effect`]s are carried out here
//! with tokio timers and a tokio-tungstenite socket.
//!
//! # Tasks
//!
//! | Task | Lifetime | Feeds |
//! |------|----------|-------|
//! | Socket | One connection epoch | `Opened`, `Message`, `Closed` |
//! | Heartbeat | While connected | `HeartbeatTick` |
//! | Reconnect | One pending retry | `ReconnectTimer` |
//! | Polling | While degraded | (HTTP status command) |
//!
//! Tasks hold a weak reference to the manager and exit once it is gone.
//! Socket inputs carry their [`ConnectionEpoch`]; inputs from a socket
//! that was already closed by the manager are ignored.
//!
//! Events are dispatched after the machine lock is released, so a
//! listener may call back into the client.

// ============================================================================
// Imports
// ============================================================================

use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::{ClientId, ConnectionEpoch};
use crate::listener::Dispatcher;
use crate::protocol::{InboundFrame, OutboundFrame, Ping};

use super::auth::AuthToken;
use super::http::HttpClient;
use super::state::{
    ABNORMAL_CLOSURE, CONNECT_TIMEOUT_REASON, ConnectionMachine, ConnectionState, Effect, Input,
    ReconnectPolicy,
};

// ============================================================================
// Constants
// ============================================================================

/// Close code reported when the peer sent a close frame without one.
const NO_STATUS_RECEIVED: u16 = 1005;

// ============================================================================
// Types
// ============================================================================

/// Commands for the socket task.
#[derive(Debug)]
enum SocketCommand {
    /// Write a text frame.
    Text(String),
    /// Close the socket and exit.
    Close,
}

/// The socket of the current epoch.
struct SocketHandle {
    /// Outbound frames.
    outbound: mpsc::UnboundedSender<SocketCommand>,
    /// Socket task.
    task: JoinHandle<()>,
}

/// Current epoch and its socket, if any.
#[derive(Default)]
struct SocketSlot {
    /// Epoch of the newest socket.
    epoch: ConnectionEpoch,
    /// Newest socket, until closed.
    handle: Option<SocketHandle>,
}

/// Armed timers.
#[derive(Default)]
struct Timers {
    heartbeat: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
    polling: Option<JoinHandle<()>>,
}

/// Polling parameters used while degraded.
#[derive(Debug, Clone)]
pub struct PollingConfig {
    /// Status command to issue.
    pub command: String,
    /// Interval between polls.
    pub interval: Duration,
}

// ============================================================================
// ConnectionManager
// ============================================================================

/// Owns the realtime push channel.
///
/// Dropping the manager tears the connection down.
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    /// Client identity, for logs.
    client_id: ClientId,
    /// Socket URL without credentials.
    ws_url: Url,
    /// Token appended as `?token=`.
    auth: Arc<AuthToken>,
    /// Event sink.
    dispatcher: Arc<Dispatcher>,
    /// Used for polling while degraded.
    http: Arc<HttpClient>,
    /// Polling parameters.
    polling: PollingConfig,
    /// Transition state. Locked before `socket` and `timers`.
    machine: Mutex<ConnectionMachine>,
    /// Current socket.
    socket: Mutex<SocketSlot>,
    /// Armed timers.
    timers: Mutex<Timers>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("client_id", &self.inner.client_id)
            .field("ws_url", &self.inner.ws_url.as_str())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Creates a manager; nothing happens until [`connect`](Self::connect).
    #[must_use]
    pub fn new(
        client_id: ClientId,
        ws_url: Url,
        policy: ReconnectPolicy,
        polling: PollingConfig,
        auth: Arc<AuthToken>,
        dispatcher: Arc<Dispatcher>,
        http: Arc<HttpClient>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                client_id,
                ws_url,
                auth,
                dispatcher,
                http,
                polling,
                machine: Mutex::new(ConnectionMachine::new(policy)),
                socket: Mutex::new(SocketSlot::default()),
                timers: Mutex::new(Timers::default()),
            }),
        }
    }

    /// Opens the push channel.
    ///
    /// Must be called within a Tokio runtime. No-op if already connecting,
    /// connected or retrying, and after [`shutdown`](Self::shutdown).
    pub fn connect(&self) {
        self.inner.apply(Input::Start, None);
    }

    /// Closes the socket and clears every timer. Irreversible.
    pub fn shutdown(&self) {
        self.inner.apply(Input::Teardown, None);
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.machine.lock().state()
    }

    /// Returns `true` while in degraded (polling) mode.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.inner.machine.lock().is_degraded()
    }

    /// Returns the epoch of the newest socket.
    #[must_use]
    pub fn epoch(&self) -> ConnectionEpoch {
        self.inner.socket.lock().epoch
    }

    /// Writes a `{type, data}` frame on the open socket.
    ///
    /// Returns `false` (and drops the frame) when not connected.
    pub fn send_realtime(&self, kind: &str, data: Value) -> bool {
        if self.state() != ConnectionState::Connected {
            debug!(kind, "Socket not connected, dropping realtime frame");
            return false;
        }

        let result = serde_json::to_string(&OutboundFrame::new(kind, data))
            .map_err(Error::from)
            .and_then(|text| self.inner.write(text));

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(kind, error = %e, "Failed to send realtime frame");
                false
            }
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// Inner: transitions and effects
// ============================================================================

impl Inner {
    /// Feeds `input` to the machine and carries out the effects.
    ///
    /// With `from_epoch` set, the input is dropped unless it comes from the
    /// current socket.
    fn apply(self: &Arc<Self>, input: Input, from_epoch: Option<ConnectionEpoch>) {
        let events = {
            let mut machine = self.machine.lock();

            if let Some(epoch) = from_epoch {
                let current = self.socket.lock().epoch;
                if epoch != current {
                    trace!(%epoch, %current, "Ignoring input from stale socket");
                    return;
                }
            }

            let effects = machine.handle(input);

            // Effects run under the machine lock so transitions never
            // interleave; none of them re-enters `apply` synchronously.
            let mut events = Vec::new();
            for effect in effects {
                match effect {
                    Effect::Emit { event, payload } => events.push((event, payload)),
                    other => self.execute(other, machine.policy()),
                }
            }
            events
        };

        for (event, payload) in events {
            self.dispatcher.emit(event, payload);
        }
    }

    fn execute(self: &Arc<Self>, effect: Effect, policy: &ReconnectPolicy) {
        match effect {
            Effect::OpenSocket => self.open_socket(policy.connect_timeout),
            Effect::CloseSocket => self.close_socket(),
            Effect::StartHeartbeat => {
                let handle = self.spawn_heartbeat(policy.heartbeat_interval);
                replace(&mut self.timers.lock().heartbeat, Some(handle));
            }
            Effect::StopHeartbeat => replace(&mut self.timers.lock().heartbeat, None),
            Effect::SendPing => {
                if let Ok(text) = serde_json::to_string(&Ping::now()) {
                    trace!(client = %self.client_id, "Sending ping");
                    if let Err(e) = self.write(text) {
                        debug!(client = %self.client_id, error = %e, "Ping not sent");
                    }
                }
            }
            Effect::ScheduleReconnect(delay) => {
                info!(
                    client = %self.client_id,
                    delay_ms = delay.as_millis() as u64,
                    "Scheduling reconnect"
                );
                let handle = self.spawn_reconnect(delay);
                replace(&mut self.timers.lock().reconnect, Some(handle));
            }
            Effect::CancelReconnect => replace(&mut self.timers.lock().reconnect, None),
            Effect::StartPolling => {
                warn!(
                    client = %self.client_id,
                    command = %self.polling.command,
                    interval_ms = self.polling.interval.as_millis() as u64,
                    "WebSocket unavailable, falling back to HTTP polling"
                );
                let handle = self.spawn_polling();
                replace(&mut self.timers.lock().polling, Some(handle));
            }
            Effect::StopPolling => replace(&mut self.timers.lock().polling, None),
            Effect::Emit { event, payload } => {
                self.dispatcher.emit(event, payload);
            }
        }
    }

    // ========================================================================
    // Socket
    // ========================================================================

    fn open_socket(self: &Arc<Self>, connect_timeout: Duration) {
        let mut url = self.ws_url.clone();
        if let Some(token) = self.auth.current() {
            url.query_pairs_mut().append_pair("token", &token);
        }

        let mut slot = self.socket.lock();
        if let Some(old) = slot.handle.take() {
            shut(old);
        }

        slot.epoch = slot.epoch.next();
        let epoch = slot.epoch;
        let (outbound, commands) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_socket(
            Arc::downgrade(self),
            epoch,
            url,
            connect_timeout,
            commands,
        ));
        slot.handle = Some(SocketHandle { outbound, task });

        info!(client = %self.client_id, %epoch, url = %self.ws_url, "Opening WebSocket");
    }

    fn close_socket(&self) {
        let mut slot = self.socket.lock();
        // Any input still in flight from the closed socket is now stale.
        slot.epoch = slot.epoch.next();
        if let Some(handle) = slot.handle.take() {
            debug!(client = %self.client_id, "Closing WebSocket");
            shut(handle);
        }
    }

    /// Queues `text` on the current socket.
    fn write(&self, text: String) -> Result<()> {
        let slot = self.socket.lock();
        let handle = slot.handle.as_ref().ok_or(Error::ConnectionClosed)?;
        handle
            .outbound
            .send(SocketCommand::Text(text))
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Handles one inbound text frame from the socket of `epoch`.
    fn on_text(self: &Arc<Self>, epoch: ConnectionEpoch, text: &str) {
        // Any frame proves the peer is alive, even one we cannot parse.
        self.apply(Input::Message { at: Instant::now() }, Some(epoch));

        let frame = match InboundFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(client = %self.client_id, error = %e, "Dropping malformed frame");
                return;
            }
        };

        match frame {
            InboundFrame::HeartbeatAck => trace!(client = %self.client_id, "Heartbeat acknowledged"),
            InboundFrame::Data(envelope) => {
                if self.socket.lock().epoch == epoch {
                    self.dispatcher.dispatch(envelope);
                }
            }
        }
    }

    // ========================================================================
    // Timers
    // ========================================================================

    fn spawn_heartbeat(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                inner.apply(Input::HeartbeatTick { now: Instant::now() }, None);
            }
        })
    }

    fn spawn_reconnect(self: &Arc<Self>, delay: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.apply(Input::ReconnectTimer, None);
            }
        })
    }

    fn spawn_polling(self: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let PollingConfig { command, interval } = self.polling.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(http) = weak.upgrade().map(|inner| Arc::clone(&inner.http)) else {
                    break;
                };
                trace!(%command, "Polling");
                http.invoke(&command, json!({})).await;
            }
        })
    }
}

/// Aborts the previous timer, if any, and stores `next`.
fn replace(slot: &mut Option<JoinHandle<()>>, next: Option<JoinHandle<()>>) {
    if let Some(old) = std::mem::replace(slot, next) {
        old.abort();
    }
}

/// Asks a socket task to close, aborting it if it is already gone.
fn shut(handle: SocketHandle) {
    if handle.outbound.send(SocketCommand::Close).is_err() {
        handle.task.abort();
    }
}

// ============================================================================
// Socket Task
// ============================================================================

/// Connects, then pumps frames until the socket or the manager goes away.
///
/// A handshake that does not finish within `connect_timeout` is reported
/// as an abnormal close, like any other failed attempt.
async fn run_socket(
    inner: Weak<Inner>,
    epoch: ConnectionEpoch,
    url: Url,
    connect_timeout: Duration,
    mut commands: mpsc::UnboundedReceiver<SocketCommand>,
) {
    let connect = tokio::time::timeout(connect_timeout, connect_async(url.as_str()));
    tokio::pin!(connect);

    let connected = loop {
        tokio::select! {
            result = &mut connect => break result,
            command = commands.recv() => match command {
                Some(SocketCommand::Text(_)) => debug!(%epoch, "Socket not open, dropping frame"),
                Some(SocketCommand::Close) | None => {
                    debug!(%epoch, "Connect abandoned");
                    return;
                }
            },
        }
    };

    let outcome = match connected {
        Ok(Ok((stream, _response))) => Ok(stream),
        Ok(Err(e)) => {
            let error = Error::from(e);
            warn!(
                %epoch,
                recoverable = error.is_recoverable(),
                error = %error,
                "WebSocket connect failed"
            );
            Err(error.to_string())
        }
        Err(_elapsed) => {
            warn!(
                %epoch,
                timeout_ms = connect_timeout.as_millis() as u64,
                "WebSocket handshake timed out"
            );
            Err(CONNECT_TIMEOUT_REASON.to_string())
        }
    };

    let stream = match outcome {
        Ok(stream) => stream,
        Err(reason) => {
            if let Some(inner) = inner.upgrade() {
                let input = Input::Closed {
                    code: ABNORMAL_CLOSURE,
                    reason,
                };
                inner.apply(input, Some(epoch));
            }
            return;
        }
    };

    match inner.upgrade() {
        Some(inner) => {
            info!(client = %inner.client_id, %epoch, "WebSocket connected");
            inner.apply(Input::Opened { at: Instant::now() }, Some(epoch));
        }
        None => return,
    }

    let (mut write, mut read) = stream.split();

    let (code, reason) = loop {
        tokio::select! {
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    let Some(inner) = inner.upgrade() else { return };
                    inner.on_text(epoch, text.as_str());
                }
                Some(Ok(Message::Close(frame))) => {
                    break match frame {
                        Some(frame) => (u16::from(frame.code), frame.reason.as_str().to_string()),
                        None => (NO_STATUS_RECEIVED, String::new()),
                    };
                }
                // Binary frames are not part of the protocol; pings are answered by tungstenite.
                Some(Ok(_)) => {}
                Some(Err(e)) => break (ABNORMAL_CLOSURE, Error::from(e).to_string()),
                None => break (ABNORMAL_CLOSURE, "stream ended".to_string()),
            },

            command = commands.recv() => match command {
                Some(SocketCommand::Text(text)) => {
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        break (ABNORMAL_CLOSURE, e.to_string());
                    }
                }
                Some(SocketCommand::Close) | None => {
                    let _ = write.close().await;
                    debug!(%epoch, "Socket closed locally");
                    return;
                }
            },
        }
    };

    info!(%epoch, code, %reason, "WebSocket closed");
    if let Some(inner) = inner.upgrade() {
        inner.apply(Input::Closed { code, reason }, Some(epoch));
    }
}

// ============================================================================
// Tests
// ============================================================================
