//! Socket lifecycle state machine.
//!
//! Owns the single logical WebSocket: opening, sending, closing, scheduled
//! reconnection and fan-out of inbound frames. Uses the action pattern: the
//! manager never touches the network, it queues [`ConnectionAction`]s that a
//! driver drains with [`ConnectionManager::take_actions`] and executes, then
//! reports outcomes back through the `handle_*` methods.
//!
//! # State Machine
//!
//! ```text
//!                 connect                 handle_open
//! ┌──────────────┐───────>┌────────────┐────────────>┌──────┐
//! │ Disconnected │        │ Connecting │             │ Open │
//! └──────────────┘<───────└────────────┘             └──────┘
//!        ^  ^      open failed                          │ handle_closing
//!        │  │                                           ↓
//!        │  │          handle_closed              ┌─────────┐
//!        │  └─────────────────────────────────────│ Closing │
//!        │                                        └─────────┘
//!        └── tick (backoff elapsed) re-enters Connecting
//! ```
//!
//! Every `Open` action carries a fresh [`SocketId`]. Notifications for any
//! other id belong to a socket the manager has already abandoned and are
//! ignored, so at most one physical socket is ever considered live.

use std::{
    ops::Sub,
    time::{Duration, Instant},
};

use serde::Serialize;
use serde_json::Value;

use crate::{
    credentials::{AuthToken, SocketUrl},
    error::{ConnectionError, HandlerError},
    registry::{HandlerId, HandlerIds, HandlerRegistry},
};

/// Reconnect attempts allowed after an unexpected close.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Backoff unit; attempt `n` waits `base * 2^n`.
pub const DEFAULT_RECONNECT_BASE: Duration = Duration::from_secs(1);

/// Upper bound on any single backoff delay.
pub const DEFAULT_RECONNECT_CAP: Duration = Duration::from_secs(30);

/// Local development server.
pub const DEFAULT_BASE_URL: &str = "ws://127.0.0.1:8000";

/// Work for the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Dial a new socket. Report the result via `handle_open` or
    /// `handle_open_failed` with the same id.
    Open {
        /// Identity of the socket to open
        socket: SocketId,
        /// Target URL, token included
        url: SocketUrl,
    },

    /// Send a text frame on an open socket.
    Send {
        /// Socket to send on
        socket: SocketId,
        /// Serialized JSON frame
        text: String,
    },

    /// Close a socket. The driver need not report the close back.
    Close {
        /// Socket to close
        socket: SocketId,
    },
}

/// Identity of one physical socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketId(u64);

impl SocketId {
    /// Raw id, for log fields.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SocketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "socket#{}", self.0)
    }
}

/// Ready state of the live socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketState {
    /// No socket
    Disconnected,
    /// Handshake in progress
    Connecting,
    /// Frames may be sent
    Open,
    /// Close handshake in progress
    Closing,
}

/// Close notification delivered to close handlers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CloseEvent {
    /// WebSocket close code, if the peer sent one
    pub code: Option<u16>,
    /// Close reason
    pub reason: String,
}

fn close_reason(event: &CloseEvent) -> String {
    match (event.code, event.reason.is_empty()) {
        (Some(code), true) => format!("closed with code {code}"),
        (Some(code), false) => format!("closed with code {code}: {}", event.reason),
        (None, true) => "closed before open".to_string(),
        (None, false) => event.reason.clone(),
    }
}

/// Connection manager configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket base URL, e.g. `wss://chat.example.com`
    pub base_url: String,
    /// Attempts allowed before giving up on reconnection
    pub max_reconnect_attempts: u32,
    /// Backoff unit
    pub reconnect_base: Duration,
    /// Backoff cap
    pub reconnect_cap: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
            reconnect_base: DEFAULT_RECONNECT_BASE,
            reconnect_cap: DEFAULT_RECONNECT_CAP,
        }
    }
}

/// Path and token of the most recent `connect` call.
///
/// Reconnects re-read these, so they always use the latest values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    /// Endpoint path appended to the base URL
    pub path: String,
    /// Socket token
    pub token: AuthToken,
}

/// Result of [`ConnectionManager::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A new socket is being opened
    Started(SocketId),
    /// A socket is already open or opening; nothing was done
    AlreadyActive,
}

/// Delay before reconnect attempt `attempt` (1-based).
///
/// `min(cap, base * 2^attempt)`, so the first retry waits two units.
#[must_use]
pub fn backoff_delay(config: &ConnectionConfig, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    config.reconnect_base.saturating_mul(factor).min(config.reconnect_cap)
}

#[derive(Debug, Clone, Copy)]
struct PendingReconnect<I> {
    scheduled_at: I,
    delay: Duration,
}

/// Single-socket connection manager.
///
/// Pure state machine: time is passed in, I/O is returned as actions. Generic
/// over `Instant` so the simulation harness can drive it on a virtual clock.
#[derive(Debug)]
pub struct ConnectionManager<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    config: ConnectionConfig,
    state: SocketState,
    socket: Option<SocketId>,
    next_socket: u64,
    params: Option<ConnectionParams>,
    reconnect_attempts: u32,
    pending_reconnect: Option<PendingReconnect<I>>,
    actions: Vec<ConnectionAction>,
    handler_ids: HandlerIds,
    message_handlers: HandlerRegistry<Value>,
    connection_handlers: HandlerRegistry<bool>,
    error_handlers: HandlerRegistry<ConnectionError>,
    close_handlers: HandlerRegistry<CloseEvent>,
}

impl<I> ConnectionManager<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create a manager with no socket.
    #[must_use]
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            state: SocketState::Disconnected,
            socket: None,
            next_socket: 0,
            params: None,
            reconnect_attempts: 0,
            pending_reconnect: None,
            actions: Vec::new(),
            handler_ids: HandlerIds::new(),
            message_handlers: HandlerRegistry::new("message"),
            connection_handlers: HandlerRegistry::new("connection"),
            error_handlers: HandlerRegistry::new("error"),
            close_handlers: HandlerRegistry::new("close"),
        }
    }

    /// Ready state of the current socket.
    #[must_use]
    pub fn socket_state(&self) -> SocketState {
        self.state
    }

    /// True iff a socket exists and is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == SocketState::Open && self.socket.is_some()
    }

    /// Id of the live socket, if any.
    #[must_use]
    pub fn socket(&self) -> Option<SocketId> {
        self.socket
    }

    /// Reconnect attempts since the last successful open.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    /// Whether a reconnect timer is armed.
    #[must_use]
    pub fn reconnect_pending(&self) -> bool {
        self.pending_reconnect.is_some()
    }

    /// Time until the armed reconnect fires, or `None` if none is armed.
    #[must_use]
    pub fn reconnect_due_in(&self, now: I) -> Option<Duration> {
        self.pending_reconnect
            .map(|pending| pending.delay.saturating_sub(now - pending.scheduled_at))
    }

    /// Parameters of the most recent `connect`.
    #[must_use]
    pub fn params(&self) -> Option<&ConnectionParams> {
        self.params.as_ref()
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Drain queued actions.
    pub fn take_actions(&mut self) -> Vec<ConnectionAction> {
        std::mem::take(&mut self.actions)
    }

    /// Open a socket to `<base><path>?token=<token>`.
    ///
    /// No-op if a socket is already open or opening. Stores `path` and `token`
    /// for later reconnects and cancels any armed reconnect timer.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::InvalidState` while a close handshake is running
    /// - `ConnectionError::InvalidUrl` if the URL cannot be built; error
    ///   handlers are notified as well
    pub fn connect(
        &mut self,
        path: &str,
        token: AuthToken,
    ) -> Result<ConnectOutcome, ConnectionError> {
        match self.state {
            SocketState::Open | SocketState::Connecting => {
                tracing::debug!(state = ?self.state, "connect ignored, socket already active");
                return Ok(ConnectOutcome::AlreadyActive);
            },
            SocketState::Closing => {
                return Err(ConnectionError::InvalidState {
                    state: self.state,
                    operation: "connect",
                });
            },
            SocketState::Disconnected => {},
        }

        self.params = Some(ConnectionParams { path: path.to_string(), token });
        self.pending_reconnect = None;
        self.open_socket()
    }

    /// Close the socket on purpose.
    ///
    /// Cancels any armed reconnect and resets the attempt counter. A late
    /// close notification for the abandoned socket is ignored, so no
    /// reconnect follows.
    pub fn disconnect(&mut self) {
        let was_open = self.state == SocketState::Open;
        self.pending_reconnect = None;
        self.reconnect_attempts = 0;

        if let Some(socket) = self.socket.take() {
            tracing::info!(%socket, "disconnecting");
            self.actions.push(ConnectionAction::Close { socket });
        }
        self.state = SocketState::Disconnected;

        if was_open {
            self.connection_handlers.notify(&false);
        }
    }

    /// Serialize `payload` and queue it on the open socket.
    ///
    /// Returns false, with a warning, if no socket is open or serialization
    /// fails. Nothing is buffered.
    pub fn send_frame<T: Serialize + ?Sized>(&mut self, payload: &T) -> bool {
        let Some(socket) = self.socket.filter(|_| self.state == SocketState::Open) else {
            tracing::warn!(state = ?self.state, "dropping frame, socket not open");
            return false;
        };

        match serde_json::to_string(payload) {
            Ok(text) => {
                tracing::trace!(%socket, bytes = text.len(), "queueing frame");
                self.actions.push(ConnectionAction::Send { socket, text });
                true
            },
            Err(error) => {
                tracing::warn!(%error, "dropping frame, serialization failed");
                false
            },
        }
    }

    /// Driver: the socket finished its opening handshake.
    pub fn handle_open(&mut self, socket: SocketId) {
        if !self.is_current(socket) || self.state != SocketState::Connecting {
            tracing::debug!(%socket, "ignoring open for stale socket");
            return;
        }

        tracing::info!(%socket, "socket open");
        self.state = SocketState::Open;
        self.reconnect_attempts = 0;
        self.connection_handlers.notify(&true);
    }

    /// Driver: the opening handshake failed.
    ///
    /// Counts as an unexpected close: error and close handlers are notified
    /// and a reconnect is scheduled.
    pub fn handle_open_failed(&mut self, socket: SocketId, reason: &str, now: I) {
        if !self.is_current(socket) || self.state != SocketState::Connecting {
            tracing::debug!(%socket, "ignoring open failure for stale socket");
            return;
        }

        tracing::warn!(%socket, reason, "socket open failed");
        self.state = SocketState::Disconnected;
        self.socket = None;

        self.error_handlers.notify(&ConnectionError::Handshake { reason: reason.to_string() });
        self.close_handlers.notify(&CloseEvent { code: None, reason: reason.to_string() });
        self.schedule_reconnect(now);
    }

    /// Driver: a text frame arrived.
    ///
    /// Frames that are not JSON are logged and dropped without reaching any
    /// handler.
    pub fn handle_text(&mut self, socket: SocketId, text: &str) {
        if !self.is_current(socket) || self.state != SocketState::Open {
            tracing::debug!(%socket, "ignoring frame for stale socket");
            return;
        }

        match serde_json::from_str::<Value>(text) {
            Ok(value) => {
                let kind = value.get("type").and_then(Value::as_str).unwrap_or("<untyped>");
                tracing::debug!(kind, "frame received");
                self.message_handlers.notify(&value);
            },
            Err(error) => {
                tracing::warn!(%error, bytes = text.len(), "dropping unparseable frame");
            },
        }
    }

    /// Driver: socket-level error while open or connecting.
    pub fn handle_error(&mut self, socket: SocketId, reason: &str) {
        if !self.is_current(socket) {
            return;
        }

        tracing::warn!(%socket, reason, "socket error");
        self.error_handlers.notify(&ConnectionError::Transport(reason.to_string()));
    }

    /// Driver: the peer started the close handshake.
    pub fn handle_closing(&mut self, socket: SocketId) {
        if self.is_current(socket) && self.state == SocketState::Open {
            self.state = SocketState::Closing;
        }
    }

    /// Driver: the socket closed without `disconnect` being called.
    ///
    /// Connection handlers hear `false` if the socket had been open; a socket
    /// that never opened counts as a failed handshake and reaches the error
    /// handlers instead. A reconnect is scheduled unless attempts are
    /// exhausted.
    pub fn handle_closed(&mut self, socket: SocketId, event: &CloseEvent, now: I) {
        if !self.is_current(socket) {
            tracing::debug!(%socket, "ignoring close for stale socket");
            return;
        }

        let was_open = matches!(self.state, SocketState::Open | SocketState::Closing);
        tracing::info!(%socket, code = ?event.code, reason = %event.reason, "socket closed");

        self.state = SocketState::Disconnected;
        self.socket = None;

        if was_open {
            self.connection_handlers.notify(&false);
        } else {
            // Closed before the handshake completed.
            self.error_handlers
                .notify(&ConnectionError::Handshake { reason: close_reason(event) });
        }
        self.close_handlers.notify(event);
        self.schedule_reconnect(now);
    }

    /// Periodic maintenance. Fires an armed reconnect once its delay elapsed.
    ///
    /// Returns true if a reconnect attempt started.
    pub fn tick(&mut self, now: I) -> bool {
        let Some(pending) = self.pending_reconnect else {
            return false;
        };

        if now - pending.scheduled_at < pending.delay {
            return false;
        }

        self.pending_reconnect = None;

        if self.state != SocketState::Disconnected {
            return false;
        }

        tracing::info!(attempt = self.reconnect_attempts, "reconnecting");
        matches!(self.open_socket(), Ok(ConnectOutcome::Started(_)))
    }

    /// Register a handler for parsed inbound frames.
    pub fn add_message_handler<F>(&mut self, handler: F) -> HandlerId
    where
        F: FnMut(&Value) -> Result<(), HandlerError> + Send + 'static,
    {
        self.message_handlers.add(&mut self.handler_ids, handler)
    }

    /// Remove a message handler. Returns false if unknown.
    pub fn remove_message_handler(&mut self, id: HandlerId) -> bool {
        self.message_handlers.remove(id)
    }

    /// Register a handler for open (`true`) and loss of an open socket
    /// (`false`).
    pub fn add_connection_handler<F>(&mut self, handler: F) -> HandlerId
    where
        F: FnMut(&bool) -> Result<(), HandlerError> + Send + 'static,
    {
        self.connection_handlers.add(&mut self.handler_ids, handler)
    }

    /// Remove a connection handler. Returns false if unknown.
    pub fn remove_connection_handler(&mut self, id: HandlerId) -> bool {
        self.connection_handlers.remove(id)
    }

    /// Register a handler for socket errors.
    pub fn add_error_handler<F>(&mut self, handler: F) -> HandlerId
    where
        F: FnMut(&ConnectionError) -> Result<(), HandlerError> + Send + 'static,
    {
        self.error_handlers.add(&mut self.handler_ids, handler)
    }

    /// Remove an error handler. Returns false if unknown.
    pub fn remove_error_handler(&mut self, id: HandlerId) -> bool {
        self.error_handlers.remove(id)
    }

    /// Register a handler for unexpected closes.
    pub fn add_close_handler<F>(&mut self, handler: F) -> HandlerId
    where
        F: FnMut(&CloseEvent) -> Result<(), HandlerError> + Send + 'static,
    {
        self.close_handlers.add(&mut self.handler_ids, handler)
    }

    /// Remove a close handler. Returns false if unknown.
    pub fn remove_close_handler(&mut self, id: HandlerId) -> bool {
        self.close_handlers.remove(id)
    }

    fn is_current(&self, socket: SocketId) -> bool {
        self.socket == Some(socket)
    }

    fn open_socket(&mut self) -> Result<ConnectOutcome, ConnectionError> {
        let Some(params) = &self.params else {
            return Err(ConnectionError::InvalidState { state: self.state, operation: "reconnect" });
        };

        let url = match SocketUrl::build(&self.config.base_url, &params.path, &params.token) {
            Ok(url) => url,
            Err(error) => {
                tracing::error!(%error, "cannot build socket url");
                self.error_handlers.notify(&error);
                return Err(error);
            },
        };

        self.next_socket += 1;
        let socket = SocketId(self.next_socket);
        tracing::info!(%socket, %url, "connecting");

        self.socket = Some(socket);
        self.state = SocketState::Connecting;
        self.actions.push(ConnectionAction::Open { socket, url });
        Ok(ConnectOutcome::Started(socket))
    }

    fn schedule_reconnect(&mut self, now: I) {
        if self.params.is_none() {
            return;
        }

        if self.reconnect_attempts >= self.config.max_reconnect_attempts {
            tracing::warn!(
                attempts = self.reconnect_attempts,
                "maximum reconnect attempts reached, giving up"
            );
            self.pending_reconnect = None;
            return;
        }

        self.reconnect_attempts += 1;
        let delay = backoff_delay(&self.config, self.reconnect_attempts);
        tracing::info!(attempt = self.reconnect_attempts, ?delay, "scheduling reconnect");
        self.pending_reconnect = Some(PendingReconnect { scheduled_at: now, delay });
    }
}
