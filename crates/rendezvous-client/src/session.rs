//! Session coordinator.
//!
//! Binds the connection lifecycle to authentication state. While
//! authenticated the coordinator keeps the socket open with the current
//! token; on logout it closes it. Connection callbacks are registered on the
//! [`ConnectionManager`] and forward into a channel, so handler fan-out never
//! needs a borrow of the coordinator; [`SessionCoordinator::process_signals`]
//! drains the channel into status changes and the event log.
//!
//! ```text
//!                  token ok                  handle_open
//! ┌──────────────┐─────────>┌────────────┐─────────────>┌───────────┐
//! │ Disconnected │          │ Connecting │              │ Connected │
//! └──────────────┘<─────────└────────────┘              └───────────┘
//!        ^         logout        │    ^                       │
//!        │                       │    │ reconnect             │ close
//!        │          no token /   ↓    │                       │
//!        │          handshake ┌───────┐                       │
//!        │          failure   │ Error │                       │
//!        │                    └───────┘                       │
//!        └────────────────────────────────────────────────────┘
//! ```

use std::{ops::Sub, time::Duration};

use rendezvous_core::{
    AuthToken, CloseEvent, ConnectOutcome, ConnectionManager, HandlerId, SocketState,
};
use rendezvous_proto::{InboundEvent, OutboundFrame, ProtocolError};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::{
    error::TokenStoreError,
    event_log::{DEFAULT_LOG_CAPACITY, EventLog, LoggedEvent},
};

/// Chat endpoint path on the WebSocket host.
pub const DEFAULT_CHAT_PATH: &str = "/ws/chat/";

/// User-facing connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionStatus {
    /// No socket, or the socket was lost and a reconnect may be pending
    #[default]
    Disconnected,
    /// Opening a socket
    Connecting,
    /// Socket open
    Connected,
    /// No token, or the last attempt failed
    Error,
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Endpoint path passed to `ConnectionManager::connect`
    pub path: String,
    /// Event log capacity
    pub log_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { path: DEFAULT_CHAT_PATH.to_string(), log_capacity: DEFAULT_LOG_CAPACITY }
    }
}

/// Ticket for one token lookup; answers to superseded tickets are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenRequest(u64);

/// Work for the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Read the token store and answer with `handle_token`
    FetchToken(TokenRequest),
}

#[derive(Debug)]
enum Signal {
    Frame(Value),
    Connection(bool),
    Error(String),
    Closed(CloseEvent),
}

#[derive(Debug, Clone, Copy)]
struct Registration {
    message: HandlerId,
    connection: HandlerId,
    error: HandlerId,
    close: HandlerId,
}

/// Per-session coordinator.
#[derive(Debug)]
pub struct SessionCoordinator {
    config: SessionConfig,
    status: ConnectionStatus,
    authenticated: bool,
    next_request: u64,
    pending_token: Option<TokenRequest>,
    log: EventLog,
    signal_tx: mpsc::UnboundedSender<Signal>,
    signal_rx: mpsc::UnboundedReceiver<Signal>,
    registration: Option<Registration>,
    actions: Vec<SessionAction>,
    status_changes: Vec<ConnectionStatus>,
}

impl SessionCoordinator {
    /// Create a coordinator. Call [`attach`](Self::attach) before use.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let log = EventLog::new(config.log_capacity);
        Self {
            config,
            status: ConnectionStatus::Disconnected,
            authenticated: false,
            next_request: 0,
            pending_token: None,
            log,
            signal_tx,
            signal_rx,
            registration: None,
            actions: Vec::new(),
            status_changes: Vec::new(),
        }
    }

    /// Register the coordinator's handlers on `conn`. Idempotent.
    pub fn attach<I>(&mut self, conn: &mut ConnectionManager<I>)
    where
        I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
    {
        if self.registration.is_some() {
            return;
        }

        let tx = self.signal_tx.clone();
        let message = conn.add_message_handler(move |frame| forward(&tx, Signal::Frame(frame.clone())));
        let tx = self.signal_tx.clone();
        let connection = conn.add_connection_handler(move |up| forward(&tx, Signal::Connection(*up)));
        let tx = self.signal_tx.clone();
        let error = conn.add_error_handler(move |error| forward(&tx, Signal::Error(error.to_string())));
        let tx = self.signal_tx.clone();
        let close = conn.add_close_handler(move |event| forward(&tx, Signal::Closed(event.clone())));

        self.registration = Some(Registration { message, connection, error, close });
    }

    /// Remove every handler registered by [`attach`](Self::attach).
    pub fn detach<I>(&mut self, conn: &mut ConnectionManager<I>)
    where
        I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
    {
        if let Some(registration) = self.registration.take() {
            conn.remove_message_handler(registration.message);
            conn.remove_connection_handler(registration.connection);
            conn.remove_error_handler(registration.error);
            conn.remove_close_handler(registration.close);
        }
    }

    /// Whether handlers are registered.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.registration.is_some()
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Whether the authentication signal is currently true.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Ready state of the underlying socket.
    #[must_use]
    pub fn socket_state<I>(&self, conn: &ConnectionManager<I>) -> SocketState
    where
        I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
    {
        conn.socket_state()
    }

    /// Retained events, oldest first.
    pub fn events(&self) -> impl Iterator<Item = &LoggedEvent> {
        self.log.iter()
    }

    /// Retained events after sequence number `after`.
    pub fn events_since(&self, after: u64) -> impl Iterator<Item = &LoggedEvent> {
        self.log.since(after)
    }

    /// The event log.
    #[must_use]
    pub fn log(&self) -> &EventLog {
        &self.log
    }

    /// Empty the event log. The connection is unaffected.
    pub fn clear_messages(&mut self) {
        self.log.clear();
    }

    /// Drain queued actions.
    pub fn take_actions(&mut self) -> Vec<SessionAction> {
        std::mem::take(&mut self.actions)
    }

    /// Drain status transitions since the last call, oldest first.
    ///
    /// A brief drop and recovery shows up as two entries even if the current
    /// status is unchanged, so consumers can redo per-connection setup.
    pub fn take_status_changes(&mut self) -> Vec<ConnectionStatus> {
        std::mem::take(&mut self.status_changes)
    }

    /// Feed the authentication signal.
    ///
    /// `true` requests a token and connects once it arrives. `false` closes
    /// the socket and discards any token lookup still in flight.
    pub fn set_authenticated<I>(&mut self, conn: &mut ConnectionManager<I>, authenticated: bool)
    where
        I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
    {
        self.process_signals();

        if authenticated {
            let already = self.authenticated;
            self.authenticated = true;
            if !already || self.status == ConnectionStatus::Disconnected {
                self.request_token();
            }
            return;
        }

        if self.authenticated {
            tracing::info!("logged out, closing session");
        }
        self.authenticated = false;
        self.pending_token = None;
        conn.disconnect();
        self.set_status(ConnectionStatus::Disconnected);
    }

    /// Driver: answer to a [`SessionAction::FetchToken`].
    pub fn handle_token<I>(
        &mut self,
        conn: &mut ConnectionManager<I>,
        request: TokenRequest,
        result: Result<Option<AuthToken>, TokenStoreError>,
    ) where
        I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
    {
        if self.pending_token != Some(request) {
            tracing::debug!(?request, "ignoring superseded token lookup");
            return;
        }
        self.pending_token = None;

        if !self.authenticated {
            return;
        }

        let token = match result {
            Ok(Some(token)) => token,
            Ok(None) => {
                tracing::warn!("no auth token available");
                self.set_status(ConnectionStatus::Error);
                return;
            },
            Err(error) => {
                tracing::warn!(%error, "token lookup failed");
                self.set_status(ConnectionStatus::Error);
                return;
            },
        };

        match conn.connect(&self.config.path, token) {
            Ok(ConnectOutcome::Started(_)) => self.set_status(ConnectionStatus::Connecting),
            Ok(ConnectOutcome::AlreadyActive) => {
                if conn.is_connected() {
                    self.set_status(ConnectionStatus::Connected);
                }
            },
            Err(error) => {
                tracing::warn!(%error, "connect failed");
                self.set_status(ConnectionStatus::Error);
            },
        }
    }

    /// Manual reconnect.
    ///
    /// Allowed from `Disconnected` or `Error` while authenticated. Returns
    /// true if a token lookup was requested.
    pub fn connect(&mut self) -> bool {
        self.process_signals();

        if !self.authenticated {
            tracing::warn!("reconnect requested while logged out");
            return false;
        }

        if matches!(self.status, ConnectionStatus::Connected | ConnectionStatus::Connecting) {
            return false;
        }

        self.request_token()
    }

    /// Manual disconnect. Authentication is unchanged; `connect` reopens.
    pub fn disconnect<I>(&mut self, conn: &mut ConnectionManager<I>)
    where
        I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
    {
        self.process_signals();
        self.pending_token = None;
        conn.disconnect();
        self.set_status(ConnectionStatus::Disconnected);
    }

    /// Send a frame on the open socket.
    ///
    /// When the socket is not connected the frame is dropped, a reconnect is
    /// requested, and `false` is returned. Nothing is queued for later.
    pub fn send_message<I>(&mut self, conn: &mut ConnectionManager<I>, frame: &OutboundFrame) -> bool
    where
        I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
    {
        if conn.send_frame(frame) {
            tracing::debug!(action = frame.action(), "frame sent");
            return true;
        }

        if !conn.is_connected() {
            tracing::warn!(action = frame.action(), "not connected, requesting reconnect");
            if conn.socket_state() == SocketState::Disconnected && self.authenticated {
                self.request_token();
            }
        }

        false
    }

    /// Periodic maintenance: fires the connection's reconnect timer.
    pub fn tick<I>(&mut self, conn: &mut ConnectionManager<I>, now: I)
    where
        I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
    {
        if conn.tick(now) {
            self.set_status(ConnectionStatus::Connecting);
        }
    }

    /// Apply queued handler notifications. Returns how many were applied.
    pub fn process_signals(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(signal) = self.signal_rx.try_recv() {
            applied += 1;
            match signal {
                Signal::Frame(frame) => self.record(&frame),
                Signal::Connection(true) => self.set_status(ConnectionStatus::Connected),
                Signal::Connection(false) => self.set_status(ConnectionStatus::Disconnected),
                Signal::Error(reason) => {
                    tracing::debug!(%reason, "connection error");
                    self.set_status(ConnectionStatus::Error);
                },
                Signal::Closed(event) => {
                    tracing::debug!(code = ?event.code, "connection closed");
                },
            }
        }
        applied
    }

    fn record(&mut self, frame: &Value) {
        match InboundEvent::from_value(frame) {
            Ok(event) => {
                self.log.push(event);
            },
            Err(ProtocolError::UnknownEvent(kind)) => {
                tracing::debug!(%kind, "ignoring unknown event type");
            },
            Err(error) => {
                tracing::warn!(%error, "dropping undecodable event");
            },
        }
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        if self.status != status {
            tracing::debug!(from = ?self.status, to = ?status, "status changed");
            self.status = status;
            self.status_changes.push(status);
        }
    }

    fn request_token(&mut self) -> bool {
        if self.pending_token.is_some() {
            return false;
        }

        self.next_request += 1;
        let request = TokenRequest(self.next_request);
        self.pending_token = Some(request);
        self.actions.push(SessionAction::FetchToken(request));
        true
    }
}

fn forward(
    tx: &mpsc::UnboundedSender<Signal>,
    signal: Signal,
) -> Result<(), rendezvous_core::HandlerError> {
    tx.send(signal).map_err(|_| rendezvous_core::HandlerError::new("session coordinator dropped"))
}
