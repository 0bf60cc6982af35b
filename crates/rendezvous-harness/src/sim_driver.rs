//! Simulation driver implementing the Driver trait.
//!
//! `SimDriver` provides the same interface as the terminal driver but for
//! deterministic testing. It implements [`Driver`] so the same
//! [`rendezvous_app::Runtime`] orchestration code runs in both production and
//! simulation.
//!
//! Sockets are scripted: a [`SocketPolicy`] decides how every open attempt
//! ends, and tests inject server pushes and drops on the live socket. Token
//! lookups and REST calls run against a [`SimTokenStore`] and a
//! [`SimServer`], either automatically or one at a time under test control.

#![allow(clippy::disallowed_types, reason = "Synchronous locking operations only")]

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use rendezvous_app::{Driver, DriverEvent, Notice, UserInput, View};
use rendezvous_client::{ApiRequest, ConnectionStatus, TokenRequest, TokenStore};
use rendezvous_core::{CloseEvent, ConnectionAction, SocketId, SocketState};
use rendezvous_proto::InboundEvent;
use serde_json::Value;

use crate::{SimInstant, SimServer, SimTokenStore};

/// Error type for simulation driver.
#[derive(Debug, Clone)]
pub struct SimDriverError(pub String);

impl std::fmt::Display for SimDriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimDriverError: {}", self.0)
    }
}

impl std::error::Error for SimDriverError {}

/// How scripted sockets answer an open attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SocketPolicy {
    /// Handshake succeeds
    #[default]
    Accept,
    /// Handshake fails
    Refuse,
    /// No answer until the test calls [`SimDriver::accept`] or
    /// [`SimDriver::refuse`]
    Hold,
}

/// One socket the runtime asked to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketRecord {
    /// Socket identity
    pub socket: SocketId,
    /// Full URL, token included
    pub url: String,
    /// Whether the client closed it
    pub closed_by_client: bool,
}

/// What one render showed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRecord {
    /// Session status
    pub status: ConnectionStatus,
    /// Socket state
    pub socket_state: SocketState,
    /// Message ids, newest first
    pub message_ids: Vec<String>,
    /// Message bodies, newest first
    pub contents: Vec<String>,
    /// Peer typing indicator
    pub peer_typing: bool,
    /// Notices shown with this render
    pub notices: Vec<Notice>,
}

#[derive(Debug, Default)]
struct SharedState {
    pending_events: VecDeque<DriverEvent>,
    token_requests: VecDeque<TokenRequest>,
    api_requests: VecDeque<ApiRequest>,
    sockets: Vec<SocketRecord>,
    live: Option<SocketId>,
    policy: SocketPolicy,
    sent: Vec<(SocketId, String)>,
    renders: Vec<RenderRecord>,
    manual_api: bool,
    stopped: bool,
}

/// Simulation driver for deterministic testing.
///
/// Clones share all scripted state, so a test can keep a handle after the
/// runtime takes ownership of the driver.
#[derive(Clone)]
pub struct SimDriver {
    state: Arc<Mutex<SharedState>>,
    server: SimServer,
    tokens: SimTokenStore,
}

impl SimDriver {
    /// Driver backed by `server` and `tokens`.
    pub fn new(server: SimServer, tokens: SimTokenStore) -> Self {
        Self { state: Arc::new(Mutex::new(SharedState::default())), server, tokens }
    }

    /// The REST backend.
    pub fn server(&self) -> &SimServer {
        &self.server
    }

    /// The token store.
    pub fn tokens(&self) -> &SimTokenStore {
        &self.tokens
    }

    /// Decide how later open attempts end.
    pub fn set_socket_policy(&self, policy: SocketPolicy) {
        self.lock().policy = policy;
    }

    /// Hold REST requests until [`complete_next_request`](Self::complete_next_request).
    pub fn set_manual_api(&self, manual: bool) {
        self.lock().manual_api = manual;
    }

    /// Inject user input.
    pub fn input(&self, input: UserInput) {
        self.lock().pending_events.push_back(input.into());
    }

    /// Inject a raw driver event.
    pub fn inject(&self, event: DriverEvent) {
        self.lock().pending_events.push_back(event);
    }

    /// Finish a held handshake successfully.
    pub fn accept(&self) -> bool {
        let mut state = self.lock();
        let Some(socket) = state.live else {
            return false;
        };
        state.pending_events.push_back(DriverEvent::SocketOpened(socket));
        true
    }

    /// Fail a held handshake.
    pub fn refuse(&self) -> bool {
        let mut state = self.lock();
        let Some(socket) = state.live else {
            return false;
        };
        state.pending_events.push_back(DriverEvent::SocketOpenFailed {
            socket,
            reason: "connection refused".to_string(),
        });
        true
    }

    /// Deliver `event` on the live socket. Returns false if none is live.
    pub fn push(&self, event: &InboundEvent) -> bool {
        match serde_json::to_string(event) {
            Ok(text) => self.push_raw(text),
            Err(error) => {
                tracing::warn!(%error, "cannot encode scripted event");
                false
            },
        }
    }

    /// Deliver raw frame text on the live socket.
    pub fn push_raw(&self, text: impl Into<String>) -> bool {
        let mut state = self.lock();
        let Some(socket) = state.live else {
            return false;
        };
        state.pending_events.push_back(DriverEvent::SocketText { socket, text: text.into() });
        true
    }

    /// Close the live socket from the server side.
    pub fn drop_connection(&self, code: u16) -> bool {
        let mut state = self.lock();
        let Some(socket) = state.live else {
            return false;
        };
        state.pending_events.push_back(DriverEvent::SocketClosed {
            socket,
            close: CloseEvent { code: Some(code), reason: "server closed".to_string() },
        });
        true
    }

    /// Run the oldest held REST request and queue its response.
    pub async fn complete_next_request(&self) -> bool {
        let Some(request) = self.take_next_request() else {
            return false;
        };
        let response = request.perform(&self.server).await;
        self.lock().pending_events.push_back(DriverEvent::Api(response));
        true
    }

    /// Remove the oldest held REST request without running it, so a test
    /// can deliver its response out of order.
    pub fn take_next_request(&self) -> Option<ApiRequest> {
        self.lock().api_requests.pop_front()
    }

    /// Number of REST requests not yet run.
    pub fn pending_requests(&self) -> usize {
        self.lock().api_requests.len()
    }

    /// Whether any event is queued for the runtime.
    pub fn has_pending(&self) -> bool {
        let state = self.lock();
        !state.pending_events.is_empty()
            || !state.token_requests.is_empty()
            || (!state.manual_api && !state.api_requests.is_empty())
    }

    /// Every socket opened so far, oldest first.
    pub fn sockets(&self) -> Vec<SocketRecord> {
        self.lock().sockets.clone()
    }

    /// Socket currently considered live by the driver.
    pub fn live_socket(&self) -> Option<SocketId> {
        self.lock().live
    }

    /// Frames sent so far, exactly as written to the socket.
    pub fn sent_texts(&self) -> Vec<String> {
        self.lock().sent.iter().map(|(_, text)| text.clone()).collect()
    }

    /// Frames sent so far, decoded.
    pub fn sent_frames(&self) -> Vec<Value> {
        self.lock().sent.iter().filter_map(|(_, text)| serde_json::from_str(text).ok()).collect()
    }

    /// Sent frames whose `action` is `action`.
    pub fn sent_actions(&self, action: &str) -> Vec<Value> {
        self.sent_frames()
            .into_iter()
            .filter(|frame| frame.get("action").and_then(Value::as_str) == Some(action))
            .collect()
    }

    /// Every render so far.
    pub fn renders(&self) -> Vec<RenderRecord> {
        self.lock().renders.clone()
    }

    /// The most recent render.
    pub fn last_render(&self) -> Option<RenderRecord> {
        self.lock().renders.last().cloned()
    }

    /// Whether [`Driver::stop`] ran.
    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    fn lock(&self) -> MutexGuard<'_, SharedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Driver for SimDriver {
    type Error = SimDriverError;
    type Instant = SimInstant;

    async fn poll_event(&mut self) -> Result<Option<DriverEvent>, Self::Error> {
        let (token_request, api_request) = {
            let mut state = self.lock();
            if let Some(event) = state.pending_events.pop_front() {
                // The socket stays live until the runtime hears it ended.
                if let DriverEvent::SocketClosed { socket, .. }
                | DriverEvent::SocketOpenFailed { socket, .. } = &event
                    && state.live == Some(*socket)
                {
                    state.live = None;
                }
                return Ok(Some(event));
            }
            let token_request = state.token_requests.pop_front();
            let api_request = if token_request.is_none() && !state.manual_api {
                state.api_requests.pop_front()
            } else {
                None
            };
            (token_request, api_request)
        };

        if let Some(request) = token_request {
            let result = self.tokens.get().await;
            return Ok(Some(DriverEvent::TokenLoaded { request, result }));
        }

        if let Some(request) = api_request {
            return Ok(Some(DriverEvent::Api(request.perform(&self.server).await)));
        }

        Ok(None)
    }

    async fn execute(&mut self, action: ConnectionAction) -> Result<(), Self::Error> {
        let mut state = self.lock();
        if state.stopped {
            return Err(SimDriverError("driver stopped".to_string()));
        }

        match action {
            ConnectionAction::Open { socket, url } => {
                tracing::debug!(%socket, %url, "sim open");
                state.sockets.push(SocketRecord {
                    socket,
                    url: url.expose().to_string(),
                    closed_by_client: false,
                });
                state.live = Some(socket);
                match state.policy {
                    SocketPolicy::Accept => {
                        state.pending_events.push_back(DriverEvent::SocketOpened(socket));
                    },
                    SocketPolicy::Refuse => {
                        state.pending_events.push_back(DriverEvent::SocketOpenFailed {
                            socket,
                            reason: "connection refused".to_string(),
                        });
                    },
                    SocketPolicy::Hold => {},
                }
            },
            ConnectionAction::Send { socket, text } => {
                if state.live == Some(socket) {
                    state.sent.push((socket, text));
                } else {
                    tracing::debug!(%socket, "sim send on dead socket dropped");
                }
            },
            ConnectionAction::Close { socket } => {
                if state.live == Some(socket) {
                    state.live = None;
                }
                if let Some(record) = state.sockets.iter_mut().find(|r| r.socket == socket) {
                    record.closed_by_client = true;
                }
            },
        }

        Ok(())
    }

    fn request_token(&mut self, request: TokenRequest) -> Result<(), Self::Error> {
        self.lock().token_requests.push_back(request);
        Ok(())
    }

    fn submit(&mut self, request: ApiRequest) -> Result<(), Self::Error> {
        self.lock().api_requests.push_back(request);
        Ok(())
    }

    fn render(&mut self, view: &View<'_, Self::Instant>) -> Result<(), Self::Error> {
        let record = RenderRecord {
            status: view.status,
            socket_state: view.socket_state,
            message_ids: view.messages().iter().map(|m| m.id.to_string()).collect(),
            contents: view.messages().iter().map(|m| m.content.clone()).collect(),
            peer_typing: view.peer_typing(),
            notices: view.notices.to_vec(),
        };
        self.lock().renders.push(record);
        Ok(())
    }

    fn stop(&mut self) {
        self.lock().stopped = true;
    }
}
