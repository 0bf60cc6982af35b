//! Rendezvous client
//!
//! Session and conversation state machines layered on the core
//! [`ConnectionManager`](rendezvous_core::ConnectionManager):
//!
//! - [`SessionCoordinator`]: binds the socket to authentication state, keeps
//!   a bounded inbound [`EventLog`] and exposes a safe send primitive
//! - [`ConversationReconciler`]: one per open conversation; joins and leaves
//!   the room and merges optimistic, REST-confirmed and pushed messages into
//!   a single newest-first list
//!
//! Both are Sans-IO. REST calls and token lookups are requested as actions
//! and answered by the driver through the [`TokenStore`] and [`MessagingApi`]
//! collaborator traits.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod api;
pub mod error;
mod event_log;
mod message;
mod reconciler;
mod session;

pub use api::{
    ApiRequest, ApiResponse, ConversationSummary, MessagingApi, SendMessageRequest, TokenStore,
};
pub use error::{ApiError, TokenStoreError};
pub use event_log::{DEFAULT_LOG_CAPACITY, EventLog, LoggedEvent};
pub use message::{Message, MessageRef, Provenance, TempId};
pub use reconciler::{
    ConversationReconciler, DEFAULT_TYPING_TIMEOUT, ReconcilerAction, ReconcilerConfig,
    ReconcilerEvent,
};
pub use session::{
    ConnectionStatus, DEFAULT_CHAT_PATH, SessionAction, SessionConfig, SessionCoordinator,
    TokenRequest,
};
