//! Rendezvous core
//!
//! Sans-IO connection management for the realtime chat transport. The
//! [`ConnectionManager`] owns exactly one logical socket: it decides when to
//! open, send, close and reconnect, and returns [`ConnectionAction`]s for a
//! driver to execute. Inbound frames are parsed and fanned out to ordered
//! [`HandlerRegistry`]s.
//!
//! # Components
//!
//! - [`ConnectionManager`]: socket lifecycle, reconnect backoff, fan-out
//! - [`HandlerRegistry`]: ordered callbacks with identity removal
//! - [`env::Environment`]: time source so tests can run on a virtual clock
//! - [`AuthToken`], [`SocketUrl`]: credentials that never reach a log line

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod connection;
mod credentials;
pub mod env;
pub mod error;
mod registry;

pub use connection::{
    CloseEvent, ConnectOutcome, ConnectionAction, ConnectionConfig, ConnectionManager,
    ConnectionParams, MAX_RECONNECT_ATTEMPTS, SocketId, SocketState, backoff_delay,
};
pub use credentials::{AuthToken, SocketUrl};
pub use error::{ConnectionError, HandlerError};
pub use registry::{Handler, HandlerId, HandlerIds, HandlerRegistry};
