//! Error types for the connection layer.

use thiserror::Error;

use crate::connection::SocketState;

/// Errors surfaced by the connection manager.
///
/// Errors raised while the socket is live are also delivered to registered
/// error handlers; the manager itself never stops on them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Operation not permitted in the current socket state
    #[error("cannot {operation} while {state:?}")]
    InvalidState {
        /// State when the operation was attempted
        state: SocketState,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// Base URL and path did not form a valid WebSocket URL
    #[error("invalid socket url: {0}")]
    InvalidUrl(String),

    /// Opening handshake failed before the socket became open
    #[error("handshake failed: {reason}")]
    Handshake {
        /// Transport-reported reason
        reason: String,
    },

    /// Socket-level error reported by the driver while open
    #[error("transport error: {0}")]
    Transport(String),
}

/// Failure reported by a registered handler.
///
/// Handler failures are logged and isolated; they never reach the caller that
/// triggered the notification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    /// Create a handler error from a reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

impl From<String> for HandlerError {
    fn from(reason: String) -> Self {
        Self(reason)
    }
}

impl From<&str> for HandlerError {
    fn from(reason: &str) -> Self {
        Self(reason.to_string())
    }
}
