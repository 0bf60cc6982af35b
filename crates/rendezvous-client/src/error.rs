//! Errors reported by the collaborator seams.
//!
//! Neither error stops a state machine: the session turns token failures
//! into `ConnectionStatus::Error`, and the reconciler turns API failures into
//! rollbacks or retries.

use thiserror::Error;

/// Failure of a REST call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Server rejected the credentials (HTTP 401)
    #[error("unauthorized")]
    Unauthorized,

    /// Non-success HTTP status
    #[error("server returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, possibly truncated
        body: String,
    },

    /// Request did not complete in time
    #[error("request timed out")]
    Timeout,

    /// Network-level failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Response body did not match the expected shape
    #[error("decode error: {0}")]
    Decode(String),
}

impl ApiError {
    /// Returns true if retrying the same request may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Transport(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Unauthorized | Self::Decode(_) => false,
        }
    }
}

/// Failure of the credential store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenStoreError {
    /// Backing storage could not be read or written
    #[error("token storage unavailable: {0}")]
    Unavailable(String),

    /// Stored data is not a token
    #[error("token storage corrupt: {0}")]
    Corrupt(String),
}
