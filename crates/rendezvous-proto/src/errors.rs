//! Protocol decoding errors.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding or decoding frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame body is not valid JSON.
    #[error("malformed JSON frame: {0}")]
    MalformedJson(String),

    /// Frame is valid JSON but lacks a string `type` tag.
    #[error("frame has no `type` tag")]
    MissingType,

    /// Frame carries a `type` this client does not understand.
    #[error("unknown event type: {0}")]
    UnknownEvent(String),

    /// Known event type with fields that do not match its shape.
    #[error("invalid `{event}` event: {reason}")]
    InvalidEvent {
        /// Event type tag
        event: String,
        /// Deserializer message
        reason: String,
    },

    /// Outbound frame could not be serialized.
    #[error("failed to encode frame: {0}")]
    Encode(String),
}
