//! Events reported by drivers.

use rendezvous_client::{ApiResponse, TokenRequest, TokenStoreError};
use rendezvous_core::{AuthToken, CloseEvent, SocketId};
use rendezvous_proto::MessageId;

/// Something the driver observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    /// Handshake completed
    SocketOpened(SocketId),

    /// Handshake failed
    SocketOpenFailed {
        /// Socket that failed
        socket: SocketId,
        /// Failure reason
        reason: String,
    },

    /// Text frame received
    SocketText {
        /// Receiving socket
        socket: SocketId,
        /// Frame text
        text: String,
    },

    /// Socket-level error while open
    SocketError {
        /// Affected socket
        socket: SocketId,
        /// Error text
        reason: String,
    },

    /// Peer started the close handshake
    SocketClosing(SocketId),

    /// Socket closed
    SocketClosed {
        /// Closed socket
        socket: SocketId,
        /// Close details
        close: CloseEvent,
    },

    /// Token lookup finished
    TokenLoaded {
        /// Lookup this answers
        request: TokenRequest,
        /// Token, absence, or failure
        result: Result<Option<AuthToken>, TokenStoreError>,
    },

    /// REST request finished
    Api(ApiResponse),

    /// User input
    Input(UserInput),
}

/// Commands and text from the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserInput {
    /// Submit a message
    Send(String),
    /// The compose text changed
    Typed(String),
    /// These messages are on screen
    Viewed(Vec<MessageId>),
    /// Reconnect manually
    Reconnect,
    /// Disconnect manually
    Disconnect,
    /// Clear the event log
    ClearEvents,
    /// Authentication became true
    Login,
    /// Authentication became false
    Logout,
    /// Exit
    Quit,
}

impl From<UserInput> for DriverEvent {
    fn from(input: UserInput) -> Self {
        Self::Input(input)
    }
}
