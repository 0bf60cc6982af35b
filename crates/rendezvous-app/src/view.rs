//! Render snapshot.

use rendezvous_client::{ConnectionStatus, ConversationReconciler, Message};
use rendezvous_core::SocketState;

/// One-off message for the user, shown once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A message could not be sent and was removed
    SendFailed {
        /// Content that was not sent
        content: String,
        /// Failure reason
        reason: String,
    },
    /// History could not be loaded
    HistoryFailed {
        /// Failure reason
        reason: String,
    },
    /// The server reported an error event
    ServerError {
        /// Server-provided reason
        reason: String,
    },
}

/// What a driver needs to draw the screen.
#[derive(Debug)]
pub struct View<'a, I> {
    /// Session status
    pub status: ConnectionStatus,
    /// Raw socket state
    pub socket_state: SocketState,
    /// Open conversation, if any
    pub conversation: Option<&'a ConversationReconciler<I>>,
    /// Notices raised since the previous render
    pub notices: &'a [Notice],
}

impl<I> View<'_, I>
where
    I: Copy + Ord + Send + Sync + std::ops::Sub<Output = std::time::Duration>,
{
    /// Messages of the open conversation, newest first.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        self.conversation.map(ConversationReconciler::messages).unwrap_or_default()
    }

    /// Whether the peer typing indicator is on.
    #[must_use]
    pub fn peer_typing(&self) -> bool {
        self.conversation.is_some_and(ConversationReconciler::peer_typing)
    }
}
