//! Outbound action frames.

use serde::Serialize;

use crate::{ConversationId, MessageId, MessageType, ProtocolError, Result};

/// Frames the client sends to the server.
///
/// Serialized as a flat JSON object tagged by `action`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// Subscribe to realtime delivery for a conversation.
    JoinConversation {
        /// Target conversation
        conversation_id: ConversationId,
    },

    /// Drop the realtime subscription for a conversation.
    LeaveConversation {
        /// Target conversation
        conversation_id: ConversationId,
    },

    /// Realtime half of a dual-path send.
    SendMessage {
        /// Target conversation
        conversation_id: ConversationId,
        /// Message body
        content: String,
        /// Content kind
        message_type: MessageType,
    },

    /// The local user is composing a message.
    Typing {
        /// Target conversation
        conversation_id: ConversationId,
    },

    /// The local user has seen a message.
    MarkAsRead {
        /// Message that was read
        message_id: MessageId,
    },
}

impl OutboundFrame {
    /// The `action` tag.
    #[must_use]
    pub const fn action(&self) -> &'static str {
        match self {
            Self::JoinConversation { .. } => "join_conversation",
            Self::LeaveConversation { .. } => "leave_conversation",
            Self::SendMessage { .. } => "send_message",
            Self::Typing { .. } => "typing",
            Self::MarkAsRead { .. } => "mark_as_read",
        }
    }

    /// Conversation this frame targets. `None` for `mark_as_read`.
    #[must_use]
    pub const fn conversation_id(&self) -> Option<ConversationId> {
        match self {
            Self::JoinConversation { conversation_id }
            | Self::LeaveConversation { conversation_id }
            | Self::SendMessage { conversation_id, .. }
            | Self::Typing { conversation_id } => Some(*conversation_id),
            Self::MarkAsRead { .. } => None,
        }
    }

    /// Encode as a JSON value.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Encode` if serialization fails
    pub fn to_value(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }
}
