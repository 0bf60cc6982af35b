//! Message object shared by push events and REST responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ConversationId, MessageId, MessageType};

/// A server-confirmed chat message as it appears on the wire.
///
/// Push events name the author `sender_id` and the conversation
/// `conversation_id`; the REST serializer uses `sender` and `conversation`.
/// Both spellings are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    /// Server-assigned id.
    pub id: MessageId,

    /// Conversation this message belongs to, when the payload includes it.
    #[serde(default, alias = "conversation", skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,

    /// Author's user id.
    #[serde(default, alias = "sender", skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<u64>,

    /// Author's display name, when the server includes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_username: Option<String>,

    /// Message body.
    pub content: String,

    /// Content kind.
    #[serde(default)]
    pub message_type: MessageType,

    /// Whether the recipient has read the message.
    #[serde(default)]
    pub is_read: bool,

    /// Server timestamp.
    pub created_at: DateTime<Utc>,

    /// Whether the authenticated user wrote this message, as computed by the
    /// server for the receiving connection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_sender: Option<bool>,
}
