//! Reconciled chat messages.

use std::fmt;

use chrono::{DateTime, Utc};
use rendezvous_proto::{ConversationId, MessageId, MessageType, WireMessage};

/// Client-generated id of an unconfirmed message, `temp_<wall-clock-millis>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TempId(String);

impl TempId {
    /// Id for a message submitted at `millis` since the Unix epoch.
    #[must_use]
    pub fn from_millis(millis: u64) -> Self {
        Self(format!("temp_{millis}"))
    }

    /// The id text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a message's id came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provenance {
    /// Optimistic local echo awaiting confirmation
    Local,
    /// Server-assigned id from a REST response or push event
    Confirmed,
}

/// Message identity; the variant encodes provenance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageRef {
    /// Unconfirmed local echo
    Local(TempId),
    /// Server-confirmed message
    Confirmed(MessageId),
}

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(id) => id.fmt(f),
            Self::Confirmed(id) => id.fmt(f),
        }
    }
}

/// One entry of a conversation's message list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Identity and provenance
    pub id: MessageRef,
    /// Owning conversation
    pub conversation_id: ConversationId,
    /// Body
    pub content: String,
    /// Content kind
    pub message_type: MessageType,
    /// Whether the local user wrote it
    pub sender_is_self: bool,
    /// Author display name, when known
    pub sender_username: Option<String>,
    /// Whether the recipient has read it
    pub is_read: bool,
    /// Server timestamp, or local submit time for unconfirmed messages
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Build an optimistic local echo.
    #[must_use]
    pub fn local(
        temp_id: TempId,
        conversation_id: ConversationId,
        content: String,
        message_type: MessageType,
        submitted_at_millis: u64,
    ) -> Self {
        let created_at = i64::try_from(submitted_at_millis)
            .ok()
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or_default();

        Self {
            id: MessageRef::Local(temp_id),
            conversation_id,
            content,
            message_type,
            sender_is_self: true,
            sender_username: None,
            is_read: false,
            created_at,
        }
    }

    /// Build a confirmed message from its wire form.
    ///
    /// Authorship comes from the server's `is_sender` flag when present,
    /// otherwise from comparing `sender_id` against `self_id`.
    #[must_use]
    pub fn from_wire(
        wire: WireMessage,
        conversation_id: ConversationId,
        self_id: Option<u64>,
    ) -> Self {
        let sender_is_self = is_self_authored(&wire, self_id);
        Self {
            id: MessageRef::Confirmed(wire.id),
            conversation_id: wire.conversation_id.unwrap_or(conversation_id),
            content: wire.content,
            message_type: wire.message_type,
            sender_is_self,
            sender_username: wire.sender_username,
            is_read: wire.is_read,
            created_at: wire.created_at,
        }
    }

    /// Provenance encoded in the id.
    #[must_use]
    pub fn provenance(&self) -> Provenance {
        match self.id {
            MessageRef::Local(_) => Provenance::Local,
            MessageRef::Confirmed(_) => Provenance::Confirmed,
        }
    }

    /// Server id, if confirmed.
    #[must_use]
    pub fn confirmed_id(&self) -> Option<&MessageId> {
        match &self.id {
            MessageRef::Confirmed(id) => Some(id),
            MessageRef::Local(_) => None,
        }
    }

    /// Temporary id, if still local.
    #[must_use]
    pub fn temp_id(&self) -> Option<&TempId> {
        match &self.id {
            MessageRef::Local(id) => Some(id),
            MessageRef::Confirmed(_) => None,
        }
    }
}

/// Whether the local user wrote `wire`.
pub(crate) fn is_self_authored(wire: &WireMessage, self_id: Option<u64>) -> bool {
    match wire.is_sender {
        Some(flag) => flag,
        None => self_id.is_some() && wire.sender_id == self_id,
    }
}
