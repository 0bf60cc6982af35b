//! Inbound event frames.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{ConversationId, MessageId, ProtocolError, Result, WireMessage};

/// Event tags this client understands.
const KNOWN_TYPES: [&str; 6] = [
    "new_message",
    "message_read",
    "user_typing",
    "conversation_joined",
    "conversation_left",
    "error",
];

/// Events the server pushes to the client.
///
/// Immutable once decoded. Tagged by `type` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// A message was posted to a conversation.
    NewMessage {
        /// Conversation the message was posted to
        #[serde(default, skip_serializing_if = "Option::is_none")]
        conversation_id: Option<ConversationId>,
        /// The confirmed message
        message: WireMessage,
    },

    /// A message was marked as read by its recipient.
    MessageRead {
        /// Conversation containing the message
        #[serde(default, skip_serializing_if = "Option::is_none")]
        conversation_id: Option<ConversationId>,
        /// Message that was read
        message_id: MessageId,
    },

    /// The other participant is typing.
    UserTyping {
        /// Conversation being typed in
        conversation_id: ConversationId,
    },

    /// Server acknowledged a `join_conversation`.
    ConversationJoined {
        /// Joined conversation
        conversation_id: ConversationId,
    },

    /// Server acknowledged a `leave_conversation`.
    ConversationLeft {
        /// Left conversation
        conversation_id: ConversationId,
    },

    /// Server-side error report.
    Error {
        /// Human-readable reason
        #[serde(rename = "message")]
        reason: String,
    },
}

impl InboundEvent {
    /// Decode an event from raw frame text.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::MalformedJson` if the text is not JSON
    /// - see [`InboundEvent::from_value`] for the rest
    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::MalformedJson(e.to_string()))?;
        Self::from_value(&value)
    }

    /// Decode an event from an already-parsed JSON frame.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::MissingType` if there is no string `type` tag
    /// - `ProtocolError::UnknownEvent` if the tag is not recognized
    /// - `ProtocolError::InvalidEvent` if the fields do not match the tag
    pub fn from_value(value: &Value) -> Result<Self> {
        let Some(tag) = value.get("type").and_then(Value::as_str) else {
            return Err(ProtocolError::MissingType);
        };

        if !KNOWN_TYPES.contains(&tag) {
            return Err(ProtocolError::UnknownEvent(tag.to_string()));
        }

        Self::deserialize(value).map_err(|e| ProtocolError::InvalidEvent {
            event: tag.to_string(),
            reason: e.to_string(),
        })
    }

    /// The `type` tag.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NewMessage { .. } => "new_message",
            Self::MessageRead { .. } => "message_read",
            Self::UserTyping { .. } => "user_typing",
            Self::ConversationJoined { .. } => "conversation_joined",
            Self::ConversationLeft { .. } => "conversation_left",
            Self::Error { .. } => "error",
        }
    }

    /// Conversation this event concerns.
    ///
    /// For `new_message` the outer id wins, falling back to the id embedded in
    /// the message. Server errors are not scoped to a conversation.
    #[must_use]
    pub fn conversation_id(&self) -> Option<ConversationId> {
        match self {
            Self::NewMessage { conversation_id, message } => {
                conversation_id.or(message.conversation_id)
            },
            Self::MessageRead { conversation_id, .. } => *conversation_id,
            Self::UserTyping { conversation_id }
            | Self::ConversationJoined { conversation_id }
            | Self::ConversationLeft { conversation_id } => Some(*conversation_id),
            Self::Error { .. } => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn decodes_new_message() {
        let text = r#"{
            "type": "new_message",
            "conversation_id": 42,
            "message": {
                "id": 987,
                "sender_id": 7,
                "content": "hello",
                "message_type": "TEXT",
                "is_read": false,
                "created_at": "2023-11-14T22:13:20Z"
            }
        }"#;

        let event = InboundEvent::from_json(text).unwrap();
        assert_eq!(event.kind(), "new_message");
        assert_eq!(event.conversation_id(), Some(ConversationId(42)));

        let InboundEvent::NewMessage { message, .. } = event else {
            panic!("expected NewMessage");
        };
        assert_eq!(message.id, MessageId::Number(987));
        assert_eq!(message.content, "hello");
    }

    #[test]
    fn new_message_falls_back_to_nested_conversation_id() {
        let text = r#"{
            "type": "new_message",
            "message": {
                "id": 1,
                "conversation_id": "42",
                "content": "x",
                "created_at": "2023-11-14T22:13:20Z"
            }
        }"#;

        let event = InboundEvent::from_json(text).unwrap();
        assert_eq!(event.conversation_id(), Some(ConversationId(42)));
    }

    #[test]
    fn error_event_reads_message_field() {
        let event = InboundEvent::from_json(r#"{"type":"error","message":"not a member"}"#).unwrap();
        assert_eq!(event, InboundEvent::Error { reason: "not a member".to_string() });
        assert_eq!(event.conversation_id(), None);
    }

    #[test]
    fn rejects_malformed_json() {
        let result = InboundEvent::from_json("{not json");
        assert!(matches!(result, Err(ProtocolError::MalformedJson(_))));
    }

    #[test]
    fn rejects_missing_and_unknown_tags() {
        assert_eq!(InboundEvent::from_json(r#"{"conversation_id":1}"#), Err(ProtocolError::MissingType));
        assert_eq!(
            InboundEvent::from_json(r#"{"type":"presence"}"#),
            Err(ProtocolError::UnknownEvent("presence".to_string()))
        );
    }

    #[test]
    fn rejects_known_tag_with_wrong_fields() {
        let result = InboundEvent::from_json(r#"{"type":"user_typing"}"#);
        assert!(matches!(result, Err(ProtocolError::InvalidEvent { .. })));
    }
}
