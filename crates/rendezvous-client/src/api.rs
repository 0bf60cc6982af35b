//! Collaborator seams: credential storage and the messaging REST API.
//!
//! The state machines never call these traits. They emit [`ApiRequest`]s and
//! token fetches; the driver runs them against a concrete implementation with
//! [`ApiRequest::perform`] and feeds the [`ApiResponse`] back.

use async_trait::async_trait;
use rendezvous_core::AuthToken;
use rendezvous_proto::{ConversationId, MessageId, MessageType, WireMessage};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ApiError, TokenStoreError},
    message::TempId,
};

/// Opaque get/set/delete credential storage.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Current token, or `None` if logged out.
    async fn get(&self) -> Result<Option<AuthToken>, TokenStoreError>;

    /// Replace the stored token.
    async fn set(&self, token: &AuthToken) -> Result<(), TokenStoreError>;

    /// Remove the stored token.
    async fn delete(&self) -> Result<(), TokenStoreError>;
}

/// Messaging REST endpoints the realtime layer depends on.
#[async_trait]
pub trait MessagingApi: Send + Sync {
    /// Conversation history, in server order.
    async fn get_messages(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<WireMessage>, ApiError>;

    /// Persist a message. Returns the server's copy with its assigned id.
    async fn send_message(&self, request: &SendMessageRequest) -> Result<WireMessage, ApiError>;

    /// Mark a received message as read.
    async fn mark_message_as_read(&self, message_id: &MessageId) -> Result<(), ApiError>;

    /// Find or create the one-to-one conversation with `user_id`.
    async fn get_conversation_with_user(
        &self,
        user_id: u64,
    ) -> Result<ConversationSummary, ApiError>;
}

/// Body of `POST /messages/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendMessageRequest {
    /// Target conversation
    pub conversation: ConversationId,
    /// Message body
    pub content: String,
    /// Content kind
    pub message_type: MessageType,
}

/// A conversation as returned by the lookup endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// Conversation id
    pub id: ConversationId,
    /// Unread count, when the server reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unread_count: Option<u32>,
}

/// REST work requested by a state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiRequest {
    /// Load conversation history
    GetMessages {
        /// Conversation to load
        conversation_id: ConversationId,
    },

    /// Persist an optimistic message
    SendMessage {
        /// Local echo awaiting this response
        temp_id: TempId,
        /// Request body
        request: SendMessageRequest,
    },

    /// Mark a message read
    MarkAsRead {
        /// Message to mark
        message_id: MessageId,
    },
}

/// Completion of an [`ApiRequest`], tagged with enough context to route it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiResponse {
    /// History loaded
    Messages {
        /// Conversation the history belongs to
        conversation_id: ConversationId,
        /// History or failure
        result: Result<Vec<WireMessage>, ApiError>,
    },

    /// Send finished
    MessageSent {
        /// Local echo this confirms or rolls back
        temp_id: TempId,
        /// Confirmed message or failure
        result: Result<WireMessage, ApiError>,
    },

    /// Mark-read finished
    MarkedRead {
        /// Message that was marked
        message_id: MessageId,
        /// Ack or failure
        result: Result<(), ApiError>,
    },
}

impl ApiRequest {
    /// Execute this request against `api`.
    pub async fn perform<A>(self, api: &A) -> ApiResponse
    where
        A: MessagingApi + ?Sized,
    {
        match self {
            Self::GetMessages { conversation_id } => {
                let result = api.get_messages(conversation_id).await;
                ApiResponse::Messages { conversation_id, result }
            },
            Self::SendMessage { temp_id, request } => {
                let result = api.send_message(&request).await;
                ApiResponse::MessageSent { temp_id, result }
            },
            Self::MarkAsRead { message_id } => {
                let result = api.mark_message_as_read(&message_id).await;
                ApiResponse::MarkedRead { message_id, result }
            },
        }
    }

    /// Short label for log fields.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::GetMessages { .. } => "get_messages",
            Self::SendMessage { .. } => "send_message",
            Self::MarkAsRead { .. } => "mark_as_read",
        }
    }
}
