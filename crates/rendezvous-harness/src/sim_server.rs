//! In-memory collaborators for simulation.
//!
//! [`SimServer`] stands in for the messaging REST API and [`SimTokenStore`]
//! for credential storage. Both are plain shared state behind a mutex, so a
//! test can inspect what the client did and script failures ahead of time.

#![allow(clippy::disallowed_types, reason = "Synchronous locking operations only")]

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rendezvous_client::{
    ApiError, ConversationSummary, MessagingApi, SendMessageRequest, TokenStore, TokenStoreError,
};
use rendezvous_core::{AuthToken, env::Environment};
use rendezvous_proto::{ConversationId, InboundEvent, MessageId, MessageType, WireMessage};

use crate::SimEnv;

#[derive(Debug, Default)]
struct ServerState {
    conversations: BTreeMap<ConversationId, Vec<WireMessage>>,
    partners: HashMap<u64, ConversationId>,
    send_failures: VecDeque<ApiError>,
    history_failures: VecDeque<ApiError>,
    calls: Vec<String>,
}

/// Messaging backend held in memory.
///
/// Message ids are assigned sequentially from the value given to
/// [`with_next_id`](Self::with_next_id). Timestamps come from the virtual
/// wall clock, so ordering follows simulated time.
#[derive(Debug, Clone)]
pub struct SimServer {
    env: SimEnv,
    self_id: u64,
    next_id: Arc<Mutex<u64>>,
    state: Arc<Mutex<ServerState>>,
}

impl SimServer {
    /// Server whose authenticated user is `self_id`.
    #[must_use]
    pub fn new(env: SimEnv, self_id: u64) -> Self {
        Self {
            env,
            self_id,
            next_id: Arc::new(Mutex::new(1)),
            state: Arc::new(Mutex::new(ServerState::default())),
        }
    }

    /// Start id assignment at `next_id`.
    #[must_use]
    pub fn with_next_id(self, next_id: u64) -> Self {
        *lock(&self.next_id) = next_id;
        self
    }

    /// Id of the authenticated user.
    #[must_use]
    pub fn self_id(&self) -> u64 {
        self.self_id
    }

    /// Store a message from `sender_id` and return its wire form, ready to be
    /// pushed with [`new_message_event`].
    pub fn post(&self, conversation_id: ConversationId, sender_id: u64, content: &str) -> WireMessage {
        let message = self.build(conversation_id, sender_id, content);
        lock(&self.state).conversations.entry(conversation_id).or_default().push(message.clone());
        message
    }

    /// Fail the next send with `error`.
    pub fn fail_next_send(&self, error: ApiError) {
        lock(&self.state).send_failures.push_back(error);
    }

    /// Fail the next history fetch with `error`.
    pub fn fail_next_history(&self, error: ApiError) {
        lock(&self.state).history_failures.push_back(error);
    }

    /// Stored messages of a conversation, oldest first.
    #[must_use]
    pub fn messages(&self, conversation_id: ConversationId) -> Vec<WireMessage> {
        lock(&self.state).conversations.get(&conversation_id).cloned().unwrap_or_default()
    }

    /// Every API call so far, e.g. `send 42` or `read 7`.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        lock(&self.state).calls.clone()
    }

    fn build(&self, conversation_id: ConversationId, sender_id: u64, content: &str) -> WireMessage {
        let id = {
            let mut next = lock(&self.next_id);
            let id = *next;
            *next += 1;
            id
        };
        let created_at = i64::try_from(self.env.wall_clock_millis())
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or_default();

        WireMessage {
            id: MessageId::Number(id),
            conversation_id: Some(conversation_id),
            sender_id: Some(sender_id),
            sender_username: None,
            content: content.to_string(),
            message_type: MessageType::Text,
            is_read: false,
            created_at,
            is_sender: None,
        }
    }
}

#[async_trait]
impl MessagingApi for SimServer {
    async fn get_messages(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<WireMessage>, ApiError> {
        let mut state = lock(&self.state);
        state.calls.push(format!("history {conversation_id}"));
        if let Some(error) = state.history_failures.pop_front() {
            return Err(error);
        }

        let mut history = state.conversations.get(&conversation_id).cloned().unwrap_or_default();
        history.reverse();
        for message in &mut history {
            message.is_sender = Some(message.sender_id == Some(self.self_id));
        }
        Ok(history)
    }

    async fn send_message(&self, request: &SendMessageRequest) -> Result<WireMessage, ApiError> {
        {
            let mut state = lock(&self.state);
            state.calls.push(format!("send {}", request.conversation));
            if let Some(error) = state.send_failures.pop_front() {
                return Err(error);
            }
        }

        let mut message = self.post(request.conversation, self.self_id, &request.content);
        message.is_sender = Some(true);
        Ok(message)
    }

    async fn mark_message_as_read(&self, message_id: &MessageId) -> Result<(), ApiError> {
        let mut state = lock(&self.state);
        state.calls.push(format!("read {message_id}"));

        let message = state
            .conversations
            .values_mut()
            .flat_map(|messages| messages.iter_mut())
            .find(|message| &message.id == message_id);

        match message {
            Some(message) => {
                message.is_read = true;
                Ok(())
            },
            None => Err(ApiError::Status { status: 404, body: "Not found.".to_string() }),
        }
    }

    async fn get_conversation_with_user(
        &self,
        user_id: u64,
    ) -> Result<ConversationSummary, ApiError> {
        let mut state = lock(&self.state);
        state.calls.push(format!("conversation-with {user_id}"));

        let next = ConversationId(state.partners.len() as u64 + 1);
        let id = *state.partners.entry(user_id).or_insert(next);
        let unread_count = state.conversations.get(&id).map(|messages| {
            messages.iter().filter(|m| !m.is_read && m.sender_id != Some(self.self_id)).count() as u32
        });

        Ok(ConversationSummary { id, unread_count })
    }
}

/// `new_message` push for `message`.
#[must_use]
pub fn new_message_event(message: WireMessage) -> InboundEvent {
    InboundEvent::NewMessage { conversation_id: message.conversation_id, message }
}

/// Token storage held in memory.
#[derive(Debug, Clone, Default)]
pub struct SimTokenStore {
    state: Arc<Mutex<TokenState>>,
}

#[derive(Debug, Default)]
struct TokenState {
    token: Option<AuthToken>,
    unavailable: bool,
}

impl SimTokenStore {
    /// Store holding `token`.
    #[must_use]
    pub fn with_token(token: impl Into<AuthToken>) -> Self {
        let store = Self::default();
        lock(&store.state).token = Some(token.into());
        store
    }

    /// Make every operation fail with `TokenStoreError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        lock(&self.state).unavailable = unavailable;
    }

    fn check(state: &TokenState) -> Result<(), TokenStoreError> {
        if state.unavailable {
            return Err(TokenStoreError::Unavailable("simulated storage failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TokenStore for SimTokenStore {
    async fn get(&self) -> Result<Option<AuthToken>, TokenStoreError> {
        let state = lock(&self.state);
        Self::check(&state)?;
        Ok(state.token.clone())
    }

    async fn set(&self, token: &AuthToken) -> Result<(), TokenStoreError> {
        let mut state = lock(&self.state);
        Self::check(&state)?;
        state.token = Some(token.clone());
        Ok(())
    }

    async fn delete(&self) -> Result<(), TokenStoreError> {
        let mut state = lock(&self.state);
        Self::check(&state)?;
        state.token = None;
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_assigns_sequential_ids() {
        let server = SimServer::new(SimEnv::new(), 1).with_next_id(987);
        let request = SendMessageRequest {
            conversation: ConversationId(42),
            content: "hello".to_string(),
            message_type: MessageType::Text,
        };

        let first = server.send_message(&request).await.unwrap();
        let second = server.send_message(&request).await.unwrap();

        assert_eq!(first.id, MessageId::Number(987));
        assert_eq!(second.id, MessageId::Number(988));
        assert_eq!(first.is_sender, Some(true));
    }

    #[tokio::test]
    async fn scripted_failures_apply_once() {
        let server = SimServer::new(SimEnv::new(), 1);
        server.fail_next_send(ApiError::Timeout);
        let request = SendMessageRequest {
            conversation: ConversationId(42),
            content: "hello".to_string(),
            message_type: MessageType::Text,
        };

        assert_eq!(server.send_message(&request).await, Err(ApiError::Timeout));
        assert!(server.send_message(&request).await.is_ok());
        assert_eq!(server.messages(ConversationId(42)).len(), 1);
    }

    #[tokio::test]
    async fn history_is_newest_first_with_authorship() {
        let env = SimEnv::new();
        let server = SimServer::new(env.clone(), 1);
        server.post(ConversationId(42), 2, "first");
        env.advance(std::time::Duration::from_secs(1));
        server.post(ConversationId(42), 1, "second");

        let history = server.get_messages(ConversationId(42)).await.unwrap();

        assert_eq!(history[0].content, "second");
        assert_eq!(history[0].is_sender, Some(true));
        assert_eq!(history[1].is_sender, Some(false));
    }

    #[tokio::test]
    async fn conversation_lookup_is_stable() {
        let server = SimServer::new(SimEnv::new(), 1);
        let first = server.get_conversation_with_user(7).await.unwrap();
        let again = server.get_conversation_with_user(7).await.unwrap();
        let other = server.get_conversation_with_user(8).await.unwrap();

        assert_eq!(first.id, again.id);
        assert_ne!(first.id, other.id);
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_operation() {
        let store = SimTokenStore::with_token("T");
        store.set_unavailable(true);

        assert!(store.get().await.is_err());
        assert!(store.delete().await.is_err());

        store.set_unavailable(false);
        assert_eq!(store.get().await.unwrap().map(|t| t.expose().to_string()), Some("T".to_string()));
    }
}
