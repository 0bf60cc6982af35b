//! Conversation reconciler.
//!
//! One instance per open conversation view. Consumes inbound events and REST
//! completions and keeps a single newest-first message list in which no
//! logical message appears twice.
//!
//! # Merge rules
//!
//! - A send inserts a `Local` echo at the head, emits the realtime
//!   `send_message` frame and requests the REST send.
//! - REST success replaces the echo in its slot with the confirmed message,
//!   or removes the echo if a push already delivered that server id.
//! - REST failure removes only that echo and reports [`ReconcilerAction::SendFailed`].
//! - Pushed `new_message` events insert other-party messages whose server id
//!   is not yet listed. Self-authored pushes are left to the REST path.
//! - `is_read` only ever goes from false to true.
//!
//! Completions that arrive after [`ReconcilerEvent::Unmounted`] are ignored.

use std::{collections::HashSet, ops::Sub, time::Duration};

use rendezvous_proto::{ConversationId, InboundEvent, MessageId, MessageType, OutboundFrame, WireMessage};

use crate::{
    api::{ApiRequest, ApiResponse, SendMessageRequest},
    error::ApiError,
    message::{Message, MessageRef, TempId, is_self_authored},
    session::ConnectionStatus,
};

/// How long a peer typing indicator stays on after the last `user_typing`.
pub const DEFAULT_TYPING_TIMEOUT: Duration = Duration::from_secs(3);

/// Reconciler configuration.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Local user's id, used when the server omits `is_sender`
    pub self_id: Option<u64>,
    /// Peer typing indicator lifetime
    pub typing_timeout: Duration,
    /// Lifetime of the local composing marker
    pub local_typing_timeout: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            self_id: None,
            typing_timeout: DEFAULT_TYPING_TIMEOUT,
            local_typing_timeout: DEFAULT_TYPING_TIMEOUT,
        }
    }
}

/// Inputs to the reconciler.
#[derive(Debug, Clone)]
pub enum ReconcilerEvent<I> {
    /// The conversation view opened
    Mounted,

    /// Session status changed
    StatusChanged(ConnectionStatus),

    /// An event from the session log
    Inbound {
        /// The event
        event: InboundEvent,
        /// When it was delivered
        now: I,
    },

    /// History fetch finished
    HistoryLoaded {
        /// Conversation the history belongs to
        conversation_id: ConversationId,
        /// History or failure
        result: Result<Vec<WireMessage>, ApiError>,
    },

    /// The user submitted a message
    SendRequested {
        /// Raw input text
        content: String,
        /// Wall-clock submit time, for the temporary id
        wall_clock_millis: u64,
    },

    /// REST send finished
    SendCompleted {
        /// Echo this completion belongs to
        temp_id: TempId,
        /// Confirmed message or failure
        result: Result<WireMessage, ApiError>,
    },

    /// The input text changed
    InputChanged {
        /// Current input text
        text: String,
        /// When it changed
        now: I,
    },

    /// A message became visible to the user
    MessageRendered(MessageId),

    /// REST mark-read finished
    MarkReadCompleted {
        /// Message that was marked
        message_id: MessageId,
        /// Ack or failure
        result: Result<(), ApiError>,
    },

    /// Clock tick for the typing timers
    Tick(I),

    /// The conversation view closed
    Unmounted,
}

impl<I> From<ApiResponse> for ReconcilerEvent<I> {
    fn from(response: ApiResponse) -> Self {
        match response {
            ApiResponse::Messages { conversation_id, result } => {
                Self::HistoryLoaded { conversation_id, result }
            },
            ApiResponse::MessageSent { temp_id, result } => Self::SendCompleted { temp_id, result },
            ApiResponse::MarkedRead { message_id, result } => {
                Self::MarkReadCompleted { message_id, result }
            },
        }
    }
}

/// Work and notifications produced by the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcilerAction {
    /// Send a realtime frame through the session
    SendFrame(OutboundFrame),

    /// Run a REST request and feed the response back
    Api(ApiRequest),

    /// The message list changed
    ListChanged,

    /// The peer typing indicator changed
    TypingChanged(bool),

    /// A send was rolled back
    SendFailed {
        /// Echo that was removed
        temp_id: TempId,
        /// Content that failed to send
        content: String,
        /// Failure reason
        reason: String,
    },

    /// History could not be loaded
    HistoryFailed {
        /// Failure reason
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Created,
    Mounted,
    Unmounted,
}

/// Message list and room membership for one conversation.
#[derive(Debug)]
pub struct ConversationReconciler<I> {
    conversation_id: ConversationId,
    config: ReconcilerConfig,
    phase: Phase,
    status: ConnectionStatus,
    joined: bool,
    messages: Vec<Message>,
    peer_typing_since: Option<I>,
    local_typing_since: Option<I>,
    read_requested: HashSet<MessageId>,
    last_temp_millis: Option<u64>,
}

impl<I> ConversationReconciler<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create a reconciler for `conversation_id`. Nothing happens until
    /// [`ReconcilerEvent::Mounted`].
    #[must_use]
    pub fn new(conversation_id: ConversationId, config: ReconcilerConfig) -> Self {
        Self {
            conversation_id,
            config,
            phase: Phase::Created,
            status: ConnectionStatus::Disconnected,
            joined: false,
            messages: Vec::new(),
            peer_typing_since: None,
            local_typing_since: None,
            read_requested: HashSet::new(),
            last_temp_millis: None,
        }
    }

    /// Conversation this reconciler owns.
    #[must_use]
    pub fn conversation_id(&self) -> ConversationId {
        self.conversation_id
    }

    /// Messages, newest first.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Whether a join has been sent on the current connection.
    #[must_use]
    pub fn is_joined(&self) -> bool {
        self.joined
    }

    /// Whether the view is mounted.
    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.phase == Phase::Mounted
    }

    /// Whether the peer typing indicator is on.
    #[must_use]
    pub fn peer_typing(&self) -> bool {
        self.peer_typing_since.is_some()
    }

    /// Whether the local composing marker is armed.
    #[must_use]
    pub fn is_composing(&self) -> bool {
        self.local_typing_since.is_some()
    }

    /// Last status seen.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Process one input.
    pub fn handle(&mut self, event: ReconcilerEvent<I>) -> Vec<ReconcilerAction> {
        let mut actions = Vec::new();

        if self.phase == Phase::Unmounted {
            tracing::trace!(conversation = %self.conversation_id, "ignoring input after unmount");
            return actions;
        }

        match event {
            ReconcilerEvent::Mounted => self.mount(&mut actions),
            ReconcilerEvent::Unmounted => self.unmount(&mut actions),
            _ if self.phase != Phase::Mounted => {
                if let ReconcilerEvent::StatusChanged(status) = event {
                    self.status = status;
                }
            },
            ReconcilerEvent::StatusChanged(status) => self.status_changed(status, &mut actions),
            ReconcilerEvent::Inbound { event, now } => self.inbound(event, now, &mut actions),
            ReconcilerEvent::HistoryLoaded { conversation_id, result } => {
                self.history_loaded(conversation_id, result, &mut actions);
            },
            ReconcilerEvent::SendRequested { content, wall_clock_millis } => {
                self.send_requested(&content, wall_clock_millis, &mut actions);
            },
            ReconcilerEvent::SendCompleted { temp_id, result } => {
                self.send_completed(&temp_id, result, &mut actions);
            },
            ReconcilerEvent::InputChanged { text, now } => {
                if !text.is_empty() {
                    self.local_typing_since = Some(now);
                    actions.push(ReconcilerAction::SendFrame(OutboundFrame::Typing {
                        conversation_id: self.conversation_id,
                    }));
                }
            },
            ReconcilerEvent::MessageRendered(message_id) => {
                self.message_rendered(message_id, &mut actions);
            },
            ReconcilerEvent::MarkReadCompleted { message_id, result } => {
                self.mark_read_completed(message_id, result, &mut actions);
            },
            ReconcilerEvent::Tick(now) => self.tick(now, &mut actions),
        }

        actions
    }

    fn mount(&mut self, actions: &mut Vec<ReconcilerAction>) {
        if self.phase != Phase::Created {
            return;
        }

        tracing::debug!(conversation = %self.conversation_id, "conversation mounted");
        self.phase = Phase::Mounted;
        actions.push(ReconcilerAction::Api(ApiRequest::GetMessages {
            conversation_id: self.conversation_id,
        }));
        self.join_if_ready(actions);
    }

    fn unmount(&mut self, actions: &mut Vec<ReconcilerAction>) {
        if self.joined && self.status == ConnectionStatus::Connected {
            actions.push(ReconcilerAction::SendFrame(OutboundFrame::LeaveConversation {
                conversation_id: self.conversation_id,
            }));
        }

        tracing::debug!(conversation = %self.conversation_id, "conversation unmounted");
        self.phase = Phase::Unmounted;
        self.joined = false;
        self.peer_typing_since = None;
        self.local_typing_since = None;
    }

    fn join_if_ready(&mut self, actions: &mut Vec<ReconcilerAction>) {
        if self.phase == Phase::Mounted && self.status == ConnectionStatus::Connected && !self.joined {
            self.joined = true;
            actions.push(ReconcilerAction::SendFrame(OutboundFrame::JoinConversation {
                conversation_id: self.conversation_id,
            }));
        }
    }

    fn status_changed(&mut self, status: ConnectionStatus, actions: &mut Vec<ReconcilerAction>) {
        self.status = status;

        if status == ConnectionStatus::Connected {
            self.join_if_ready(actions);
        } else if self.joined {
            // The server drops room membership with the socket.
            tracing::debug!(conversation = %self.conversation_id, ?status, "subscription lost");
            self.joined = false;
        }
    }

    fn inbound(&mut self, event: InboundEvent, now: I, actions: &mut Vec<ReconcilerAction>) {
        if event.conversation_id() != Some(self.conversation_id) {
            return;
        }

        match event {
            InboundEvent::NewMessage { message, .. } => {
                if is_self_authored(&message, self.config.self_id) {
                    tracing::trace!(id = %message.id, "ignoring pushed echo of own message");
                    return;
                }
                if self.position_of(&message.id).is_some() {
                    return;
                }

                let message = Message::from_wire(message, self.conversation_id, self.config.self_id);
                self.messages.insert(0, message);
                actions.push(ReconcilerAction::ListChanged);
            },
            InboundEvent::MessageRead { message_id, .. } => {
                if self.set_read(&message_id) {
                    actions.push(ReconcilerAction::ListChanged);
                }
            },
            InboundEvent::UserTyping { .. } => {
                let was_typing = self.peer_typing_since.is_some();
                self.peer_typing_since = Some(now);
                if !was_typing {
                    actions.push(ReconcilerAction::TypingChanged(true));
                }
            },
            InboundEvent::ConversationJoined { .. } | InboundEvent::ConversationLeft { .. } => {
                tracing::debug!(conversation = %self.conversation_id, kind = event.kind(), "membership ack");
            },
            InboundEvent::Error { .. } => {},
        }
    }

    fn history_loaded(
        &mut self,
        conversation_id: ConversationId,
        result: Result<Vec<WireMessage>, ApiError>,
        actions: &mut Vec<ReconcilerAction>,
    ) {
        if conversation_id != self.conversation_id {
            return;
        }

        let history = match result {
            Ok(history) => history,
            Err(error) => {
                tracing::warn!(conversation = %self.conversation_id, %error, "history load failed");
                actions.push(ReconcilerAction::HistoryFailed { reason: error.to_string() });
                return;
            },
        };

        let mut merged: Vec<Message> = Vec::with_capacity(history.len() + self.messages.len());
        let mut seen: HashSet<MessageId> = HashSet::new();

        for wire in history {
            if !seen.insert(wire.id.clone()) {
                continue;
            }
            let mut message = Message::from_wire(wire, self.conversation_id, self.config.self_id);
            if let Some(existing) = message.confirmed_id().and_then(|id| self.find(id)) {
                message.is_read |= existing.is_read;
            }
            merged.push(message);
        }

        // Entries that arrived before the history: local echoes and pushes.
        for message in self.messages.drain(..) {
            let listed = message.confirmed_id().is_some_and(|id| seen.contains(id));
            if !listed {
                merged.push(message);
            }
        }

        merged.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        self.messages = merged;
        actions.push(ReconcilerAction::ListChanged);
    }

    fn send_requested(&mut self, content: &str, wall_clock_millis: u64, actions: &mut Vec<ReconcilerAction>) {
        let content = content.trim();
        if content.is_empty() {
            return;
        }

        // Two sends in the same millisecond still get distinct ids.
        let millis = match self.last_temp_millis {
            Some(last) if wall_clock_millis <= last => last + 1,
            _ => wall_clock_millis,
        };
        self.last_temp_millis = Some(millis);
        let temp_id = TempId::from_millis(millis);

        tracing::debug!(conversation = %self.conversation_id, %temp_id, "sending message");
        self.local_typing_since = None;
        self.messages.insert(
            0,
            Message::local(
                temp_id.clone(),
                self.conversation_id,
                content.to_string(),
                MessageType::Text,
                wall_clock_millis,
            ),
        );

        actions.push(ReconcilerAction::ListChanged);
        actions.push(ReconcilerAction::SendFrame(OutboundFrame::SendMessage {
            conversation_id: self.conversation_id,
            content: content.to_string(),
            message_type: MessageType::Text,
        }));
        actions.push(ReconcilerAction::Api(ApiRequest::SendMessage {
            temp_id,
            request: SendMessageRequest {
                conversation: self.conversation_id,
                content: content.to_string(),
                message_type: MessageType::Text,
            },
        }));
    }

    fn send_completed(
        &mut self,
        temp_id: &TempId,
        result: Result<WireMessage, ApiError>,
        actions: &mut Vec<ReconcilerAction>,
    ) {
        let Some(slot) = self.messages.iter().position(|m| m.temp_id() == Some(temp_id)) else {
            tracing::debug!(%temp_id, "send completion for unknown echo");
            return;
        };

        match result {
            Ok(wire) => {
                let mut confirmed = Message::from_wire(wire, self.conversation_id, self.config.self_id);
                confirmed.sender_is_self = true;

                let already_listed = confirmed
                    .confirmed_id()
                    .is_some_and(|id| self.position_of(id).is_some());

                if already_listed {
                    self.messages.remove(slot);
                } else {
                    self.messages[slot] = confirmed;
                }
            },
            Err(error) => {
                tracing::warn!(%temp_id, %error, "send failed, rolling back");
                let removed = self.messages.remove(slot);
                actions.push(ReconcilerAction::SendFailed {
                    temp_id: temp_id.clone(),
                    content: removed.content,
                    reason: error.to_string(),
                });
            },
        }

        actions.push(ReconcilerAction::ListChanged);
    }

    fn message_rendered(&mut self, message_id: MessageId, actions: &mut Vec<ReconcilerAction>) {
        let Some(message) = self.find(&message_id) else {
            return;
        };

        if message.sender_is_self || message.is_read || self.read_requested.contains(&message_id) {
            return;
        }

        self.read_requested.insert(message_id.clone());
        actions.push(ReconcilerAction::Api(ApiRequest::MarkAsRead { message_id }));
    }

    fn mark_read_completed(
        &mut self,
        message_id: MessageId,
        result: Result<(), ApiError>,
        actions: &mut Vec<ReconcilerAction>,
    ) {
        match result {
            Ok(()) => {
                if self.set_read(&message_id) {
                    actions.push(ReconcilerAction::ListChanged);
                }
                actions.push(ReconcilerAction::SendFrame(OutboundFrame::MarkAsRead { message_id }));
            },
            Err(error) if error.is_transient() => {
                tracing::warn!(id = %message_id, %error, "mark as read failed, will retry");
                self.read_requested.remove(&message_id);
            },
            // Stays requested, so later renders do not ask again.
            Err(error) => {
                tracing::warn!(id = %message_id, %error, "mark as read rejected");
            },
        }
    }

    fn tick(&mut self, now: I, actions: &mut Vec<ReconcilerAction>) {
        if let Some(since) = self.peer_typing_since
            && now - since >= self.config.typing_timeout
        {
            self.peer_typing_since = None;
            actions.push(ReconcilerAction::TypingChanged(false));
        }

        if let Some(since) = self.local_typing_since
            && now - since >= self.config.local_typing_timeout
        {
            self.local_typing_since = None;
        }
    }

    fn position_of(&self, id: &MessageId) -> Option<usize> {
        self.messages.iter().position(|m| m.confirmed_id() == Some(id))
    }

    fn find(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.confirmed_id() == Some(id))
    }

    fn set_read(&mut self, id: &MessageId) -> bool {
        match self.messages.iter_mut().find(|m| m.id == MessageRef::Confirmed(id.clone())) {
            Some(message) if !message.is_read => {
                message.is_read = true;
                true
            },
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use chrono::DateTime;

    use super::*;
    use crate::message::Provenance;

    const CONVERSATION: ConversationId = ConversationId(42);

    fn wire(id: u64, sender_id: u64, millis: i64) -> WireMessage {
        WireMessage {
            id: MessageId::Number(id),
            conversation_id: Some(CONVERSATION),
            sender_id: Some(sender_id),
            sender_username: None,
            content: format!("message {id}"),
            message_type: MessageType::Text,
            is_read: false,
            created_at: DateTime::from_timestamp_millis(millis).unwrap_or_default(),
            is_sender: None,
        }
    }

    fn mounted(status: ConnectionStatus) -> ConversationReconciler<Instant> {
        let mut reconciler = ConversationReconciler::new(
            CONVERSATION,
            ReconcilerConfig { self_id: Some(1), ..ReconcilerConfig::default() },
        );
        reconciler.handle(ReconcilerEvent::StatusChanged(status));
        reconciler.handle(ReconcilerEvent::Mounted);
        reconciler
    }

    fn push(message: WireMessage) -> ReconcilerEvent<Instant> {
        ReconcilerEvent::Inbound {
            event: InboundEvent::NewMessage { conversation_id: Some(CONVERSATION), message },
            now: Instant::now(),
        }
    }

    fn frames(actions: &[ReconcilerAction]) -> Vec<&'static str> {
        actions
            .iter()
            .filter_map(|action| match action {
                ReconcilerAction::SendFrame(frame) => Some(frame.action()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn mount_while_connected_joins_once_and_loads_history() {
        let mut reconciler = ConversationReconciler::<Instant>::new(CONVERSATION, ReconcilerConfig::default());
        reconciler.handle(ReconcilerEvent::StatusChanged(ConnectionStatus::Connected));

        let actions = reconciler.handle(ReconcilerEvent::Mounted);
        assert_eq!(frames(&actions), vec!["join_conversation"]);
        assert!(actions.contains(&ReconcilerAction::Api(ApiRequest::GetMessages {
            conversation_id: CONVERSATION
        })));

        let again = reconciler.handle(ReconcilerEvent::StatusChanged(ConnectionStatus::Connected));
        assert!(again.is_empty());
    }

    #[test]
    fn join_waits_for_connection_and_repeats_after_reconnect() {
        let mut reconciler = mounted(ConnectionStatus::Connecting);
        assert!(!reconciler.is_joined());

        let actions = reconciler.handle(ReconcilerEvent::StatusChanged(ConnectionStatus::Connected));
        assert_eq!(frames(&actions), vec!["join_conversation"]);

        reconciler.handle(ReconcilerEvent::StatusChanged(ConnectionStatus::Disconnected));
        assert!(!reconciler.is_joined());

        let actions = reconciler.handle(ReconcilerEvent::StatusChanged(ConnectionStatus::Connected));
        assert_eq!(frames(&actions), vec!["join_conversation"]);
    }

    #[test]
    fn unmount_leaves_only_when_joined_and_connected() {
        let mut reconciler = mounted(ConnectionStatus::Connected);
        let actions = reconciler.handle(ReconcilerEvent::Unmounted);
        assert_eq!(frames(&actions), vec!["leave_conversation"]);

        let mut offline = mounted(ConnectionStatus::Connected);
        offline.handle(ReconcilerEvent::StatusChanged(ConnectionStatus::Disconnected));
        assert!(frames(&offline.handle(ReconcilerEvent::Unmounted)).is_empty());
    }

    #[test]
    fn optimistic_send_is_replaced_in_place() {
        let mut reconciler = mounted(ConnectionStatus::Connected);
        reconciler.handle(push(wire(900, 2, 1_699_999_000_000)));

        let actions = reconciler.handle(ReconcilerEvent::SendRequested {
            content: "  hi  ".to_string(),
            wall_clock_millis: 1_700_000_000_000,
        });
        assert_eq!(frames(&actions), vec!["send_message"]);

        let temp_id = TempId::from_millis(1_700_000_000_000);
        assert!(actions.contains(&ReconcilerAction::Api(ApiRequest::SendMessage {
            temp_id: temp_id.clone(),
            request: SendMessageRequest {
                conversation: CONVERSATION,
                content: "hi".to_string(),
                message_type: MessageType::Text,
            },
        })));
        assert_eq!(reconciler.messages()[0].id, MessageRef::Local(temp_id.clone()));

        let mut confirmed = wire(987, 1, 1_700_000_000_100);
        confirmed.content = "hi".to_string();
        reconciler.handle(ReconcilerEvent::SendCompleted { temp_id, result: Ok(confirmed) });

        let ids: Vec<String> = reconciler.messages().iter().map(|m| m.id.to_string()).collect();
        assert_eq!(ids, vec!["987", "900"]);
        assert!(reconciler.messages()[0].sender_is_self);
        assert_eq!(reconciler.messages()[0].provenance(), Provenance::Confirmed);
    }

    #[test]
    fn push_before_rest_does_not_duplicate() {
        let mut reconciler = mounted(ConnectionStatus::Connected);
        reconciler.handle(ReconcilerEvent::SendRequested {
            content: "hi".to_string(),
            wall_clock_millis: 1_700_000_000_000,
        });

        // Echo without authorship information gets listed by id.
        let mut echo = wire(987, 3, 1_700_000_000_100);
        echo.sender_id = None;
        reconciler.handle(push(echo.clone()));
        assert_eq!(reconciler.messages().len(), 2);

        reconciler.handle(ReconcilerEvent::SendCompleted {
            temp_id: TempId::from_millis(1_700_000_000_000),
            result: Ok(echo),
        });
        assert_eq!(reconciler.messages().len(), 1);
        assert_eq!(reconciler.messages()[0].confirmed_id(), Some(&MessageId::Number(987)));
    }

    #[test]
    fn self_authored_push_is_ignored() {
        let mut reconciler = mounted(ConnectionStatus::Connected);
        let actions = reconciler.handle(push(wire(987, 1, 0)));
        assert!(actions.is_empty());
        assert!(reconciler.messages().is_empty());
    }

    #[test]
    fn failed_send_removes_only_its_echo() {
        let mut reconciler = mounted(ConnectionStatus::Connected);
        reconciler.handle(ReconcilerEvent::SendRequested { content: "a".to_string(), wall_clock_millis: 10 });
        reconciler.handle(ReconcilerEvent::SendRequested { content: "b".to_string(), wall_clock_millis: 10 });

        let actions = reconciler.handle(ReconcilerEvent::SendCompleted {
            temp_id: TempId::from_millis(10),
            result: Err(ApiError::Timeout),
        });
        assert!(actions.contains(&ReconcilerAction::SendFailed {
            temp_id: TempId::from_millis(10),
            content: "a".to_string(),
            reason: "request timed out".to_string(),
        }));

        let remaining: Vec<&str> = reconciler.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(remaining, vec!["b"]);
        assert_eq!(reconciler.messages()[0].id, MessageRef::Local(TempId::from_millis(11)));
    }

    #[test]
    fn blank_input_is_not_sent() {
        let mut reconciler = mounted(ConnectionStatus::Connected);
        let actions = reconciler.handle(ReconcilerEvent::SendRequested {
            content: "   ".to_string(),
            wall_clock_millis: 1,
        });
        assert!(actions.is_empty());
    }

    #[test]
    fn history_is_sorted_newest_first_and_keeps_pending_echoes() {
        let mut reconciler = mounted(ConnectionStatus::Connected);
        reconciler.handle(ReconcilerEvent::SendRequested {
            content: "pending".to_string(),
            wall_clock_millis: 5_000,
        });
        reconciler.handle(push(wire(3, 2, 3_000)));

        reconciler.handle(ReconcilerEvent::HistoryLoaded {
            conversation_id: CONVERSATION,
            result: Ok(vec![wire(1, 2, 1_000), wire(3, 2, 3_000), wire(2, 1, 2_000)]),
        });

        let ids: Vec<String> = reconciler.messages().iter().map(|m| m.id.to_string()).collect();
        assert_eq!(ids, vec!["temp_5000", "3", "2", "1"]);
    }

    #[test]
    fn history_for_another_conversation_is_ignored() {
        let mut reconciler = mounted(ConnectionStatus::Connected);
        let actions = reconciler.handle(ReconcilerEvent::HistoryLoaded {
            conversation_id: ConversationId(7),
            result: Ok(vec![wire(1, 2, 1_000)]),
        });
        assert!(actions.is_empty());
        assert!(reconciler.messages().is_empty());
    }

    #[test]
    fn read_receipts_are_idempotent() {
        let mut reconciler = mounted(ConnectionStatus::Connected);
        reconciler.handle(push(wire(5, 2, 0)));

        let actions = reconciler.handle(ReconcilerEvent::MessageRendered(MessageId::Number(5)));
        assert_eq!(actions, vec![ReconcilerAction::Api(ApiRequest::MarkAsRead {
            message_id: MessageId::Number(5)
        })]);
        assert!(reconciler.handle(ReconcilerEvent::MessageRendered(MessageId::Number(5))).is_empty());

        let read_push = ReconcilerEvent::Inbound {
            event: InboundEvent::MessageRead {
                conversation_id: Some(CONVERSATION),
                message_id: MessageId::Number(5),
            },
            now: Instant::now(),
        };
        assert_eq!(reconciler.handle(read_push.clone()), vec![ReconcilerAction::ListChanged]);
        assert!(reconciler.handle(read_push).is_empty());

        let actions = reconciler.handle(ReconcilerEvent::MarkReadCompleted {
            message_id: MessageId::Number(5),
            result: Ok(()),
        });
        assert_eq!(frames(&actions), vec!["mark_as_read"]);
        assert!(!actions.contains(&ReconcilerAction::ListChanged));
        assert!(reconciler.messages()[0].is_read);
    }

    #[test]
    fn own_messages_are_never_marked_read() {
        let mut reconciler = mounted(ConnectionStatus::Connected);
        reconciler.handle(ReconcilerEvent::SendRequested { content: "x".to_string(), wall_clock_millis: 1 });
        reconciler.handle(ReconcilerEvent::SendCompleted {
            temp_id: TempId::from_millis(1),
            result: Ok(wire(6, 1, 1)),
        });

        assert!(reconciler.handle(ReconcilerEvent::MessageRendered(MessageId::Number(6))).is_empty());
    }

    #[test]
    fn failed_mark_read_may_be_retried() {
        let mut reconciler = mounted(ConnectionStatus::Connected);
        reconciler.handle(push(wire(5, 2, 0)));
        reconciler.handle(ReconcilerEvent::MessageRendered(MessageId::Number(5)));

        let actions = reconciler.handle(ReconcilerEvent::MarkReadCompleted {
            message_id: MessageId::Number(5),
            result: Err(ApiError::Transport("reset".to_string())),
        });
        assert!(actions.is_empty());
        assert_eq!(reconciler.handle(ReconcilerEvent::MessageRendered(MessageId::Number(5))).len(), 1);
    }

    #[test]
    fn rejected_mark_read_is_not_retried() {
        let mut reconciler = mounted(ConnectionStatus::Connected);
        reconciler.handle(push(wire(5, 2, 0)));
        reconciler.handle(ReconcilerEvent::MessageRendered(MessageId::Number(5)));

        let actions = reconciler.handle(ReconcilerEvent::MarkReadCompleted {
            message_id: MessageId::Number(5),
            result: Err(ApiError::Status { status: 404, body: "not found".to_string() }),
        });
        assert!(actions.is_empty());
        assert!(reconciler.handle(ReconcilerEvent::MessageRendered(MessageId::Number(5))).is_empty());
        assert!(!reconciler.messages()[0].is_read);
    }

    #[test]
    fn peer_typing_times_out() {
        let t0 = Instant::now();
        let mut reconciler = mounted(ConnectionStatus::Connected);
        let typing = |now| ReconcilerEvent::Inbound {
            event: InboundEvent::UserTyping { conversation_id: CONVERSATION },
            now,
        };

        assert_eq!(reconciler.handle(typing(t0)), vec![ReconcilerAction::TypingChanged(true)]);
        assert!(reconciler.handle(ReconcilerEvent::Tick(t0 + Duration::from_secs(1))).is_empty());
        assert!(reconciler.peer_typing());

        assert_eq!(
            reconciler.handle(ReconcilerEvent::Tick(t0 + Duration::from_millis(3100))),
            vec![ReconcilerAction::TypingChanged(false)]
        );
        assert!(!reconciler.peer_typing());
    }

    #[test]
    fn repeated_typing_extends_the_indicator() {
        let t0 = Instant::now();
        let mut reconciler = mounted(ConnectionStatus::Connected);
        let typing = |now| ReconcilerEvent::Inbound {
            event: InboundEvent::UserTyping { conversation_id: CONVERSATION },
            now,
        };

        reconciler.handle(typing(t0));
        assert!(reconciler.handle(typing(t0 + Duration::from_secs(2))).is_empty());
        assert!(reconciler.handle(ReconcilerEvent::Tick(t0 + Duration::from_millis(3100))).is_empty());
        assert!(reconciler.peer_typing());
    }

    #[test]
    fn typing_in_other_conversations_is_ignored() {
        let mut reconciler = mounted(ConnectionStatus::Connected);
        let actions = reconciler.handle(ReconcilerEvent::Inbound {
            event: InboundEvent::UserTyping { conversation_id: ConversationId(7) },
            now: Instant::now(),
        });
        assert!(actions.is_empty());
    }

    #[test]
    fn input_changes_send_typing_frames() {
        let t0 = Instant::now();
        let mut reconciler = mounted(ConnectionStatus::Connected);

        let actions = reconciler.handle(ReconcilerEvent::InputChanged { text: "h".to_string(), now: t0 });
        assert_eq!(frames(&actions), vec!["typing"]);
        let actions = reconciler.handle(ReconcilerEvent::InputChanged { text: "hi".to_string(), now: t0 });
        assert_eq!(frames(&actions), vec!["typing"]);
        assert!(reconciler.is_composing());

        assert!(reconciler.handle(ReconcilerEvent::InputChanged { text: String::new(), now: t0 }).is_empty());

        reconciler.handle(ReconcilerEvent::Tick(t0 + Duration::from_secs(3)));
        assert!(!reconciler.is_composing());
    }

    #[test]
    fn completions_after_unmount_are_ignored() {
        let mut reconciler = mounted(ConnectionStatus::Connected);
        reconciler.handle(ReconcilerEvent::SendRequested { content: "x".to_string(), wall_clock_millis: 1 });
        reconciler.handle(ReconcilerEvent::Unmounted);

        let actions = reconciler.handle(ReconcilerEvent::SendCompleted {
            temp_id: TempId::from_millis(1),
            result: Err(ApiError::Timeout),
        });
        assert!(actions.is_empty());
        assert!(reconciler.handle(ReconcilerEvent::Mounted).is_empty());
        assert!(!reconciler.is_mounted());
    }

    #[test]
    fn list_snapshot_after_mixed_traffic() {
        let mut reconciler = mounted(ConnectionStatus::Connected);
        reconciler.handle(ReconcilerEvent::HistoryLoaded {
            conversation_id: CONVERSATION,
            result: Ok(vec![wire(1, 2, 1_000)]),
        });
        reconciler.handle(ReconcilerEvent::SendRequested {
            content: "hello".to_string(),
            wall_clock_millis: 2_000,
        });
        reconciler.handle(push(wire(2, 2, 3_000)));

        let rendered: Vec<String> = reconciler
            .messages()
            .iter()
            .map(|m| format!("{} {:?} self={} {}", m.id, m.provenance(), m.sender_is_self, m.content))
            .collect();

        insta::assert_debug_snapshot!(rendered, @r#"
        [
            "2 Confirmed self=false message 2",
            "temp_2000 Local self=true hello",
            "1 Confirmed self=false message 1",
        ]
        "#);
    }
}
