//! Line-oriented rendering.
//!
//! The terminal is append-only, so each render prints only what changed
//! since the previous one: status transitions, newly confirmed messages in
//! chronological order, the peer typing indicator turning on, and notices.
//! Local echoes are not printed; the user already sees the line they typed,
//! and a failed send is reported as a notice.

use std::collections::HashSet;

use rendezvous_app::{Notice, View};
use rendezvous_client::{ConnectionStatus, Message};
use rendezvous_proto::MessageId;

/// Render state carried between frames.
#[derive(Debug, Default)]
pub struct Screen {
    status: Option<ConnectionStatus>,
    printed: HashSet<MessageId>,
    reported_viewed: HashSet<MessageId>,
    peer_typing: bool,
}

impl Screen {
    /// Empty screen.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines to print for `view`.
    pub fn update<I>(&mut self, view: &View<'_, I>) -> Vec<String>
    where
        I: Copy + Ord + Send + Sync + std::ops::Sub<Output = std::time::Duration>,
    {
        let mut lines = Vec::new();

        if self.status != Some(view.status) {
            self.status = Some(view.status);
            lines.push(format!("-- {} --", status_label(view.status)));
        }

        for message in view.messages().iter().rev() {
            if let Some(id) = message.confirmed_id()
                && self.printed.insert(id.clone())
            {
                lines.push(format_message(message));
            }
        }

        let typing = view.peer_typing();
        if typing && !self.peer_typing {
            lines.push("-- peer is typing --".to_string());
        }
        self.peer_typing = typing;

        lines.extend(view.notices.iter().map(format_notice));
        lines
    }

    /// Confirmed peer messages on screen that have not been reported as
    /// viewed yet.
    pub fn newly_viewed<I>(&mut self, view: &View<'_, I>) -> Vec<MessageId>
    where
        I: Copy + Ord + Send + Sync + std::ops::Sub<Output = std::time::Duration>,
    {
        view.messages()
            .iter()
            .filter(|m| !m.sender_is_self && !m.is_read)
            .filter_map(Message::confirmed_id)
            .filter(|id| self.reported_viewed.insert((*id).clone()))
            .cloned()
            .collect()
    }
}

fn status_label(status: ConnectionStatus) -> &'static str {
    match status {
        ConnectionStatus::Disconnected => "disconnected",
        ConnectionStatus::Connecting => "connecting",
        ConnectionStatus::Connected => "connected",
        ConnectionStatus::Error => "connection error (try /reconnect)",
    }
}

fn format_message(message: &Message) -> String {
    let author = if message.sender_is_self {
        "you"
    } else {
        message.sender_username.as_deref().unwrap_or("peer")
    };
    format!("[{}] {author}: {}", message.created_at.format("%H:%M:%S"), message.content)
}

fn format_notice(notice: &Notice) -> String {
    match notice {
        Notice::SendFailed { content, reason } => format!("!! not sent ({reason}): {content}"),
        Notice::HistoryFailed { reason } => format!("!! could not load history: {reason}"),
        Notice::ServerError { reason } => format!("!! server: {reason}"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Instant;

    use rendezvous_client::{ConversationReconciler, ReconcilerConfig, ReconcilerEvent};
    use rendezvous_core::SocketState;
    use rendezvous_proto::{ConversationId, WireMessage};

    use super::*;

    fn wire(id: u64, sender: u64, content: &str, secs: i64) -> WireMessage {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "sender": sender,
            "content": content,
            "created_at": chrono::DateTime::from_timestamp(secs, 0).unwrap(),
        }))
        .unwrap()
    }

    fn conversation(history: Vec<WireMessage>) -> ConversationReconciler<Instant> {
        let mut reconciler = ConversationReconciler::new(
            ConversationId(42),
            ReconcilerConfig { self_id: Some(1), ..ReconcilerConfig::default() },
        );
        reconciler.handle(ReconcilerEvent::Mounted);
        reconciler.handle(ReconcilerEvent::HistoryLoaded {
            conversation_id: ConversationId(42),
            result: Ok(history),
        });
        reconciler
    }

    fn view<'a>(
        status: ConnectionStatus,
        conversation: &'a ConversationReconciler<Instant>,
        notices: &'a [Notice],
    ) -> View<'a, Instant> {
        View { status, socket_state: SocketState::Open, conversation: Some(conversation), notices }
    }

    #[test]
    fn prints_only_changes() {
        let mut screen = Screen::new();
        let first = conversation(vec![wire(2, 7, "second", 70), wire(1, 1, "first", 10)]);

        let lines = screen.update(&view(ConnectionStatus::Connected, &first, &[]));
        insta::assert_snapshot!(lines.join("\n"), @r"
        -- connected --
        [00:00:10] you: first
        [00:01:10] peer: second
        ");

        let notices = [Notice::ServerError { reason: "Invalid JSON".to_string() }];
        let lines = screen.update(&view(ConnectionStatus::Connected, &first, &notices));
        assert_eq!(lines, vec!["!! server: Invalid JSON"]);
    }

    #[test]
    fn viewed_ids_are_reported_once_and_exclude_own() {
        let mut screen = Screen::new();
        let conversation = conversation(vec![wire(2, 7, "hi", 70), wire(1, 1, "hello", 10)]);
        let view = view(ConnectionStatus::Connected, &conversation, &[]);

        assert_eq!(screen.newly_viewed(&view), vec![MessageId::Number(2)]);
        assert!(screen.newly_viewed(&view).is_empty());
    }
}
