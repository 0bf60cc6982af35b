//! Bounded log of inbound events.

use std::collections::VecDeque;

use rendezvous_proto::InboundEvent;

/// Entries retained before the oldest is dropped.
pub const DEFAULT_LOG_CAPACITY: usize = 100;

/// An event with its position in the session's event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedEvent {
    /// Monotonic sequence number, never reused, survives trimming and clears
    pub seq: u64,
    /// The decoded event
    pub event: InboundEvent,
}

/// Append-only event log capped at a fixed number of entries.
///
/// `new_message` events are deduplicated by message id against the retained
/// entries, so a frame the server delivers twice is logged once.
#[derive(Debug, Clone)]
pub struct EventLog {
    capacity: usize,
    entries: VecDeque<LoggedEvent>,
    next_seq: u64,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl EventLog {
    /// Create an empty log holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { capacity, entries: VecDeque::with_capacity(capacity), next_seq: 1 }
    }

    /// Append an event, dropping the oldest entry if full.
    ///
    /// Returns the assigned sequence number, or `None` if the event duplicates
    /// a retained `new_message`.
    pub fn push(&mut self, event: InboundEvent) -> Option<u64> {
        if self.is_duplicate(&event) {
            tracing::debug!(kind = event.kind(), "dropping duplicate event");
            return None;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push_back(LoggedEvent { seq, event });

        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }

        Some(seq)
    }

    /// Retained entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &LoggedEvent> {
        self.entries.iter()
    }

    /// Retained entries with `seq > after`, oldest first.
    pub fn since(&self, after: u64) -> impl Iterator<Item = &LoggedEvent> {
        // Sequence numbers are contiguous within the deque.
        let skip = self.entries.front().map_or(0, |first| {
            usize::try_from(after.saturating_add(1).saturating_sub(first.seq)).unwrap_or(usize::MAX)
        });
        self.entries.iter().skip(skip)
    }

    /// Sequence number of the most recent append, or 0 if nothing was ever
    /// appended.
    #[must_use]
    pub fn last_seq(&self) -> u64 {
        self.next_seq - 1
    }

    /// Sequence number of the oldest retained entry.
    #[must_use]
    pub fn first_retained_seq(&self) -> Option<u64> {
        self.entries.front().map(|entry| entry.seq)
    }

    /// Number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum retained entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every retained entry. Sequence numbers keep increasing.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn is_duplicate(&self, event: &InboundEvent) -> bool {
        let InboundEvent::NewMessage { message, .. } = event else {
            return false;
        };

        self.entries.iter().any(|entry| {
            matches!(&entry.event, InboundEvent::NewMessage { message: seen, .. } if seen.id == message.id)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rendezvous_proto::ConversationId;

    use super::*;

    fn typing(id: u64) -> InboundEvent {
        InboundEvent::UserTyping { conversation_id: ConversationId(id) }
    }

    fn new_message(id: u64) -> InboundEvent {
        InboundEvent::from_value(&serde_json::json!({
            "type": "new_message",
            "conversation_id": 1,
            "message": { "id": id, "content": "hi", "created_at": "2023-11-14T22:13:20Z" }
        }))
        .unwrap()
    }

    #[test]
    fn keeps_most_recent_entries() {
        let mut log = EventLog::new(3);
        for id in 1..=5 {
            log.push(typing(id));
        }

        let kept: Vec<u64> = log.iter().map(|entry| entry.seq).collect();
        assert_eq!(kept, vec![3, 4, 5]);
        assert_eq!(log.last_seq(), 5);
    }

    #[test]
    fn since_resumes_after_cursor() {
        let mut log = EventLog::new(10);
        for id in 1..=4 {
            log.push(typing(id));
        }

        let seqs: Vec<u64> = log.since(2).map(|entry| entry.seq).collect();
        assert_eq!(seqs, vec![3, 4]);
        assert_eq!(log.since(4).count(), 0);
        assert_eq!(log.since(0).count(), 4);
    }

    #[test]
    fn since_tolerates_trimmed_cursor() {
        let mut log = EventLog::new(2);
        for id in 1..=5 {
            log.push(typing(id));
        }

        let seqs: Vec<u64> = log.since(1).map(|entry| entry.seq).collect();
        assert_eq!(seqs, vec![4, 5]);
    }

    #[test]
    fn clear_keeps_sequence_monotonic() {
        let mut log = EventLog::default();
        log.push(typing(1));
        log.push(typing(2));
        log.clear();

        assert!(log.is_empty());
        assert_eq!(log.push(typing(3)), Some(3));
        assert_eq!(log.since(2).count(), 1);
    }

    #[test]
    fn duplicate_new_messages_are_logged_once() {
        let mut log = EventLog::default();
        assert_eq!(log.push(new_message(987)), Some(1));
        assert_eq!(log.push(new_message(987)), None);
        assert_eq!(log.push(new_message(988)), Some(2));

        // Repeated typing events are distinct occurrences.
        assert!(log.push(typing(1)).is_some());
        assert!(log.push(typing(1)).is_some());
        assert_eq!(log.len(), 4);
    }
}
