//! Message Reconciliation
//!
//! Maintains a single ordered, duplicate-free message sequence for one
//! open conversation, fed from three asynchronous sources: optimistic
//! local inserts, confirmed records returned by the send call, and
//! records delivered over the real-time channel.
//!
//! The real-time event for a message the local user just sent may arrive
//! before the send call's own response. Whichever resolution reaches the
//! optimistic entry first wins; the second arrival is a no-op. The
//! sequence is only ever mutated from the embedding event loop, so it
//! needs no locking.

use crate::shared::messaging::{ChatMessage, MessageId, MessageRecord};

/// What `merge_incoming` (or a fallback confirm) did with a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The record was new and was inserted in timestamp order
    Inserted,
    /// The record resolved an optimistic entry in place
    ReplacedOptimistic,
    /// The record's id was already present; nothing changed
    Duplicate,
}

/// Ordered, duplicate-free working set of one conversation's messages
#[derive(Debug, Default)]
pub struct MessageReconciler {
    messages: Vec<ChatMessage>,
}

impl MessageReconciler {
    /// Create an empty reconciler
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the working set with server history, which arrives already
    /// ordered by creation time ascending
    pub fn reset(&mut self, history: Vec<MessageRecord>) {
        self.messages = history.into_iter().map(ChatMessage::from_record).collect();
    }

    /// Append an optimistic entry. Sends are issued in display order, so
    /// no reordering happens here.
    pub fn insert_optimistic(&mut self, message: ChatMessage) {
        debug_assert!(message.id.is_local());
        self.messages.push(message);
    }

    /// Resolve the optimistic entry with `local_id` using the confirmed
    /// record, preserving its position. When the entry is gone (the
    /// real-time channel got there first) the record goes through the
    /// regular merge, which drops it as a duplicate.
    pub fn confirm(&mut self, local_id: &MessageId, record: MessageRecord) -> MergeOutcome {
        if let Some(index) = self.messages.iter().position(|m| &m.id == local_id) {
            self.messages[index] = ChatMessage::from_record(record);
            return MergeOutcome::ReplacedOptimistic;
        }
        tracing::debug!("confirm for absent {}, merging instead", local_id);
        self.merge_incoming(record)
    }

    /// Remove the optimistic entry for a failed send, returning it
    pub fn rollback(&mut self, local_id: &MessageId) -> Option<ChatMessage> {
        let index = self.messages.iter().position(|m| &m.id == local_id)?;
        Some(self.messages.remove(index))
    }

    /// Merge a record delivered over the real-time channel.
    ///
    /// Duplicate when the same server id is already present; a record
    /// matching an optimistic entry's sender and content resolves that
    /// entry in place; anything else is inserted by creation timestamp,
    /// ties broken after existing entries with the same timestamp.
    pub fn merge_incoming(&mut self, record: MessageRecord) -> MergeOutcome {
        let server_id = MessageId::Server(record.id);
        if self.messages.iter().any(|m| m.id == server_id) {
            return MergeOutcome::Duplicate;
        }

        if let Some(index) = self.messages.iter().position(|m| {
            m.id.is_local() && m.sender_id == record.sender_id && m.content == record.content
        }) {
            self.messages[index] = ChatMessage::from_record(record);
            return MergeOutcome::ReplacedOptimistic;
        }

        let at = self
            .messages
            .iter()
            .rposition(|m| m.created_at <= record.created_at)
            .map_or(0, |i| i + 1);
        self.messages.insert(at, ChatMessage::from_record(record));
        MergeOutcome::Inserted
    }

    /// The current ordered sequence
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Number of entries in the sequence
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the sequence is empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
