//! Conversation Data Structures
//!
//! Represents a conversation between a buyer and a seller, optionally
//! scoped to a marketplace listing. Exactly one conversation exists per
//! unordered participant pair and listing; the gateway enforces the
//! uniqueness constraint and signals violations as conflicts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::message::MessageRecord;

/// Preview length used for conversation summaries
pub const PREVIEW_LEN: usize = 80;

/// A conversation between two users
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    /// Unique conversation id
    pub id: Uuid,
    /// The participant who opened the conversation
    pub buyer_id: Uuid,
    /// The participant being contacted
    pub seller_id: Uuid,
    /// The listing this conversation is about, if any
    #[serde(default)]
    pub listing_id: Option<Uuid>,
    /// When the conversation was created
    pub created_at: DateTime<Utc>,
    /// Last activity timestamp, bumped on every message insert
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Check if a user is one of the two participants
    pub fn has_participant(&self, user_id: Uuid) -> bool {
        self.buyer_id == user_id || self.seller_id == user_id
    }

    /// Check if this conversation is between the given unordered pair
    pub fn involves_pair(&self, a: Uuid, b: Uuid) -> bool {
        (self.buyer_id == a && self.seller_id == b) || (self.buyer_id == b && self.seller_id == a)
    }

    /// The participant on the other side of the conversation from `user_id`
    pub fn counterparty_of(&self, user_id: Uuid) -> Uuid {
        if self.buyer_id == user_id {
            self.seller_id
        } else {
            self.buyer_id
        }
    }
}

/// One row of the conversation inbox: a conversation joined with the
/// counterparty's display name and latest-message information.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationSummary {
    /// The conversation itself
    #[serde(flatten)]
    pub conversation: Conversation,
    /// Display name of the other participant
    pub counterparty_name: String,
    /// Preview text of the latest message, empty when there is none
    #[serde(default)]
    pub last_message_preview: String,
    /// Timestamp of the latest message
    #[serde(default)]
    pub last_message_at: Option<DateTime<Utc>>,
    /// Number of messages not sent by the local user and not yet read
    #[serde(default)]
    pub unread_count: u32,
}

impl ConversationSummary {
    /// Update the latest-message fields from a freshly inserted record
    pub fn update_last_message(&mut self, record: &MessageRecord) {
        self.last_message_preview = record.preview(PREVIEW_LEN);
        self.last_message_at = Some(record.created_at);
        self.conversation.updated_at = record.created_at;
    }
}
