//! Chat Message Data Structures
//!
//! Represents a message in a conversation, in its two forms: the row the
//! gateway stores (`MessageRecord`) and the client's working view
//! (`ChatMessage`), which may still be awaiting server confirmation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Maximum accepted message length, in characters
pub const MAX_MESSAGE_LEN: usize = 1000;

/// Identity of a message as seen by this client.
///
/// Optimistic entries carry a locally generated id until the gateway
/// confirms them; reconciliation dispatches on the variant rather than on
/// any identifier convention.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "origin", content = "id", rename_all = "snake_case")]
pub enum MessageId {
    /// Locally generated id for an entry awaiting confirmation
    Local(Uuid),
    /// Id assigned by the gateway
    Server(Uuid),
}

impl MessageId {
    /// Generate a fresh local id for an optimistic entry
    pub fn local() -> Self {
        Self::Local(Uuid::new_v4())
    }

    /// Whether this id belongs to an unconfirmed optimistic entry
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(id) => write!(f, "local:{}", id),
            Self::Server(id) => write!(f, "server:{}", id),
        }
    }
}

/// Delivery state of a client-side message.
///
/// A message only ever moves `Pending -> Confirmed`; a failed send removes
/// the pending entry instead of transitioning it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    /// Shown to the user, not yet acknowledged by the gateway
    Pending,
    /// Acknowledged by the gateway
    Confirmed,
}

/// A message row as stored and returned by the gateway.
///
/// The id and creation timestamp are always server-assigned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageRecord {
    /// Server-assigned message id
    pub id: Uuid,
    /// Conversation this message belongs to
    pub conversation_id: Uuid,
    /// User who sent the message
    pub sender_id: Uuid,
    /// Message text
    pub content: String,
    /// Server-assigned creation timestamp
    pub created_at: DateTime<Utc>,
    /// When the recipient read the message, if they have
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
}

impl MessageRecord {
    /// Get a preview of the message (first `max_len` characters)
    pub fn preview(&self, max_len: usize) -> String {
        if self.content.chars().count() <= max_len {
            self.content.clone()
        } else {
            let mut preview: String = self.content.chars().take(max_len.saturating_sub(3)).collect();
            preview.push_str("...");
            preview
        }
    }
}

/// Client-side view of a message in an open conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    /// Tagged identity (local until confirmed)
    pub id: MessageId,
    /// Conversation this message belongs to
    pub conversation_id: Uuid,
    /// User who sent the message
    pub sender_id: Uuid,
    /// Message text
    pub content: String,
    /// Creation timestamp; local clock for optimistic entries, replaced by
    /// the server-assigned timestamp on confirmation
    pub created_at: DateTime<Utc>,
    /// When the recipient read the message, if they have
    pub read_at: Option<DateTime<Utc>>,
    /// Delivery state
    pub state: DeliveryState,
}

impl ChatMessage {
    /// Create an optimistic entry for a message the local user just typed
    pub fn optimistic(conversation_id: Uuid, sender_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::local(),
            conversation_id,
            sender_id,
            content: content.into(),
            created_at: Utc::now(),
            read_at: None,
            state: DeliveryState::Pending,
        }
    }

    /// Build the client view of a server-confirmed record
    pub fn from_record(record: MessageRecord) -> Self {
        Self {
            id: MessageId::Server(record.id),
            conversation_id: record.conversation_id,
            sender_id: record.sender_id,
            content: record.content,
            created_at: record.created_at,
            read_at: record.read_at,
            state: DeliveryState::Confirmed,
        }
    }

    /// Whether this entry is still awaiting confirmation
    pub fn is_pending(&self) -> bool {
        self.state == DeliveryState::Pending
    }
}
