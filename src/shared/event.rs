/**
 * Real-time Event System
 *
 * This module defines the event envelope delivered over the gateway's
 * real-time channel. Events can represent different types of updates:
 * new messages, conversation activity, etc.
 */
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::messaging::{Conversation, MessageRecord};

/// Type of real-time event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A message was inserted into a conversation
    Message,
    /// A conversation was created or its activity timestamp changed
    Conversation,
    /// Custom event type
    Custom(String),
}

/// Real-time event delivered to all subscribers of a channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RealtimeEvent {
    /// Type of event
    pub event_type: EventType,
    /// Event payload (JSON-serializable data)
    pub payload: serde_json::Value,
    /// Timestamp when the event occurred
    pub timestamp: DateTime<Utc>,
}

impl RealtimeEvent {
    /// Create a new real-time event
    pub fn new(event_type: EventType, payload: serde_json::Value) -> Self {
        Self {
            event_type,
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Create a message event from a server message record
    pub fn message(record: &MessageRecord) -> Self {
        let payload = serde_json::to_value(record).unwrap_or(serde_json::Value::Null);
        Self::new(EventType::Message, payload)
    }

    /// Create a conversation event from a conversation record
    pub fn conversation(conversation: &Conversation) -> Self {
        let payload = serde_json::to_value(conversation).unwrap_or(serde_json::Value::Null);
        Self::new(EventType::Conversation, payload)
    }

    /// Decode the payload as a server message record
    pub fn as_message(&self) -> Option<MessageRecord> {
        if self.event_type != EventType::Message {
            return None;
        }
        serde_json::from_value(self.payload.clone()).ok()
    }

    /// Decode the payload as a conversation record
    pub fn as_conversation(&self) -> Option<Conversation> {
        if self.event_type != EventType::Conversation {
            return None;
        }
        serde_json::from_value(self.payload.clone()).ok()
    }
}
