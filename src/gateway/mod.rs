//! Remote Data Gateway
//!
//! The chat client owns no durable state: conversations, messages,
//! profiles, presence markers, and push delivery all live behind a hosted
//! gateway. This module defines that contract as a trait plus the
//! subscription handle its real-time channel hands out, and ships two
//! implementations:
//!
//! - [`HttpGateway`] - the production implementation over the gateway's
//!   REST surface and its server-sent event stream
//! - [`InMemoryGateway`] - an in-process implementation for tests and
//!   local development
//!
//! # Presence
//!
//! The presence marker is mutated only through the narrow
//! `set_active_conversation` / `clear_active_conversation` transitions;
//! there is deliberately no general profile-update call here.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::shared::error::ChatError;
use crate::shared::messaging::{Conversation, ConversationSummary, MessageRecord, Profile};

/// HTTP implementation over the gateway's REST + SSE surface
pub mod http;

/// In-process implementation for tests and local development
pub mod memory;

pub use http::HttpGateway;
pub use memory::InMemoryGateway;

/// Handle for an active real-time subscription.
///
/// Records are buffered into an internal channel by a forwarder task;
/// the embedding event loop drains them with [`try_recv`](Self::try_recv)
/// or awaits them with [`recv`](Self::recv). Dropping the handle (or
/// calling [`unsubscribe`](Self::unsubscribe)) releases the channel and
/// stops the forwarder.
#[derive(Debug)]
pub struct Subscription<T> {
    receiver: mpsc::Receiver<T>,
    forwarder: JoinHandle<()>,
}

impl<T> Subscription<T> {
    pub(crate) fn new(receiver: mpsc::Receiver<T>, forwarder: JoinHandle<()>) -> Self {
        Self {
            receiver,
            forwarder,
        }
    }

    /// Take the next buffered record without waiting
    pub fn try_recv(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    /// Wait for the next record; `None` once the channel has closed
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Release the subscription
    pub fn unsubscribe(self) {}
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

/// Contract of the hosted backend the chat client talks to.
///
/// Identifiers and message timestamps are always assigned server-side;
/// errors use the shared [`ChatError`] taxonomy. Conversation creation
/// enforces uniqueness over the unordered participant pair and listing,
/// signalled as [`ChatError::Conflict`].
#[async_trait]
pub trait RemoteGateway: Send + Sync + 'static {
    /// Look up the conversation between an unordered participant pair,
    /// optionally scoped to a listing
    async fn find_conversation(
        &self,
        participant_a: Uuid,
        participant_b: Uuid,
        listing_id: Option<Uuid>,
    ) -> Result<Option<Conversation>, ChatError>;

    /// Create a conversation. Fails with [`ChatError::Conflict`] when one
    /// already exists for the pair and listing.
    async fn create_conversation(
        &self,
        buyer_id: Uuid,
        seller_id: Uuid,
        listing_id: Option<Uuid>,
    ) -> Result<Conversation, ChatError>;

    /// Fetch a conversation by id
    async fn get_conversation(&self, conversation_id: Uuid) -> Result<Option<Conversation>, ChatError>;

    /// Insert a message; the gateway assigns id and timestamp and bumps
    /// the conversation's activity timestamp
    async fn insert_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: &str,
    ) -> Result<MessageRecord, ChatError>;

    /// All messages of a conversation, ordered by creation time ascending
    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<MessageRecord>, ChatError>;

    /// Mark every message in the conversation not sent by `reader_id` as read
    async fn mark_read(&self, conversation_id: Uuid, reader_id: Uuid) -> Result<(), ChatError>;

    /// The local user's conversations joined with counterparty names and
    /// latest-message data, newest activity first
    async fn list_conversation_summaries(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<ConversationSummary>, ChatError>;

    /// Subscribe to message inserts for one conversation
    async fn subscribe_messages(
        &self,
        conversation_id: Uuid,
    ) -> Result<Subscription<MessageRecord>, ChatError>;

    /// Subscribe to conversation creation/activity for one user
    async fn subscribe_conversations(
        &self,
        user_id: Uuid,
    ) -> Result<Subscription<Conversation>, ChatError>;

    /// Fetch the chat-relevant slice of a user profile
    async fn get_profile(&self, user_id: Uuid) -> Result<Profile, ChatError>;

    /// Fetch a user's registered push token
    async fn get_push_token(&self, user_id: Uuid) -> Result<Option<String>, ChatError>;

    /// Register a push token on the local user's profile
    async fn save_push_token(&self, user_id: Uuid, token: &str) -> Result<(), ChatError>;

    /// Dispatch a push message to a device token
    async fn send_push(
        &self,
        token: &str,
        title: &str,
        body: &str,
        data: serde_json::Value,
    ) -> Result<(), ChatError>;

    /// Mark the user as actively viewing a conversation
    async fn set_active_conversation(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<(), ChatError>;

    /// Clear the user's presence marker
    async fn clear_active_conversation(&self, user_id: Uuid) -> Result<(), ChatError>;
}
