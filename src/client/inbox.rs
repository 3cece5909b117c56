//! Conversation Inbox
//!
//! The conversation list view's data source: every conversation the local
//! user participates in, joined with the counterparty's name, the latest
//! message preview, and an unread count, ordered by most recent activity.
//! Conversation-level real-time events mark the list stale; the embedding
//! loop refreshes it by polling.

use std::sync::Arc;

use uuid::Uuid;

use crate::client::session::LocalUser;
use crate::gateway::{RemoteGateway, Subscription};
use crate::shared::error::ChatError;
use crate::shared::messaging::{Conversation, ConversationSummary};

/// Inbox of the local user's conversations
pub struct ConversationInbox<G: RemoteGateway> {
    gateway: Arc<G>,
    user_id: Uuid,
    summaries: Vec<ConversationSummary>,
    updates: Option<Subscription<Conversation>>,
}

impl<G: RemoteGateway> ConversationInbox<G> {
    /// Load the inbox and subscribe to conversation activity. Fails with
    /// `NotAuthenticated` when no local user session exists.
    pub async fn open(gateway: Arc<G>, local_user: Option<LocalUser>) -> Result<Self, ChatError> {
        let local_user = local_user.ok_or(ChatError::NotAuthenticated)?;
        let summaries = gateway.list_conversation_summaries(local_user.id).await?;
        let updates = gateway.subscribe_conversations(local_user.id).await?;

        tracing::debug!("inbox opened with {} conversations", summaries.len());
        Ok(Self {
            gateway,
            user_id: local_user.id,
            summaries,
            updates: Some(updates),
        })
    }

    /// The current summaries, newest activity first
    pub fn summaries(&self) -> &[ConversationSummary] {
        &self.summaries
    }

    /// Re-fetch the summaries from the gateway
    pub async fn refresh(&mut self) -> Result<(), ChatError> {
        self.summaries = self.gateway.list_conversation_summaries(self.user_id).await?;
        Ok(())
    }

    /// Drain buffered conversation events; when any activity arrived,
    /// re-fetch the list. Returns whether the list was refreshed.
    pub async fn poll_updates(&mut self) -> Result<bool, ChatError> {
        let mut dirty = false;
        if let Some(updates) = self.updates.as_mut() {
            while updates.try_recv().is_some() {
                dirty = true;
            }
        }
        if dirty {
            self.refresh().await?;
        }
        Ok(dirty)
    }

    /// Wait for the next conversation event and re-fetch the list.
    /// Returns `false` once the channel has closed.
    pub async fn recv_update(&mut self) -> Result<bool, ChatError> {
        let event = match self.updates.as_mut() {
            Some(updates) => updates.recv().await,
            None => None,
        };
        if event.is_none() {
            return Ok(false);
        }
        self.refresh().await?;
        Ok(true)
    }

    /// Release the real-time subscription
    pub fn close(&mut self) {
        if let Some(updates) = self.updates.take() {
            updates.unsubscribe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::InMemoryGateway;
    use crate::shared::messaging::Profile;

    #[tokio::test]
    async fn test_open_requires_authentication() {
        let gateway = Arc::new(InMemoryGateway::new());
        let err = ConversationInbox::open(gateway, None).await.unwrap_err();
        assert!(matches!(err, ChatError::NotAuthenticated));
    }

    #[tokio::test]
    async fn test_inbox_refreshes_on_activity() {
        let gateway = Arc::new(InMemoryGateway::new());
        let me = LocalUser::new(Uuid::new_v4(), "Sam");
        let dana = Uuid::new_v4();
        gateway.upsert_profile(Profile::new(dana, "Dana")).await;

        let mut inbox = ConversationInbox::open(gateway.clone(), Some(me.clone()))
            .await
            .unwrap();
        assert!(inbox.summaries().is_empty());

        let conv = gateway.create_conversation(me.id, dana, None).await.unwrap();
        gateway.insert_message(conv.id, dana, "hi Sam").await.unwrap();

        assert!(inbox.recv_update().await.unwrap());
        // Drain whatever else arrived before asserting
        inbox.poll_updates().await.unwrap();

        let summaries = inbox.summaries();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].counterparty_name, "Dana");
        assert_eq!(summaries[0].last_message_preview, "hi Sam");
        assert_eq!(summaries[0].unread_count, 1);
    }

    #[tokio::test]
    async fn test_closed_inbox_stops_updating() {
        let gateway = Arc::new(InMemoryGateway::new());
        let me = LocalUser::new(Uuid::new_v4(), "Sam");

        let mut inbox = ConversationInbox::open(gateway.clone(), Some(me.clone()))
            .await
            .unwrap();
        inbox.close();

        gateway
            .create_conversation(me.id, Uuid::new_v4(), None)
            .await
            .unwrap();
        assert!(!inbox.recv_update().await.unwrap());
    }
}
