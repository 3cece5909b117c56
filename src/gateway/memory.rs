//! In-Memory Gateway
//!
//! An in-process implementation of the [`RemoteGateway`] contract backed
//! by maps under an async lock and a `tokio::sync::broadcast` channel for
//! real-time fan-out. Used by the test suite and for local development
//! against no backend.
//!
//! Dispatched push messages are recorded rather than delivered, so tests
//! can assert on the Notification Gate's decisions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use uuid::Uuid;

use super::{RemoteGateway, Subscription};
use crate::shared::error::ChatError;
use crate::shared::event::RealtimeEvent;
use crate::shared::messaging::{
    Conversation, ConversationSummary, MessageRecord, Profile, PREVIEW_LEN,
};

const EVENT_CHANNEL_CAPACITY: usize = 256;
const SUBSCRIPTION_BUFFER: usize = 64;

/// A push message recorded instead of delivered
#[derive(Debug, Clone, PartialEq)]
pub struct PushRecord {
    /// Device token the push was addressed to
    pub token: String,
    /// Notification title
    pub title: String,
    /// Notification body
    pub body: String,
    /// Structured payload
    pub data: serde_json::Value,
}

#[derive(Default)]
struct Store {
    conversations: HashMap<Uuid, Conversation>,
    messages: HashMap<Uuid, Vec<MessageRecord>>,
    profiles: HashMap<Uuid, Profile>,
}

/// In-process gateway for tests and local development
pub struct InMemoryGateway {
    store: RwLock<Store>,
    events: broadcast::Sender<RealtimeEvent>,
    pushes: Mutex<Vec<PushRecord>>,
    fail_next_insert: AtomicBool,
}

impl InMemoryGateway {
    /// Create an empty gateway
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store: RwLock::new(Store::default()),
            events,
            pushes: Mutex::new(Vec::new()),
            fail_next_insert: AtomicBool::new(false),
        }
    }

    /// Insert or replace a profile
    pub async fn upsert_profile(&self, profile: Profile) {
        let mut store = self.store.write().await;
        store.profiles.insert(profile.id, profile);
    }

    /// All push messages dispatched so far
    pub async fn sent_pushes(&self) -> Vec<PushRecord> {
        self.pushes.lock().await.clone()
    }

    /// Make the next `insert_message` call fail with a write error
    pub fn fail_next_insert(&self) {
        self.fail_next_insert.store(true, Ordering::SeqCst);
    }

    fn broadcast(&self, event: RealtimeEvent) {
        // A send error just means nobody is subscribed right now
        if let Err(err) = self.events.send(event) {
            tracing::debug!("no realtime subscribers: {:?}", err.0.event_type);
        }
    }

    fn summary_for(store: &Store, conversation: &Conversation, user_id: Uuid) -> ConversationSummary {
        let counterparty = conversation.counterparty_of(user_id);
        let counterparty_name = store
            .profiles
            .get(&counterparty)
            .map(|p| p.display_name.clone())
            .unwrap_or_else(|| "Someone".to_string());

        let records = store.messages.get(&conversation.id);
        let last = records.and_then(|msgs| msgs.last());
        let unread_count = records
            .map(|msgs| {
                msgs.iter()
                    .filter(|m| m.sender_id != user_id && m.read_at.is_none())
                    .count() as u32
            })
            .unwrap_or(0);

        ConversationSummary {
            conversation: conversation.clone(),
            counterparty_name,
            last_message_preview: last.map(|m| m.preview(PREVIEW_LEN)).unwrap_or_default(),
            last_message_at: last.map(|m| m.created_at),
            unread_count,
        }
    }
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteGateway for InMemoryGateway {
    async fn find_conversation(
        &self,
        participant_a: Uuid,
        participant_b: Uuid,
        listing_id: Option<Uuid>,
    ) -> Result<Option<Conversation>, ChatError> {
        let store = self.store.read().await;
        Ok(store
            .conversations
            .values()
            .find(|c| c.involves_pair(participant_a, participant_b) && c.listing_id == listing_id)
            .cloned())
    }

    async fn create_conversation(
        &self,
        buyer_id: Uuid,
        seller_id: Uuid,
        listing_id: Option<Uuid>,
    ) -> Result<Conversation, ChatError> {
        let conversation = {
            let mut store = self.store.write().await;
            let exists = store
                .conversations
                .values()
                .any(|c| c.involves_pair(buyer_id, seller_id) && c.listing_id == listing_id);
            if exists {
                return Err(ChatError::conflict("conversation exists for participant pair"));
            }

            let now = Utc::now();
            let conversation = Conversation {
                id: Uuid::new_v4(),
                buyer_id,
                seller_id,
                listing_id,
                created_at: now,
                updated_at: now,
            };
            store.conversations.insert(conversation.id, conversation.clone());
            conversation
        };

        self.broadcast(RealtimeEvent::conversation(&conversation));
        Ok(conversation)
    }

    async fn get_conversation(&self, conversation_id: Uuid) -> Result<Option<Conversation>, ChatError> {
        let store = self.store.read().await;
        Ok(store.conversations.get(&conversation_id).cloned())
    }

    async fn insert_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: &str,
    ) -> Result<MessageRecord, ChatError> {
        if self.fail_next_insert.swap(false, Ordering::SeqCst) {
            return Err(ChatError::write("injected insert failure"));
        }

        let (record, conversation) = {
            let mut store = self.store.write().await;
            let conversation = store
                .conversations
                .get_mut(&conversation_id)
                .ok_or_else(|| ChatError::not_found("conversation"))?;

            let record = MessageRecord {
                id: Uuid::new_v4(),
                conversation_id,
                sender_id,
                content: content.to_string(),
                created_at: Utc::now(),
                read_at: None,
            };
            conversation.updated_at = record.created_at;
            let conversation = conversation.clone();
            store.messages.entry(conversation_id).or_default().push(record.clone());
            (record, conversation)
        };

        self.broadcast(RealtimeEvent::message(&record));
        self.broadcast(RealtimeEvent::conversation(&conversation));
        Ok(record)
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<MessageRecord>, ChatError> {
        let store = self.store.read().await;
        Ok(store.messages.get(&conversation_id).cloned().unwrap_or_default())
    }

    async fn mark_read(&self, conversation_id: Uuid, reader_id: Uuid) -> Result<(), ChatError> {
        let mut store = self.store.write().await;
        let now = Utc::now();
        if let Some(records) = store.messages.get_mut(&conversation_id) {
            for record in records.iter_mut() {
                if record.sender_id != reader_id && record.read_at.is_none() {
                    record.read_at = Some(now);
                }
            }
        }
        Ok(())
    }

    async fn list_conversation_summaries(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<ConversationSummary>, ChatError> {
        let store = self.store.read().await;
        let mut summaries: Vec<ConversationSummary> = store
            .conversations
            .values()
            .filter(|c| c.has_participant(user_id))
            .map(|c| Self::summary_for(&store, c, user_id))
            .collect();
        summaries.sort_by(|a, b| b.conversation.updated_at.cmp(&a.conversation.updated_at));
        Ok(summaries)
    }

    async fn subscribe_messages(
        &self,
        conversation_id: Uuid,
    ) -> Result<Subscription<MessageRecord>, ChatError> {
        let mut events = self.events.subscribe();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);

        let forwarder = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if let Some(record) = event.as_message() {
                            if record.conversation_id == conversation_id
                                && tx.send(record).await.is_err()
                            {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("message subscriber lagged, skipped {} events", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(Subscription::new(rx, forwarder))
    }

    async fn subscribe_conversations(
        &self,
        user_id: Uuid,
    ) -> Result<Subscription<Conversation>, ChatError> {
        let mut events = self.events.subscribe();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);

        let forwarder = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if let Some(conversation) = event.as_conversation() {
                            if conversation.has_participant(user_id)
                                && tx.send(conversation).await.is_err()
                            {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("conversation subscriber lagged, skipped {} events", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(Subscription::new(rx, forwarder))
    }

    async fn get_profile(&self, user_id: Uuid) -> Result<Profile, ChatError> {
        let store = self.store.read().await;
        store
            .profiles
            .get(&user_id)
            .cloned()
            .ok_or_else(|| ChatError::not_found("profile"))
    }

    async fn get_push_token(&self, user_id: Uuid) -> Result<Option<String>, ChatError> {
        let store = self.store.read().await;
        store
            .profiles
            .get(&user_id)
            .map(|p| p.push_token.clone())
            .ok_or_else(|| ChatError::not_found("profile"))
    }

    async fn save_push_token(&self, user_id: Uuid, token: &str) -> Result<(), ChatError> {
        let mut store = self.store.write().await;
        let profile = store
            .profiles
            .get_mut(&user_id)
            .ok_or_else(|| ChatError::not_found("profile"))?;
        profile.push_token = Some(token.to_string());
        Ok(())
    }

    async fn send_push(
        &self,
        token: &str,
        title: &str,
        body: &str,
        data: serde_json::Value,
    ) -> Result<(), ChatError> {
        tracing::debug!("recording push to {}: {}", token, title);
        self.pushes.lock().await.push(PushRecord {
            token: token.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            data,
        });
        Ok(())
    }

    async fn set_active_conversation(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<(), ChatError> {
        let mut store = self.store.write().await;
        let profile = store
            .profiles
            .get_mut(&user_id)
            .ok_or_else(|| ChatError::not_found("profile"))?;
        profile.active_conversation_id = Some(conversation_id);
        Ok(())
    }

    async fn clear_active_conversation(&self, user_id: Uuid) -> Result<(), ChatError> {
        let mut store = self.store.write().await;
        let profile = store
            .profiles
            .get_mut(&user_id)
            .ok_or_else(|| ChatError::not_found("profile"))?;
        profile.active_conversation_id = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_conversation_enforces_uniqueness() {
        let gateway = InMemoryGateway::new();
        let (buyer, seller) = (Uuid::new_v4(), Uuid::new_v4());

        gateway.create_conversation(buyer, seller, None).await.unwrap();
        let err = gateway
            .create_conversation(seller, buyer, None)
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        // A different listing is a different conversation key
        gateway
            .create_conversation(buyer, seller, Some(Uuid::new_v4()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_find_conversation_is_unordered() {
        let gateway = InMemoryGateway::new();
        let (buyer, seller) = (Uuid::new_v4(), Uuid::new_v4());
        let created = gateway.create_conversation(buyer, seller, None).await.unwrap();

        let found = gateway
            .find_conversation(seller, buyer, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, created.id);
    }

    #[tokio::test]
    async fn test_insert_message_bumps_activity_and_broadcasts() {
        let gateway = InMemoryGateway::new();
        let (buyer, seller) = (Uuid::new_v4(), Uuid::new_v4());
        let conv = gateway.create_conversation(buyer, seller, None).await.unwrap();

        let mut sub = gateway.subscribe_messages(conv.id).await.unwrap();
        let record = gateway.insert_message(conv.id, buyer, "hello").await.unwrap();

        let delivered = sub.recv().await.unwrap();
        assert_eq!(delivered, record);

        let stored = gateway.get_conversation(conv.id).await.unwrap().unwrap();
        assert_eq!(stored.updated_at, record.created_at);
    }

    #[tokio::test]
    async fn test_subscription_filters_other_conversations() {
        let gateway = InMemoryGateway::new();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let watched = gateway.create_conversation(a, b, None).await.unwrap();
        let other = gateway.create_conversation(a, c, None).await.unwrap();

        let mut sub = gateway.subscribe_messages(watched.id).await.unwrap();
        gateway.insert_message(other.id, a, "elsewhere").await.unwrap();
        gateway.insert_message(watched.id, b, "here").await.unwrap();

        let delivered = sub.recv().await.unwrap();
        assert_eq!(delivered.content, "here");
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_mark_read_skips_own_messages() {
        let gateway = InMemoryGateway::new();
        let (buyer, seller) = (Uuid::new_v4(), Uuid::new_v4());
        let conv = gateway.create_conversation(buyer, seller, None).await.unwrap();

        gateway.insert_message(conv.id, buyer, "mine").await.unwrap();
        gateway.insert_message(conv.id, seller, "theirs").await.unwrap();
        gateway.mark_read(conv.id, buyer).await.unwrap();

        let messages = gateway.list_messages(conv.id).await.unwrap();
        let mine = messages.iter().find(|m| m.sender_id == buyer).unwrap();
        let theirs = messages.iter().find(|m| m.sender_id == seller).unwrap();
        assert!(mine.read_at.is_none());
        assert!(theirs.read_at.is_some());
    }

    #[tokio::test]
    async fn test_summaries_order_and_unread() {
        let gateway = InMemoryGateway::new();
        let (me, dana, eli) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        gateway.upsert_profile(Profile::new(dana, "Dana")).await;
        gateway.upsert_profile(Profile::new(eli, "Eli")).await;

        let with_dana = gateway.create_conversation(me, dana, None).await.unwrap();
        let with_eli = gateway.create_conversation(me, eli, None).await.unwrap();

        gateway.insert_message(with_dana.id, dana, "hi there").await.unwrap();
        gateway.insert_message(with_eli.id, eli, "newer").await.unwrap();

        let summaries = gateway.list_conversation_summaries(me).await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].counterparty_name, "Eli");
        assert_eq!(summaries[0].last_message_preview, "newer");
        assert_eq!(summaries[0].unread_count, 1);
        assert_eq!(summaries[1].counterparty_name, "Dana");
    }

    #[tokio::test]
    async fn test_presence_transitions() {
        let gateway = InMemoryGateway::new();
        let user = Uuid::new_v4();
        gateway.upsert_profile(Profile::new(user, "Dana")).await;
        let conv = Uuid::new_v4();

        gateway.set_active_conversation(user, conv).await.unwrap();
        assert!(gateway.get_profile(user).await.unwrap().is_viewing(conv));

        gateway.clear_active_conversation(user).await.unwrap();
        assert!(gateway
            .get_profile(user)
            .await
            .unwrap()
            .active_conversation_id
            .is_none());
    }

    #[tokio::test]
    async fn test_push_token_registration() {
        let gateway = InMemoryGateway::new();
        let user = Uuid::new_v4();
        gateway.upsert_profile(Profile::new(user, "Dana")).await;

        assert_eq!(gateway.get_push_token(user).await.unwrap(), None);
        gateway.save_push_token(user, "tok-42").await.unwrap();
        assert_eq!(
            gateway.get_push_token(user).await.unwrap(),
            Some("tok-42".to_string())
        );
    }

    #[tokio::test]
    async fn test_injected_insert_failure() {
        let gateway = InMemoryGateway::new();
        let (buyer, seller) = (Uuid::new_v4(), Uuid::new_v4());
        let conv = gateway.create_conversation(buyer, seller, None).await.unwrap();

        gateway.fail_next_insert();
        let err = gateway.insert_message(conv.id, buyer, "hi").await.unwrap_err();
        assert!(matches!(err, ChatError::RemoteWriteFailed { .. }));

        // Only the next insert fails
        gateway.insert_message(conv.id, buyer, "hi").await.unwrap();
    }
}
