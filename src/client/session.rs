//! Conversation Session
//!
//! Represents one open chat thread and mediates between the embedding
//! event loop, the remote gateway, and the message reconciler. A session
//! loads history, tracks presence, sends with optimistic inserts under a
//! single-flight guard, and drains the real-time channel.
//!
//! All mutation happens from the embedding loop that owns the session;
//! incoming records are pulled with [`poll_incoming`](ConversationSession::poll_incoming)
//! or [`recv_incoming`](ConversationSession::recv_incoming) rather than
//! pushed from a background task, so the working set needs no locking.

use std::sync::Arc;

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::client::notify::{LocalNotifier, NotificationGate};
use crate::client::reconciler::{MergeOutcome, MessageReconciler};
use crate::gateway::{RemoteGateway, Subscription};
use crate::shared::error::ChatError;
use crate::shared::messaging::{
    ChatMessage, Conversation, MessageRecord, Profile, MAX_MESSAGE_LEN,
};

const CHANGE_CHANNEL_CAPACITY: usize = 64;
const FALLBACK_NAME: &str = "Someone";

/// The authenticated local user, as established by the auth layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalUser {
    /// User id
    pub id: Uuid,
    /// Name shown to recipients in notifications
    pub display_name: String,
}

impl LocalUser {
    /// Create a local user handle
    pub fn new(id: Uuid, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
        }
    }
}

/// How to resolve the conversation when opening a session
#[derive(Debug, Clone)]
pub enum OpenTarget {
    /// Open a known conversation by id
    Existing(Uuid),
    /// Find or create the conversation with a counterparty, optionally
    /// scoped to a listing
    Participant {
        /// The other participant
        counterparty_id: Uuid,
        /// The listing the conversation is about, if any
        listing_id: Option<Uuid>,
    },
}

/// Change notifications emitted by a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The message sequence changed; re-read `messages()`
    MessagesChanged,
}

/// Result of a send attempt
#[derive(Debug, Clone, PartialEq)]
pub struct SendOutcome {
    /// Whether the message was accepted and confirmed by the gateway
    pub accepted: bool,
    /// The confirmed message on success
    pub message: Option<ChatMessage>,
    /// The original text, returned on gateway failure so the caller can
    /// restore it for a manual retry
    pub restored_text: Option<String>,
    /// The gateway error on failure
    pub error: Option<ChatError>,
}

impl SendOutcome {
    fn rejected() -> Self {
        Self {
            accepted: false,
            message: None,
            restored_text: None,
            error: None,
        }
    }

    fn delivered(message: ChatMessage) -> Self {
        Self {
            accepted: true,
            message: Some(message),
            restored_text: None,
            error: None,
        }
    }

    fn failed(restored_text: String, error: ChatError) -> Self {
        Self {
            accepted: false,
            message: None,
            restored_text: Some(restored_text),
            error: Some(error),
        }
    }
}

/// One open chat thread
pub struct ConversationSession<G: RemoteGateway> {
    gateway: Arc<G>,
    local_user: LocalUser,
    conversation: Conversation,
    counterparty: Profile,
    reconciler: MessageReconciler,
    gate: NotificationGate<G>,
    local_notifier: Option<Arc<dyn LocalNotifier>>,
    incoming: Option<Subscription<MessageRecord>>,
    changes: broadcast::Sender<SessionEvent>,
    sending: bool,
    foreground: bool,
    closed: bool,
}

impl<G: RemoteGateway> ConversationSession<G> {
    /// Open a session for the local user.
    ///
    /// An explicit conversation id must resolve (`NotFound` otherwise);
    /// a participant target finds or creates the conversation, treating
    /// a uniqueness conflict from concurrent creation as "already
    /// exists, re-fetch". Fails with `NotAuthenticated` when no local
    /// user session exists. Opening subscribes the real-time channel and
    /// marks the user present in the conversation.
    pub async fn open(
        gateway: Arc<G>,
        local_user: Option<LocalUser>,
        target: OpenTarget,
    ) -> Result<Self, ChatError> {
        let local_user = local_user.ok_or(ChatError::NotAuthenticated)?;

        let conversation = match target {
            OpenTarget::Existing(id) => gateway
                .get_conversation(id)
                .await?
                .ok_or_else(|| ChatError::not_found("conversation"))?,
            OpenTarget::Participant {
                counterparty_id,
                listing_id,
            } => {
                Self::find_or_create(&gateway, local_user.id, counterparty_id, listing_id).await?
            }
        };

        let counterparty_id = conversation.counterparty_of(local_user.id);
        let counterparty = match gateway.get_profile(counterparty_id).await {
            Ok(profile) => profile,
            Err(err) => {
                tracing::warn!("counterparty profile lookup failed: {}", err);
                Profile::new(counterparty_id, FALLBACK_NAME)
            }
        };

        let incoming = gateway.subscribe_messages(conversation.id).await?;

        if let Err(err) = gateway
            .set_active_conversation(local_user.id, conversation.id)
            .await
        {
            tracing::warn!("presence update failed: {}", err);
        }

        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let gate = NotificationGate::new(gateway.clone());

        tracing::info!(
            "opened conversation {} with {}",
            conversation.id,
            counterparty_id
        );
        Ok(Self {
            gateway,
            local_user,
            conversation,
            counterparty,
            reconciler: MessageReconciler::new(),
            gate,
            local_notifier: None,
            incoming: Some(incoming),
            changes,
            sending: false,
            foreground: true,
            closed: false,
        })
    }

    async fn find_or_create(
        gateway: &Arc<G>,
        local_id: Uuid,
        counterparty_id: Uuid,
        listing_id: Option<Uuid>,
    ) -> Result<Conversation, ChatError> {
        if let Some(existing) = gateway
            .find_conversation(local_id, counterparty_id, listing_id)
            .await?
        {
            return Ok(existing);
        }
        match gateway
            .create_conversation(local_id, counterparty_id, listing_id)
            .await
        {
            Ok(created) => Ok(created),
            Err(err) if err.is_conflict() => {
                // A concurrent opener won the race; the conversation exists now
                gateway
                    .find_conversation(local_id, counterparty_id, listing_id)
                    .await?
                    .ok_or_else(|| ChatError::not_found("conversation"))
            }
            Err(err) => Err(err),
        }
    }

    /// Attach the sink used for background local notifications
    pub fn with_local_notifier(mut self, notifier: Arc<dyn LocalNotifier>) -> Self {
        self.local_notifier = Some(notifier);
        self
    }

    /// Fetch the full message history and mark the counterparty's
    /// messages as read. Read-marking is best-effort.
    pub async fn load_history(&mut self) -> Result<(), ChatError> {
        let records = self.gateway.list_messages(self.conversation.id).await?;
        self.reconciler.reset(records);
        self.notify_changed();

        if let Err(err) = self
            .gateway
            .mark_read(self.conversation.id, self.local_user.id)
            .await
        {
            tracing::warn!("mark read failed: {}", err);
        }
        Ok(())
    }

    /// Send a message.
    ///
    /// Rejected without side effects when the text trims to empty or
    /// over the length bound, the session is closed, or a send is
    /// already in flight (single-flight per session). Otherwise an
    /// optimistic entry appears immediately; on gateway failure it is
    /// rolled back and the original text comes back in the outcome for
    /// a manual retry. There is no automatic retry.
    pub async fn send(&mut self, text: &str) -> SendOutcome {
        let trimmed = text.trim();
        if self.closed || self.sending || trimmed.is_empty() {
            tracing::debug!("send rejected (closed/in-flight/empty)");
            return SendOutcome::rejected();
        }
        if trimmed.chars().count() > MAX_MESSAGE_LEN {
            tracing::debug!("send rejected (over length bound)");
            return SendOutcome::rejected();
        }

        self.sending = true;
        let optimistic =
            ChatMessage::optimistic(self.conversation.id, self.local_user.id, trimmed);
        let local_id = optimistic.id;
        self.reconciler.insert_optimistic(optimistic);
        self.notify_changed();

        let outcome = match self
            .gateway
            .insert_message(self.conversation.id, self.local_user.id, trimmed)
            .await
        {
            Ok(record) => {
                self.conversation.updated_at = record.created_at;
                self.reconciler.confirm(&local_id, record.clone());
                self.notify_changed();

                let sender_name = if self.local_user.display_name.is_empty() {
                    FALLBACK_NAME
                } else {
                    self.local_user.display_name.as_str()
                };
                self.gate
                    .notify_recipient(
                        self.conversation.id,
                        self.counterparty.id,
                        sender_name,
                        trimmed,
                    )
                    .await;

                SendOutcome::delivered(ChatMessage::from_record(record))
            }
            Err(err) => {
                tracing::warn!("send failed, rolling back: {}", err);
                self.reconciler.rollback(&local_id);
                self.notify_changed();
                SendOutcome::failed(trimmed.to_string(), err)
            }
        };
        self.sending = false;
        outcome
    }

    /// Drain every buffered real-time record, merging each into the
    /// working set. Returns how many records were new.
    pub async fn poll_incoming(&mut self) -> usize {
        let mut drained = Vec::new();
        if let Some(subscription) = self.incoming.as_mut() {
            while let Some(record) = subscription.try_recv() {
                drained.push(record);
            }
        }

        let mut merged = 0;
        for record in drained {
            if self.process_incoming(record).await {
                merged += 1;
            }
        }
        merged
    }

    /// Wait for the next real-time record and merge it. Returns `false`
    /// once the channel has closed.
    pub async fn recv_incoming(&mut self) -> bool {
        let record = match self.incoming.as_mut() {
            Some(subscription) => subscription.recv().await,
            None => None,
        };
        match record {
            Some(record) => {
                self.process_incoming(record).await;
                true
            }
            None => false,
        }
    }

    async fn process_incoming(&mut self, record: MessageRecord) -> bool {
        let sender_id = record.sender_id;
        let content = record.content.clone();

        match self.reconciler.merge_incoming(record) {
            MergeOutcome::Duplicate => return false,
            _ => self.notify_changed(),
        }

        if sender_id != self.local_user.id {
            if let Err(err) = self
                .gateway
                .mark_read(self.conversation.id, self.local_user.id)
                .await
            {
                tracing::warn!("mark read failed: {}", err);
            }

            if !self.foreground {
                if let Some(notifier) = self.local_notifier.clone() {
                    let sender_name = if self.counterparty.display_name.is_empty() {
                        FALLBACK_NAME
                    } else {
                        self.counterparty.display_name.as_str()
                    };
                    notifier
                        .schedule(sender_name, &content, self.conversation.id)
                        .await;
                }
            }
        }
        true
    }

    /// Write or clear the presence marker for this conversation.
    /// Best-effort: failures are logged, never surfaced.
    pub async fn set_presence(&self, active: bool) {
        let result = if active {
            self.gateway
                .set_active_conversation(self.local_user.id, self.conversation.id)
                .await
        } else {
            self.gateway
                .clear_active_conversation(self.local_user.id)
                .await
        };
        if let Err(err) = result {
            tracing::warn!("presence update failed: {}", err);
        }
    }

    /// Track whether the embedding process is foregrounded. Background
    /// sessions schedule local notifications for incoming messages.
    pub fn set_foreground(&mut self, foreground: bool) {
        self.foreground = foreground;
    }

    /// Release the real-time subscription and clear presence
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(subscription) = self.incoming.take() {
            subscription.unsubscribe();
        }
        self.set_presence(false).await;
        tracing::info!("closed conversation {}", self.conversation.id);
    }

    /// The conversation this session is for
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// The other participant's profile
    pub fn counterparty(&self) -> &Profile {
        &self.counterparty
    }

    /// The current ordered message sequence
    pub fn messages(&self) -> &[ChatMessage] {
        self.reconciler.messages()
    }

    /// Whether a send is currently in flight
    pub fn is_sending(&self) -> bool {
        self.sending
    }

    /// Subscribe to change notifications
    pub fn subscribe_changes(&self) -> broadcast::Receiver<SessionEvent> {
        self.changes.subscribe()
    }

    fn notify_changed(&self) {
        // A send error just means nobody is listening right now
        let _ = self.changes.send(SessionEvent::MessagesChanged);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::InMemoryGateway;
    use crate::shared::messaging::{DeliveryState, MessageId};
    use assert_matches::assert_matches;

    async fn open_pair() -> (Arc<InMemoryGateway>, ConversationSession<InMemoryGateway>, Uuid) {
        let gateway = Arc::new(InMemoryGateway::new());
        let me = LocalUser::new(Uuid::new_v4(), "Sam");
        let other = Uuid::new_v4();
        gateway.upsert_profile(Profile::new(me.id, "Sam")).await;
        gateway.upsert_profile(Profile::new(other, "Dana")).await;

        let session = ConversationSession::open(
            gateway.clone(),
            Some(me),
            OpenTarget::Participant {
                counterparty_id: other,
                listing_id: None,
            },
        )
        .await
        .unwrap();
        (gateway, session, other)
    }

    #[tokio::test]
    async fn test_open_requires_authentication() {
        let gateway = Arc::new(InMemoryGateway::new());
        let err = ConversationSession::open(
            gateway,
            None,
            OpenTarget::Existing(Uuid::new_v4()),
        )
        .await
        .unwrap_err();
        assert_matches!(err, ChatError::NotAuthenticated);
    }

    #[tokio::test]
    async fn test_open_unknown_conversation_is_not_found() {
        let gateway = Arc::new(InMemoryGateway::new());
        let me = LocalUser::new(Uuid::new_v4(), "Sam");
        gateway.upsert_profile(Profile::new(me.id, "Sam")).await;

        let err = ConversationSession::open(
            gateway,
            Some(me),
            OpenTarget::Existing(Uuid::new_v4()),
        )
        .await
        .unwrap_err();
        assert_matches!(err, ChatError::NotFound { entity: "conversation" });
    }

    #[tokio::test]
    async fn test_open_reuses_existing_conversation() {
        let gateway = Arc::new(InMemoryGateway::new());
        let me = LocalUser::new(Uuid::new_v4(), "Sam");
        let other = Uuid::new_v4();
        gateway.upsert_profile(Profile::new(other, "Dana")).await;
        let existing = gateway
            .create_conversation(other, me.id, None)
            .await
            .unwrap();

        let session = ConversationSession::open(
            gateway,
            Some(me),
            OpenTarget::Participant {
                counterparty_id: other,
                listing_id: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(session.conversation().id, existing.id);
        assert_eq!(session.counterparty().display_name, "Dana");
    }

    #[tokio::test]
    async fn test_open_sets_presence() {
        let (gateway, session, _) = open_pair().await;
        let me = session.local_user.id;
        let profile = gateway.get_profile(me).await.unwrap();
        assert!(profile.is_viewing(session.conversation().id));
    }

    #[tokio::test]
    async fn test_send_success_confirms_optimistic_entry() {
        let (_, mut session, _) = open_pair().await;

        let outcome = session.send("hello").await;
        assert!(outcome.accepted);
        assert!(outcome.error.is_none());

        assert_eq!(session.messages().len(), 1);
        let message = &session.messages()[0];
        assert_eq!(message.content, "hello");
        assert_eq!(message.state, DeliveryState::Confirmed);
        assert_matches!(message.id, MessageId::Server(_));
    }

    #[tokio::test]
    async fn test_send_failure_rolls_back_and_restores_text() {
        let (gateway, mut session, _) = open_pair().await;

        gateway.fail_next_insert();
        let outcome = session.send("hi").await;

        assert!(!outcome.accepted);
        assert_eq!(outcome.restored_text.as_deref(), Some("hi"));
        assert_matches!(outcome.error, Some(ChatError::RemoteWriteFailed { .. }));
        assert!(session.messages().is_empty());
        assert!(!session.is_sending());
    }

    #[tokio::test]
    async fn test_send_guards() {
        let (_, mut session, _) = open_pair().await;

        let outcome = session.send("   ").await;
        assert!(!outcome.accepted);
        assert!(outcome.restored_text.is_none());
        assert!(session.messages().is_empty());

        let outcome = session.send(&"x".repeat(MAX_MESSAGE_LEN + 1)).await;
        assert!(!outcome.accepted);
        assert!(session.messages().is_empty());
    }

    #[tokio::test]
    async fn test_single_flight_rejects_second_send() {
        let (_, mut session, _) = open_pair().await;

        // A send is in flight from the UI's perspective
        session.sending = true;
        let outcome = session.send("second").await;
        assert!(!outcome.accepted);
        assert!(outcome.restored_text.is_none());
        assert!(session.messages().is_empty());

        // The in-flight send proceeds unaffected once released
        session.sending = false;
        let outcome = session.send("second").await;
        assert!(outcome.accepted);
    }

    #[tokio::test]
    async fn test_send_after_close_is_rejected() {
        let (_, mut session, _) = open_pair().await;
        session.close().await;

        let outcome = session.send("hello").await;
        assert!(!outcome.accepted);
        assert!(session.messages().is_empty());
    }

    #[tokio::test]
    async fn test_incoming_message_merges_and_marks_read() {
        let (gateway, mut session, other) = open_pair().await;
        let conv = session.conversation().id;

        gateway.insert_message(conv, other, "hey there").await.unwrap();
        assert!(session.recv_incoming().await);

        assert_eq!(session.messages().len(), 1);
        assert_eq!(session.messages()[0].content, "hey there");

        // Read-marking happened on our behalf
        let records = gateway.list_messages(conv).await.unwrap();
        assert!(records[0].read_at.is_some());
    }

    #[tokio::test]
    async fn test_own_realtime_echo_is_not_duplicated() {
        let (_, mut session, _) = open_pair().await;

        let outcome = session.send("hello").await;
        assert!(outcome.accepted);

        // The realtime echo of our own send arrives afterwards
        assert!(session.recv_incoming().await);
        assert_eq!(session.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_load_history_marks_read() {
        let (gateway, mut session, other) = open_pair().await;
        let conv = session.conversation().id;
        gateway.insert_message(conv, other, "one").await.unwrap();
        gateway.insert_message(conv, other, "two").await.unwrap();

        session.load_history().await.unwrap();
        assert_eq!(session.messages().len(), 2);
        assert_eq!(session.messages()[0].content, "one");

        let records = gateway.list_messages(conv).await.unwrap();
        assert!(records.iter().all(|r| r.read_at.is_some()));
    }

    #[tokio::test]
    async fn test_close_clears_presence() {
        let (gateway, mut session, _) = open_pair().await;
        let me = session.local_user.id;

        session.close().await;
        let profile = gateway.get_profile(me).await.unwrap();
        assert!(profile.active_conversation_id.is_none());
    }

    #[tokio::test]
    async fn test_change_events_are_emitted() {
        let (_, mut session, _) = open_pair().await;
        let mut changes = session.subscribe_changes();

        session.send("hello").await;
        assert_eq!(changes.recv().await.unwrap(), SessionEvent::MessagesChanged);
    }
}
