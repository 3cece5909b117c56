//! Notification Gate
//!
//! Decides, on the sender's device right after a successful send, whether
//! the recipient should get a push. A recipient whose presence marker
//! names the same conversation is already looking at the thread, so the
//! push is suppressed. Delivery is best-effort throughout: no failure
//! here ever reaches the send path.
//!
//! The recipient's own session independently schedules a local
//! notification when a message arrives while its process is backgrounded
//! (see [`LocalNotifier`]). The two paths are not deduplicated against
//! each other, so a backgrounded recipient can be notified twice.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use crate::gateway::RemoteGateway;

/// Recipient-side sink for locally scheduled notifications, provided by
/// the embedding UI (the OS notification center, in practice).
#[async_trait]
pub trait LocalNotifier: Send + Sync {
    /// Show a notification for a message received in the background
    async fn schedule(&self, sender_name: &str, body: &str, conversation_id: Uuid);
}

/// What the gate decided for one outgoing message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushDecision {
    /// Recipient is viewing the conversation; no push needed
    Suppressed,
    /// Push handed to the gateway for delivery
    Dispatched,
    /// Recipient has no registered push token
    NoToken,
    /// A gateway call failed; logged and ignored
    Failed,
}

/// Sender-side push gate over the recipient's presence marker
pub struct NotificationGate<G> {
    gateway: Arc<G>,
}

impl<G: RemoteGateway> NotificationGate<G> {
    /// Create a gate over the given gateway
    pub fn new(gateway: Arc<G>) -> Self {
        Self { gateway }
    }

    /// Decide and, when warranted, dispatch a push for a message just
    /// sent to `recipient_id` in `conversation_id`
    pub async fn notify_recipient(
        &self,
        conversation_id: Uuid,
        recipient_id: Uuid,
        sender_name: &str,
        text: &str,
    ) -> PushDecision {
        let profile = match self.gateway.get_profile(recipient_id).await {
            Ok(profile) => profile,
            Err(err) => {
                tracing::warn!("presence lookup failed for {}: {}", recipient_id, err);
                return PushDecision::Failed;
            }
        };

        if profile.is_viewing(conversation_id) {
            tracing::debug!(
                "recipient {} is viewing {}, push suppressed",
                recipient_id,
                conversation_id
            );
            return PushDecision::Suppressed;
        }

        let token = match self.gateway.get_push_token(recipient_id).await {
            Ok(Some(token)) => token,
            Ok(None) => return PushDecision::NoToken,
            Err(err) => {
                tracing::warn!("push token lookup failed for {}: {}", recipient_id, err);
                return PushDecision::Failed;
            }
        };

        let title = format!("{} texted you", sender_name);
        let data = json!({
            "type": "message",
            "conversation_id": conversation_id,
            "sender_name": sender_name,
        });
        match self.gateway.send_push(&token, &title, text, data).await {
            Ok(()) => PushDecision::Dispatched,
            Err(err) => {
                tracing::warn!("push dispatch failed: {}", err);
                PushDecision::Failed
            }
        }
    }
}
