//! Common test utilities and helpers
//!
//! Shared fixtures for the integration tests: a seeded in-memory gateway
//! and a local-notification sink that records instead of displaying.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use marketchat::client::{LocalNotifier, LocalUser};
use marketchat::gateway::InMemoryGateway;
use marketchat::shared::messaging::Profile;

/// Install a test subscriber once so `RUST_LOG` surfaces client logs
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A recorded local notification: sender name, body, conversation id
pub type Notification = (String, String, Uuid);

/// Local-notification sink that records what would have been shown
#[derive(Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn recorded(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }
}

#[async_trait]
impl LocalNotifier for RecordingNotifier {
    async fn schedule(&self, sender_name: &str, body: &str, conversation_id: Uuid) {
        self.notifications.lock().unwrap().push((
            sender_name.to_string(),
            body.to_string(),
            conversation_id,
        ));
    }
}

/// A gateway seeded with two users, the second carrying a push token
pub async fn seeded_gateway() -> (Arc<InMemoryGateway>, LocalUser, LocalUser) {
    init_tracing();
    let gateway = Arc::new(InMemoryGateway::new());
    let sam = LocalUser::new(Uuid::new_v4(), "Sam");
    let dana = LocalUser::new(Uuid::new_v4(), "Dana");

    gateway.upsert_profile(Profile::new(sam.id, "Sam")).await;
    let mut dana_profile = Profile::new(dana.id, "Dana");
    dana_profile.push_token = Some("dana-device-token".to_string());
    gateway.upsert_profile(dana_profile).await;

    (gateway, sam, dana)
}
