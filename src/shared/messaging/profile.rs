//! User Profile Data Structure
//!
//! The slice of a user's profile the chat client cares about: display
//! name, registered push token, and the advisory presence marker naming
//! the conversation the user currently has open (if any).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Chat-relevant fields of a user profile
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    /// User id
    pub id: Uuid,
    /// Name shown in notifications and conversation lists
    pub display_name: String,
    /// Registered push token, if the user opted into notifications
    #[serde(default)]
    pub push_token: Option<String>,
    /// Conversation the user is actively viewing, if any. Advisory only:
    /// written by the user's own open session, read by senders to decide
    /// whether a push would be redundant.
    #[serde(default)]
    pub active_conversation_id: Option<Uuid>,
}

impl Profile {
    /// Create a profile with just an id and display name
    pub fn new(id: Uuid, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            push_token: None,
            active_conversation_id: None,
        }
    }

    /// Whether the user is actively viewing the given conversation
    pub fn is_viewing(&self, conversation_id: Uuid) -> bool {
        self.active_conversation_id == Some(conversation_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_viewing() {
        let conv = Uuid::new_v4();
        let mut profile = Profile::new(Uuid::new_v4(), "Dana");
        assert!(!profile.is_viewing(conv));

        profile.active_conversation_id = Some(conv);
        assert!(profile.is_viewing(conv));
        assert!(!profile.is_viewing(Uuid::new_v4()));
    }
}
