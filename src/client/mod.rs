//! Chat Client
//!
//! The client-side logic layered over the remote gateway: per-thread
//! sessions with optimistic sending and reconciliation, the push
//! suppression gate, and the conversation inbox. Everything here is
//! driven from the embedding event loop; nothing retries, queues, or
//! persists on its own.

/// Ordered, duplicate-free message sequence for one conversation
pub mod reconciler;

/// One open chat thread
pub mod session;

/// Push suppression and local notification sinks
pub mod notify;

/// Conversation list data source
pub mod inbox;

pub use inbox::ConversationInbox;
pub use notify::{LocalNotifier, NotificationGate, PushDecision};
pub use reconciler::{MergeOutcome, MessageReconciler};
pub use session::{ConversationSession, LocalUser, OpenTarget, SendOutcome, SessionEvent};
