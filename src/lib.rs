//! MarketChat - Main Library
//!
//! MarketChat is the real-time chat synchronization client of a
//! marketplace app. It keeps an open conversation's message list
//! consistent across optimistic local writes, confirmed server writes,
//! and incoming real-time events, and decides when a recipient actually
//! needs a push notification.
//!
//! # Overview
//!
//! This library provides the client-side chat logic, including:
//! - Optimistic message sending with rollback on failure
//! - Deduplicated merging of the send response and the real-time echo
//! - Presence-based push suppression
//! - A conversation inbox with previews and unread counts
//!
//! All durable state lives behind a hosted gateway, reached only through
//! the [`gateway::RemoteGateway`] contract.
//!
//! # Module Structure
//!
//! - **`shared`** - Wire-adjacent types: messages, conversations,
//!   profiles, events, errors, configuration
//! - **`gateway`** - The remote gateway contract, the HTTP
//!   implementation, and an in-process implementation for tests
//! - **`client`** - Conversation sessions, the message reconciler, the
//!   notification gate, and the inbox
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use marketchat::client::{ConversationSession, LocalUser, OpenTarget};
//! use marketchat::gateway::HttpGateway;
//! use marketchat::shared::GatewayConfig;
//!
//! # async fn example(counterparty: uuid::Uuid, me: LocalUser) -> Result<(), marketchat::shared::ChatError> {
//! let config = GatewayConfig::builder()
//!     .base_url("https://gateway.example.com")
//!     .build()
//!     .expect("valid config");
//! let gateway = Arc::new(HttpGateway::new(config));
//!
//! let mut session = ConversationSession::open(
//!     gateway,
//!     Some(me),
//!     OpenTarget::Participant { counterparty_id: counterparty, listing_id: None },
//! )
//! .await?;
//!
//! session.load_history().await?;
//! let outcome = session.send("is this still available?").await;
//! if !outcome.accepted {
//!     // restore outcome.restored_text into the input box
//! }
//! # Ok(())
//! # }
//! ```

/// Wire-adjacent shared types
pub mod shared;

/// Remote data gateway contract and implementations
pub mod gateway;

/// Client-side chat logic
pub mod client;

pub use client::{ConversationInbox, ConversationSession, LocalUser, OpenTarget, SendOutcome};
pub use gateway::{HttpGateway, InMemoryGateway, RemoteGateway};
pub use shared::{ChatError, GatewayConfig};
