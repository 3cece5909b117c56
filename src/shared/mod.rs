//! Shared Module
//!
//! Types and data structures shared between the client logic and the
//! gateway implementations. Everything here is wire-adjacent: designed
//! for serialization and transmission over the gateway's APIs.

/// Shared error types
pub mod error;

/// Real-time event envelope
pub mod event;

/// Gateway configuration
pub mod config;

/// Conversations, messages, profiles
pub mod messaging;

/// Re-export commonly used types for convenience
pub use config::{ConfigError, GatewayConfig, GatewayConfigBuilder};
pub use error::ChatError;
pub use event::{EventType, RealtimeEvent};
