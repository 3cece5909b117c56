//! Shared Error Types
//!
//! This module defines the error taxonomy used across the client and the
//! gateway implementations.
//!
//! # Error Categories
//!
//! - `NotAuthenticated` - No local user session exists
//! - `NotFound` - An explicitly referenced record does not resolve
//! - `RemoteWriteFailed` - An insert/update was rejected by the gateway
//! - `RemoteReadFailed` - A query was rejected by the gateway
//! - `PermissionDenied` - A write was rejected by the gateway's access policy
//! - `Conflict` - A uniqueness constraint was violated (caller should re-fetch)
//!
//! # Propagation
//!
//! Authentication and not-found errors abort the operation and are surfaced
//! to the caller. Write failures during a send trigger a local rollback and
//! hand the original text back for a manual retry. Presence and notification
//! failures are never propagated, only logged.
//!
//! # Thread Safety
//!
//! All error types are `Send + Sync` and can be safely shared across task
//! boundaries.

use thiserror::Error;

/// Errors surfaced by gateway calls and session operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// No local user session exists
    #[error("not authenticated")]
    NotAuthenticated,

    /// An explicitly referenced record does not resolve
    #[error("{entity} not found")]
    NotFound {
        /// What kind of record was looked up
        entity: &'static str,
    },

    /// An insert or update was rejected by the gateway
    #[error("remote write failed: {message}")]
    RemoteWriteFailed {
        /// Human-readable error message
        message: String,
    },

    /// A query was rejected by the gateway
    #[error("remote read failed: {message}")]
    RemoteReadFailed {
        /// Human-readable error message
        message: String,
    },

    /// A write was rejected by the gateway's access policy
    #[error("permission denied: {message}")]
    PermissionDenied {
        /// Human-readable error message
        message: String,
    },

    /// A uniqueness constraint was violated; the record already exists
    #[error("already exists: {message}")]
    Conflict {
        /// Human-readable error message
        message: String,
    },
}

impl ChatError {
    /// Create a not-found error for the given entity kind
    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }

    /// Create a remote-write error
    pub fn write(message: impl Into<String>) -> Self {
        Self::RemoteWriteFailed {
            message: message.into(),
        }
    }

    /// Create a remote-read error
    pub fn read(message: impl Into<String>) -> Self {
        Self::RemoteReadFailed {
            message: message.into(),
        }
    }

    /// Create a permission-denied error
    pub fn permission(message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }

    /// Create a conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Whether this error signals "the record already exists, re-fetch"
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        Self::read(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ChatError::not_found("conversation");
        assert_eq!(err.to_string(), "conversation not found");

        let err = ChatError::write("insert rejected");
        assert_eq!(err.to_string(), "remote write failed: insert rejected");
    }

    #[test]
    fn test_conflict_detection() {
        assert!(ChatError::conflict("pair already paired").is_conflict());
        assert!(!ChatError::NotAuthenticated.is_conflict());
    }

    #[test]
    fn test_from_serde_error() {
        let serde_err = serde_json::from_str::<u32>("not a number").unwrap_err();
        let err: ChatError = serde_err.into();
        assert!(matches!(err, ChatError::RemoteReadFailed { .. }));
    }
}
