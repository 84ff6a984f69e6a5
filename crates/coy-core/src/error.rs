//! Error types for coy-core

use thiserror::Error;

use crate::models::MessageId;

/// Result type alias using coy-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in coy-core operations
///
/// Every variant is scoped to a single mutation or fetch attempt. None of
/// them is fatal to the client.
#[derive(Error, Debug)]
pub enum Error {
    /// Network or backend failure on a mutation or fetch
    #[error("Remote unavailable: {0}")]
    RemoteUnavailable(String),

    /// Local validation failure, never sent remotely
    #[error("Message {id} has already been edited {limit} times")]
    EditLimitExceeded { id: MessageId, limit: u8 },

    /// Sending while the relationship does not allow it
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Page fetch failed; state is untouched and the fetch may be retried
    #[error("Page fetch failed: {0}")]
    PageFetchFailed(String),

    /// Message not present in the timeline
    #[error("Message not found: {0}")]
    NotFound(MessageId),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The conversation context was closed while the operation was running
    #[error("Conversation is closed")]
    ConversationClosed,

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether retrying the same operation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RemoteUnavailable(_) | Self::PageFetchFailed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_and_fetch_failures_are_retryable() {
        assert!(Error::RemoteUnavailable("offline".into()).is_retryable());
        assert!(Error::PageFetchFailed("timeout".into()).is_retryable());
        assert!(!Error::PermissionDenied("not friends".into()).is_retryable());
        assert!(!Error::EditLimitExceeded {
            id: MessageId::from("m1"),
            limit: 2,
        }
        .is_retryable());
    }

    #[test]
    fn edit_limit_message_names_the_message() {
        let error = Error::EditLimitExceeded {
            id: MessageId::from("m7"),
            limit: 2,
        };
        assert_eq!(error.to_string(), "Message m7 has already been edited 2 times");
    }
}
