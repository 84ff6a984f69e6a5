//! Message store contract.
//!
//! The backing store delivers newest-first pages of at most `page_size`
//! messages, both as a live feed and as one-shot older pages.

mod memory;

pub use memory::InMemoryMessageStore;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::models::{ConversationId, DeleteScope, Message, MessageId, OutgoingMessage, UserId};

/// Live change feed. Each item is a full newest-first page, or a feed error.
pub type PageFeed = mpsc::Receiver<Result<Vec<Message>>>;

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Start a change feed for the newest `page_size` messages
    async fn subscribe(&self, conversation: &ConversationId, page_size: usize) -> Result<PageFeed>;

    /// Up to `page_size` messages strictly older than `before`, newest first
    async fn fetch_older(
        &self,
        conversation: &ConversationId,
        before: &MessageId,
        page_size: usize,
    ) -> Result<Vec<Message>>;

    /// Store a new message and return its server id
    async fn send(
        &self,
        conversation: &ConversationId,
        sender: &UserId,
        draft: &OutgoingMessage,
    ) -> Result<MessageId>;

    async fn edit(
        &self,
        conversation: &ConversationId,
        id: &MessageId,
        editor: &UserId,
        content: &str,
    ) -> Result<()>;

    async fn delete(
        &self,
        conversation: &ConversationId,
        id: &MessageId,
        user: &UserId,
        scope: DeleteScope,
    ) -> Result<()>;

    /// Set or clear `user`'s reaction
    async fn set_reaction(
        &self,
        conversation: &ConversationId,
        id: &MessageId,
        user: &UserId,
        emoji: Option<&str>,
    ) -> Result<()>;
}
