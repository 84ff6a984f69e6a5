//! In-process message store with snapshot fan-out and failure injection

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use super::{MessageStore, PageFeed};
use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::models::{ConversationId, DeleteScope, Message, MessageId, OutgoingMessage, UserId};
use crate::util::now_millis;

struct Subscriber {
    page_size: usize,
    sender: mpsc::Sender<Result<Vec<Message>>>,
}

#[derive(Default)]
struct ConversationLog {
    /// Ascending by timestamp
    messages: Vec<Message>,
    subscribers: Vec<Subscriber>,
}

impl ConversationLog {
    fn newest_page(&self, page_size: usize) -> Vec<Message> {
        self.messages.iter().rev().take(page_size).cloned().collect()
    }

    fn message_mut(&mut self, id: &MessageId) -> Result<&mut Message> {
        self.messages
            .iter_mut()
            .find(|message| &message.id == id)
            .ok_or_else(|| Error::NotFound(id.clone()))
    }

    /// Push the current newest page to every live subscriber
    fn publish(&mut self, conversation: &ConversationId) {
        let messages = &self.messages;
        self.subscribers.retain(|subscriber| {
            let page: Vec<Message> = messages
                .iter()
                .rev()
                .take(subscriber.page_size)
                .cloned()
                .collect();
            match subscriber.sender.try_send(Ok(page)) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!("Feed buffer full for {}; dropped snapshot", conversation);
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }
}

/// Message store kept in memory.
///
/// Assigns ids (`m1`, `m2`, ...) and strictly increasing server timestamps,
/// and pushes a fresh snapshot to subscribers after every successful write.
pub struct InMemoryMessageStore {
    config: SyncConfig,
    conversations: Mutex<HashMap<ConversationId, ConversationLog>>,
    next_id: AtomicU64,
    last_timestamp: Mutex<i64>,
    offline: AtomicBool,
    failures_pending: AtomicUsize,
}

impl InMemoryMessageStore {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            config: config.clone(),
            conversations: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            last_timestamp: Mutex::new(0),
            offline: AtomicBool::new(false),
            failures_pending: AtomicUsize::new(0),
        }
    }

    /// Fail every call with `RemoteUnavailable` while set
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Fail the next `count` calls with `RemoteUnavailable`
    pub fn fail_next(&self, count: usize) {
        self.failures_pending.fetch_add(count, Ordering::SeqCst);
    }

    /// Insert existing history without notifying subscribers
    pub async fn seed(&self, conversation: &ConversationId, messages: Vec<Message>) {
        let mut conversations = self.conversations.lock().await;
        let log = conversations.entry(conversation.clone()).or_default();
        log.messages.extend(messages);
        log.messages.sort_by_key(|message| message.timestamp);

        let newest = log.messages.last().map_or(0, |message| message.timestamp);
        let mut last = self.last_timestamp.lock().await;
        *last = (*last).max(newest);
    }

    /// Full server-side history, oldest first
    pub async fn messages(&self, conversation: &ConversationId) -> Vec<Message> {
        self.conversations
            .lock()
            .await
            .get(conversation)
            .map(|log| log.messages.clone())
            .unwrap_or_default()
    }

    /// Send an error item down every feed of `conversation`
    pub async fn interrupt_feed(&self, conversation: &ConversationId, reason: &str) {
        let conversations = self.conversations.lock().await;
        let Some(log) = conversations.get(conversation) else {
            return;
        };
        for subscriber in &log.subscribers {
            let error = Error::RemoteUnavailable(reason.to_string());
            if subscriber.sender.try_send(Err(error)).is_err() {
                tracing::warn!("Could not deliver feed error for {}", conversation);
            }
        }
    }

    fn check_available(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::RemoteUnavailable("message store is offline".to_string()));
        }
        let injected = self
            .failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |pending| {
                pending.checked_sub(1)
            })
            .is_ok();
        if injected {
            return Err(Error::RemoteUnavailable("injected failure".to_string()));
        }
        Ok(())
    }

    async fn server_timestamp(&self) -> i64 {
        let mut last = self.last_timestamp.lock().await;
        *last = now_millis().max(*last + 1);
        *last
    }

    /// Run `write` against an existing message and publish on success
    async fn write_message(
        &self,
        conversation: &ConversationId,
        id: &MessageId,
        write: impl FnOnce(&mut Message) -> Result<()> + Send,
    ) -> Result<()> {
        self.check_available()?;
        let mut conversations = self.conversations.lock().await;
        let log = conversations
            .get_mut(conversation)
            .ok_or_else(|| Error::NotFound(id.clone()))?;
        write(log.message_mut(id)?)?;
        log.publish(conversation);
        Ok(())
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn subscribe(
        &self,
        conversation: &ConversationId,
        page_size: usize,
    ) -> Result<PageFeed> {
        self.check_available()?;
        let (sender, receiver) = mpsc::channel(self.config.feed_buffer.max(1));

        let mut conversations = self.conversations.lock().await;
        let log = conversations.entry(conversation.clone()).or_default();
        if sender.try_send(Ok(log.newest_page(page_size))).is_err() {
            tracing::warn!("Could not deliver initial snapshot for {}", conversation);
        }
        log.subscribers.push(Subscriber { page_size, sender });
        tracing::debug!(
            "Subscribed to {} ({} subscribers)",
            conversation,
            log.subscribers.len()
        );
        Ok(receiver)
    }

    async fn fetch_older(
        &self,
        conversation: &ConversationId,
        before: &MessageId,
        page_size: usize,
    ) -> Result<Vec<Message>> {
        self.check_available()?;
        let conversations = self.conversations.lock().await;
        let log = conversations
            .get(conversation)
            .ok_or_else(|| Error::NotFound(before.clone()))?;
        let index = log
            .messages
            .iter()
            .position(|message| &message.id == before)
            .ok_or_else(|| Error::NotFound(before.clone()))?;

        Ok(log.messages[..index]
            .iter()
            .rev()
            .take(page_size)
            .cloned()
            .collect())
    }

    async fn send(
        &self,
        conversation: &ConversationId,
        sender: &UserId,
        draft: &OutgoingMessage,
    ) -> Result<MessageId> {
        self.check_available()?;
        let timestamp = self.server_timestamp().await;
        let id = MessageId::from(format!(
            "m{}",
            self.next_id.fetch_add(1, Ordering::SeqCst)
        ));
        let message = Message::from_draft(id.clone(), sender.clone(), draft, timestamp);

        let mut conversations = self.conversations.lock().await;
        let log = conversations.entry(conversation.clone()).or_default();
        let index = log
            .messages
            .partition_point(|existing| existing.timestamp <= timestamp);
        log.messages.insert(index, message);
        log.publish(conversation);
        Ok(id)
    }

    async fn edit(
        &self,
        conversation: &ConversationId,
        id: &MessageId,
        editor: &UserId,
        content: &str,
    ) -> Result<()> {
        let edited_at = self.server_timestamp().await;
        let max_edits = self.config.max_edits;
        self.write_message(conversation, id, |message| {
            if &message.sender_id != editor {
                return Err(Error::PermissionDenied(format!(
                    "{editor} cannot edit message {id}"
                )));
            }
            if message.edit_count >= max_edits {
                return Err(Error::EditLimitExceeded {
                    id: id.clone(),
                    limit: max_edits,
                });
            }
            if message.is_deleted {
                return Err(Error::InvalidInput(format!("message {id} is deleted")));
            }
            message.content = content.to_string();
            message.is_edited = true;
            message.edited_at = Some(edited_at);
            message.edit_count += 1;
            Ok(())
        })
        .await
    }

    async fn delete(
        &self,
        conversation: &ConversationId,
        id: &MessageId,
        user: &UserId,
        scope: DeleteScope,
    ) -> Result<()> {
        let config = &self.config;
        self.write_message(conversation, id, |message| {
            match scope {
                DeleteScope::Everyone => {
                    if &message.sender_id != user {
                        return Err(Error::PermissionDenied(format!(
                            "{user} cannot delete message {id} for everyone"
                        )));
                    }
                    message.is_deleted = true;
                    message.content = config.deleted_placeholder(message.kind).to_string();
                }
                DeleteScope::JustMe => {
                    message.deleted_for.insert(user.clone());
                }
            }
            Ok(())
        })
        .await
    }

    async fn set_reaction(
        &self,
        conversation: &ConversationId,
        id: &MessageId,
        user: &UserId,
        emoji: Option<&str>,
    ) -> Result<()> {
        self.write_message(conversation, id, |message| {
            message.set_reaction(user, emoji);
            Ok(())
        })
        .await
    }
}
