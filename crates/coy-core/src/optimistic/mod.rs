//! Optimistic local mutations.
//!
//! Every mutation is applied to the timeline first, then confirmed or
//! reverted once the remote call settles. The coordinator installs the
//! `LocalMutationRecord`s the sync engine consults while merging.

use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::models::{DeleteScope, Message, MessageId, OutgoingMessage, UserId};
use crate::sync::{LocalMutation, MessageSyncEngine, MutationKind, ProvisionalSend};

/// An applied mutation awaiting its remote outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMutation {
    pub id: MessageId,
    pub mutation: LocalMutation,
    pub generation: u64,
    /// The message as it was before the mutation
    before: Message,
}

impl PendingMutation {
    #[must_use]
    pub const fn kind(&self) -> MutationKind {
        self.mutation.kind()
    }

    #[must_use]
    pub const fn before(&self) -> &Message {
        &self.before
    }
}

/// Applies, confirms and reverts local mutations on a sync engine
#[derive(Debug, Clone)]
pub struct OptimisticCoordinator {
    local_user: UserId,
    config: SyncConfig,
}

impl OptimisticCoordinator {
    pub fn new(local_user: UserId, config: &SyncConfig) -> Self {
        Self {
            local_user,
            config: config.clone(),
        }
    }

    /// Append a provisional message for `draft`, stamped `now`
    pub fn apply_send(
        &self,
        engine: &mut MessageSyncEngine,
        draft: &OutgoingMessage,
        now: i64,
    ) -> Result<Message> {
        if draft.content.trim().is_empty() {
            return Err(Error::InvalidInput("message content is empty".to_string()));
        }

        let message = Message::from_draft(
            MessageId::provisional(),
            self.local_user.clone(),
            draft,
            now,
        );
        let (timeline, mutations) = engine.parts_mut();
        mutations.track_provisional(message.id.clone(), ProvisionalSend::from_message(&message));
        timeline.insert_ordered(message.clone());
        tracing::debug!("Applied provisional send {}", message.id);
        Ok(message)
    }

    /// The remote send succeeded with `server_id`
    pub fn confirm_send(
        &self,
        engine: &mut MessageSyncEngine,
        provisional_id: &MessageId,
        server_id: MessageId,
    ) {
        engine.link_provisional(provisional_id, server_id);
    }

    /// The remote send failed; remove the provisional entry
    pub fn revert_send(&self, engine: &mut MessageSyncEngine, provisional_id: &MessageId) {
        engine.drop_provisional(provisional_id);
        tracing::warn!("Reverted provisional send {}", provisional_id);
    }

    /// Edit `id` locally.
    ///
    /// Rejected without touching the message when the edit limit is reached,
    /// the local user is not the sender, the message is deleted or media, or
    /// the new content is empty.
    pub fn apply_edit(
        &self,
        engine: &mut MessageSyncEngine,
        id: &MessageId,
        content: &str,
        now: i64,
    ) -> Result<PendingMutation> {
        let content = content.trim();
        let (timeline, mutations) = engine.parts_mut();
        let message = timeline
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.clone()))?;

        if message.edit_count >= self.config.max_edits {
            return Err(Error::EditLimitExceeded {
                id: id.clone(),
                limit: self.config.max_edits,
            });
        }
        if message.sender_id != self.local_user {
            return Err(Error::PermissionDenied(format!(
                "only the sender can edit message {id}"
            )));
        }
        if message.is_deleted || message.kind.is_media() || message.is_provisional() {
            return Err(Error::InvalidInput(format!("message {id} cannot be edited")));
        }
        if content.is_empty() {
            return Err(Error::InvalidInput("edited content is empty".to_string()));
        }

        let before = message.clone();
        message.content = content.to_string();
        message.is_edited = true;
        message.edited_at = Some(now);
        message.edit_count += 1;

        let mutation = LocalMutation::Edit {
            content: message.content.clone(),
            edit_count: message.edit_count,
        };
        let generation = mutations.record(id, mutation.clone());
        Ok(PendingMutation {
            id: id.clone(),
            mutation,
            generation,
            before,
        })
    }

    /// Toggle the local user's reaction: the same emoji removes it, any
    /// other emoji replaces it.
    pub fn apply_react(
        &self,
        engine: &mut MessageSyncEngine,
        id: &MessageId,
        emoji: &str,
    ) -> Result<PendingMutation> {
        let emoji = emoji.trim();
        if emoji.is_empty() {
            return Err(Error::InvalidInput("reaction is empty".to_string()));
        }

        let (timeline, mutations) = engine.parts_mut();
        let message = timeline
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.clone()))?;
        if message.is_deleted || message.is_provisional() {
            return Err(Error::InvalidInput(format!("cannot react to message {id}")));
        }

        let before = message.clone();
        let next = if message.reaction_of(&self.local_user) == Some(emoji) {
            None
        } else {
            Some(emoji.to_string())
        };
        message.set_reaction(&self.local_user, next.as_deref());

        let mutation = LocalMutation::React { emoji: next };
        let generation = mutations.record(id, mutation.clone());
        Ok(PendingMutation {
            id: id.clone(),
            mutation,
            generation,
            before,
        })
    }

    /// Delete `id` locally. `Everyone` marks it deleted with a placeholder
    /// and is reserved to the sender; `JustMe` hides it for the local user.
    pub fn apply_delete(
        &self,
        engine: &mut MessageSyncEngine,
        id: &MessageId,
        scope: DeleteScope,
    ) -> Result<PendingMutation> {
        let (timeline, mutations) = engine.parts_mut();
        let message = timeline
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.clone()))?;
        if message.is_provisional() {
            return Err(Error::InvalidInput(format!(
                "message {id} has not been sent yet"
            )));
        }

        let before = message.clone();
        match scope {
            DeleteScope::Everyone => {
                if message.sender_id != self.local_user {
                    return Err(Error::PermissionDenied(format!(
                        "only the sender can delete message {id} for everyone"
                    )));
                }
                if message.is_deleted {
                    return Err(Error::InvalidInput(format!(
                        "message {id} is already deleted"
                    )));
                }
                message.is_deleted = true;
                message.content = self.config.deleted_placeholder(message.kind).to_string();
            }
            DeleteScope::JustMe => {
                if !message.deleted_for.insert(self.local_user.clone()) {
                    return Err(Error::InvalidInput(format!(
                        "message {id} is already hidden"
                    )));
                }
            }
        }

        let mutation = LocalMutation::Delete { scope };
        let generation = mutations.record(id, mutation.clone());
        Ok(PendingMutation {
            id: id.clone(),
            mutation,
            generation,
            before,
        })
    }

    /// The remote call succeeded.
    ///
    /// Delete records are cleared here. Edit and react records stay until a
    /// merge shows the server caught up. Returns false when the mutation was
    /// superseded in the meantime.
    pub fn confirm(&self, engine: &mut MessageSyncEngine, pending: &PendingMutation) -> bool {
        let (_, mutations) = engine.parts_mut();
        if !mutations.is_current(&pending.id, pending.kind(), pending.generation) {
            tracing::debug!(
                "Confirmed superseded {:?} on {}",
                pending.kind(),
                pending.id
            );
            return false;
        }
        if pending.kind() == MutationKind::Delete {
            mutations.clear(&pending.id, MutationKind::Delete);
        }
        true
    }

    /// The remote call failed; undo the local change and clear its record.
    ///
    /// Edits restore the edit fields, reactions the local user's entry, and
    /// deletes the whole original message. A superseded mutation is left
    /// alone and false is returned.
    pub fn revert(&self, engine: &mut MessageSyncEngine, pending: &PendingMutation) -> bool {
        let (timeline, mutations) = engine.parts_mut();
        if !mutations.clear_if_current(&pending.id, pending.kind(), pending.generation) {
            tracing::debug!(
                "Skipped revert of superseded {:?} on {}",
                pending.kind(),
                pending.id
            );
            return false;
        }

        let before = &pending.before;
        match pending.kind() {
            MutationKind::Edit => {
                if let Some(message) = timeline.get_mut(&pending.id) {
                    message.content.clone_from(&before.content);
                    message.is_edited = before.is_edited;
                    message.edited_at = before.edited_at;
                    message.edit_count = before.edit_count;
                }
            }
            MutationKind::React => {
                if let Some(message) = timeline.get_mut(&pending.id) {
                    message.set_reaction(&self.local_user, before.reaction_of(&self.local_user));
                }
            }
            MutationKind::Delete => {
                if timeline.contains(&pending.id) {
                    timeline.replace(before.clone());
                }
            }
        }
        tracing::warn!("Reverted {:?} on {}", pending.kind(), pending.id);
        true
    }
}
