//! Message timeline synchronization.
//!
//! The engine keeps one ordered, deduplicated timeline built from
//! newest-first server pages, and merges each new page while protecting
//! local mutations the server has not reflected yet.

mod mutations;
mod timeline;

pub use mutations::{
    LocalMutation, LocalMutationRecord, LocalMutations, MutationKind, ProvisionalSend,
};
pub use timeline::{PaginationCursor, Timeline};

use serde::Serialize;

use crate::config::SyncConfig;
use crate::models::{DeleteScope, Message, MessageId, UserId};

/// What a merge changed, for logging and notifications
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    /// The timeline was empty and the page was adopted as-is
    pub adopted: bool,
    /// Existing entries replaced by the server version
    pub updated: usize,
    /// Existing entries where local edits or reactions were kept
    pub protected: usize,
    /// New entries inserted
    pub inserted: usize,
    /// Local mutation records the server caught up with
    pub settled: usize,
    /// Provisional sends replaced by their server copy
    pub superseded: usize,
}

impl MergeOutcome {
    #[must_use]
    pub const fn changed(&self) -> bool {
        self.adopted
            || self.updated > 0
            || self.protected > 0
            || self.inserted > 0
            || self.superseded > 0
    }
}

/// Owner of a conversation's timeline, cursor and local mutation records
#[derive(Debug)]
pub struct MessageSyncEngine {
    local_user: UserId,
    page_size: usize,
    provisional_match_window_ms: i64,
    timeline: Timeline,
    cursor: PaginationCursor,
    mutations: LocalMutations,
}

impl MessageSyncEngine {
    pub fn new(local_user: UserId, config: &SyncConfig) -> Self {
        Self {
            local_user,
            page_size: config.page_size,
            provisional_match_window_ms: config.provisional_match_window_ms,
            timeline: Timeline::new(),
            cursor: PaginationCursor::default(),
            mutations: LocalMutations::new(),
        }
    }

    #[must_use]
    pub const fn local_user(&self) -> &UserId {
        &self.local_user
    }

    #[must_use]
    pub const fn page_size(&self) -> usize {
        self.page_size
    }

    #[must_use]
    pub const fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    #[must_use]
    pub const fn cursor(&self) -> &PaginationCursor {
        &self.cursor
    }

    #[must_use]
    pub const fn mutations(&self) -> &LocalMutations {
        &self.mutations
    }

    pub(crate) fn parts_mut(&mut self) -> (&mut Timeline, &mut LocalMutations) {
        (&mut self.timeline, &mut self.mutations)
    }

    /// Merge a server page delivered newest-first.
    ///
    /// Safe to re-apply: merging a page already reflected in the timeline
    /// leaves every entry unchanged.
    pub fn merge_page(&mut self, page: Vec<Message>) -> MergeOutcome {
        let fetched = page.len();
        let incoming = into_chronological(page);
        let mut outcome = MergeOutcome::default();

        if self.timeline.is_empty() {
            self.timeline.replace_all(incoming);
            self.cursor.has_more = fetched == self.page_size;
            self.refresh_cursor();
            outcome.adopted = true;
            tracing::debug!(
                "Adopted initial page of {} messages (has_more={})",
                fetched,
                self.cursor.has_more
            );
            return outcome;
        }

        let mut fresh = Vec::new();
        for server in incoming {
            if self.timeline.contains(&server.id) {
                self.reconcile_existing(server, &mut outcome);
            } else {
                fresh.push(server);
            }
        }

        for server in fresh {
            if let Some(provisional_id) = self
                .mutations
                .match_provisional(&server, self.provisional_match_window_ms)
            {
                self.drop_provisional(&provisional_id);
                outcome.superseded += 1;
            }
            self.timeline.insert_ordered(server);
            outcome.inserted += 1;
        }

        outcome.superseded += self.sweep_linked_provisional();
        self.refresh_cursor();

        debug_assert!(self.timeline.is_consistent());
        tracing::debug!("Merged page of {}: {:?}", fetched, outcome);
        outcome
    }

    /// Prepend an older page (newest-of-the-old first) fetched before the
    /// cursor. Returns how many messages were added.
    pub fn prepend_older(&mut self, page: Vec<Message>) -> usize {
        let fetched = page.len();
        let added = self.timeline.prepend(into_chronological(page));
        self.cursor.has_more = fetched == self.page_size;
        self.refresh_cursor();
        tracing::debug!(
            "Prepended {} older messages (has_more={})",
            added,
            self.cursor.has_more
        );
        added
    }

    /// Record the server id a provisional send received. Drops the
    /// provisional entry right away if the server copy is already merged.
    pub fn link_provisional(&mut self, provisional_id: &MessageId, server_id: MessageId) {
        if self.timeline.contains(&server_id) {
            self.drop_provisional(provisional_id);
            return;
        }
        if !self.mutations.link_provisional(provisional_id, server_id) {
            tracing::debug!("Provisional {} already superseded", provisional_id);
        }
    }

    pub(crate) fn drop_provisional(&mut self, provisional_id: &MessageId) {
        self.mutations.remove_provisional(provisional_id);
        self.timeline.remove(provisional_id);
    }

    fn sweep_linked_provisional(&mut self) -> usize {
        let timeline = &self.timeline;
        let linked = self
            .mutations
            .linked_provisional_ids(|server_id| timeline.contains(server_id));
        for id in &linked {
            self.drop_provisional(id);
        }
        linked.len()
    }

    fn refresh_cursor(&mut self) {
        self.cursor.oldest_loaded_id = self
            .timeline
            .oldest_confirmed()
            .map(|message| message.id.clone());
    }

    fn reconcile_existing(&mut self, server: Message, outcome: &mut MergeOutcome) {
        let Some(local) = self.timeline.get(&server.id).cloned() else {
            return;
        };

        let is_my_optimistic_edit = self.check_edit_record(&local, &server, outcome);
        let my_pending_reaction = self.check_react_record(&server, outcome);
        self.check_delete_record(&server, outcome);

        let keep_local = is_my_optimistic_edit || my_pending_reaction.is_some();
        let mut merged = server;
        if is_my_optimistic_edit {
            merged.content.clone_from(&local.content);
            merged.is_edited = local.is_edited;
            merged.edited_at = local.edited_at;
            merged.edit_count = local.edit_count;
        }
        if let Some(emoji) = &my_pending_reaction {
            merged.set_reaction(&self.local_user, emoji.as_deref());
        }

        if merged != local {
            if keep_local {
                outcome.protected += 1;
            } else {
                outcome.updated += 1;
            }
            self.timeline.replace(merged);
        }
    }

    /// Whether local edit fields must survive this merge. Clears the record
    /// once the server has caught up or moved past it.
    fn check_edit_record(
        &mut self,
        local: &Message,
        server: &Message,
        outcome: &mut MergeOutcome,
    ) -> bool {
        let Some(record) = self.mutations.get(&server.id, MutationKind::Edit) else {
            return false;
        };
        let LocalMutation::Edit {
            content,
            edit_count,
        } = &record.mutation
        else {
            return false;
        };

        let caught_up = server.edit_count > *edit_count
            || (server.edit_count == *edit_count && &server.content == content);
        if caught_up || server.is_deleted {
            self.mutations.clear(&server.id, MutationKind::Edit);
            outcome.settled += 1;
            return false;
        }

        local.sender_id == self.local_user
    }

    /// The local user's pending reaction, if it still differs from the
    /// server's. Clears the record once they agree.
    fn check_react_record(
        &mut self,
        server: &Message,
        outcome: &mut MergeOutcome,
    ) -> Option<Option<String>> {
        let record = self.mutations.get(&server.id, MutationKind::React)?;
        let LocalMutation::React { emoji } = &record.mutation else {
            return None;
        };

        if server.reaction_of(&self.local_user) == emoji.as_deref() {
            self.mutations.clear(&server.id, MutationKind::React);
            outcome.settled += 1;
            return None;
        }
        Some(emoji.clone())
    }

    /// Deletions always defer to the server; the record only needs clearing
    /// once the server reflects it.
    fn check_delete_record(&mut self, server: &Message, outcome: &mut MergeOutcome) {
        let Some(record) = self.mutations.get(&server.id, MutationKind::Delete) else {
            return;
        };
        let reflected = match &record.mutation {
            LocalMutation::Delete {
                scope: DeleteScope::Everyone,
            } => server.is_deleted,
            LocalMutation::Delete {
                scope: DeleteScope::JustMe,
            } => server.is_hidden_for(&self.local_user),
            _ => false,
        };
        if reflected {
            self.mutations.clear(&server.id, MutationKind::Delete);
            outcome.settled += 1;
        }
    }
}

/// Reverse a newest-first page into ascending order, dropping repeated ids.
fn into_chronological(mut page: Vec<Message>) -> Vec<Message> {
    page.reverse();
    let mut seen = std::collections::HashSet::new();
    page.retain(|message| seen.insert(message.id.clone()));
    page.sort_by_key(|message| message.timestamp);
    page
}

#[cfg(test)]
mod tests;
