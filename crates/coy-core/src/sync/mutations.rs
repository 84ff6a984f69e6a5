//! Local mutation records consulted during merges

use std::collections::HashMap;

use serde::Serialize;

use crate::models::{DeleteScope, Message, MessageId, MessageKind, UserId};

/// Kind of in-flight local mutation. At most one record per message per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Edit,
    React,
    Delete,
}

/// The value a local mutation applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LocalMutation {
    /// Edited content and the edit count after applying it
    Edit { content: String, edit_count: u8 },
    /// The local user's reaction after applying, `None` when removed
    React { emoji: Option<String> },
    Delete { scope: DeleteScope },
}

impl LocalMutation {
    #[must_use]
    pub const fn kind(&self) -> MutationKind {
        match self {
            Self::Edit { .. } => MutationKind::Edit,
            Self::React { .. } => MutationKind::React,
            Self::Delete { .. } => MutationKind::Delete,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalMutationRecord {
    pub mutation: LocalMutation,
    /// Increases with every recorded mutation; a newer record of the same
    /// kind on the same message supersedes an older one
    pub generation: u64,
}

/// A sent message the server has not echoed back yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionalSend {
    pub sender_id: UserId,
    pub content: String,
    pub kind: MessageKind,
    pub timestamp: i64,
    /// Id returned by the remote send, once known
    pub server_id: Option<MessageId>,
}

impl ProvisionalSend {
    #[must_use]
    pub fn from_message(message: &Message) -> Self {
        Self {
            sender_id: message.sender_id.clone(),
            content: message.content.clone(),
            kind: message.kind,
            timestamp: message.timestamp,
            server_id: None,
        }
    }

    /// Same author, content and type, stamped within `window_ms`
    fn looks_like(&self, server: &Message, window_ms: i64) -> bool {
        self.server_id.is_none()
            && self.sender_id == server.sender_id
            && self.kind == server.kind
            && self.content == server.content
            && (self.timestamp - server.timestamp).abs() <= window_ms
    }
}

/// Table of in-flight local mutations and provisional sends
#[derive(Debug, Default)]
pub struct LocalMutations {
    records: HashMap<(MessageId, MutationKind), LocalMutationRecord>,
    provisional: HashMap<MessageId, ProvisionalSend>,
    next_generation: u64,
}

impl LocalMutations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a record, superseding any unconfirmed one of the same kind.
    /// Returns the new record's generation.
    pub fn record(&mut self, id: &MessageId, mutation: LocalMutation) -> u64 {
        self.next_generation += 1;
        let generation = self.next_generation;
        let key = (id.clone(), mutation.kind());
        if let Some(previous) = self.records.insert(
            key,
            LocalMutationRecord {
                mutation,
                generation,
            },
        ) {
            tracing::debug!(
                "Superseded {:?} record on {} (generation {})",
                previous.mutation.kind(),
                id,
                previous.generation
            );
        }
        generation
    }

    #[must_use]
    pub fn get(&self, id: &MessageId, kind: MutationKind) -> Option<&LocalMutationRecord> {
        self.records.get(&(id.clone(), kind))
    }

    /// Whether `generation` is still the live record for this message and kind
    #[must_use]
    pub fn is_current(&self, id: &MessageId, kind: MutationKind, generation: u64) -> bool {
        self.get(id, kind)
            .is_some_and(|record| record.generation == generation)
    }

    pub fn clear(&mut self, id: &MessageId, kind: MutationKind) -> Option<LocalMutationRecord> {
        self.records.remove(&(id.clone(), kind))
    }

    /// Clear the record only if it has not been superseded
    pub fn clear_if_current(&mut self, id: &MessageId, kind: MutationKind, generation: u64) -> bool {
        if self.is_current(id, kind, generation) {
            self.records.remove(&(id.clone(), kind));
            true
        } else {
            false
        }
    }

    /// Number of in-flight mutation records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.provisional.is_empty()
    }

    pub fn track_provisional(&mut self, id: MessageId, send: ProvisionalSend) {
        self.provisional.insert(id, send);
    }

    #[must_use]
    pub fn provisional(&self, id: &MessageId) -> Option<&ProvisionalSend> {
        self.provisional.get(id)
    }

    /// Remember the server id a provisional send was assigned
    pub fn link_provisional(&mut self, id: &MessageId, server_id: MessageId) -> bool {
        match self.provisional.get_mut(id) {
            Some(send) => {
                send.server_id = Some(server_id);
                true
            }
            None => false,
        }
    }

    pub fn remove_provisional(&mut self, id: &MessageId) -> Option<ProvisionalSend> {
        self.provisional.remove(id)
    }

    /// Number of sends awaiting their server copy
    #[must_use]
    pub fn provisional_count(&self) -> usize {
        self.provisional.len()
    }

    /// Find the provisional entry a server message supersedes.
    ///
    /// An exact server id link wins. Otherwise the oldest unlinked entry with
    /// the same author, type and content within `window_ms` is chosen.
    #[must_use]
    pub fn match_provisional(&self, server: &Message, window_ms: i64) -> Option<MessageId> {
        if let Some((id, _)) = self
            .provisional
            .iter()
            .find(|(_, send)| send.server_id.as_ref() == Some(&server.id))
        {
            return Some(id.clone());
        }

        self.provisional
            .iter()
            .filter(|(_, send)| send.looks_like(server, window_ms))
            .min_by(|(a_id, a), (b_id, b)| {
                a.timestamp.cmp(&b.timestamp).then_with(|| a_id.cmp(b_id))
            })
            .map(|(id, _)| id.clone())
    }

    /// Provisional ids whose linked server id satisfies `present`
    pub fn linked_provisional_ids(&self, present: impl Fn(&MessageId) -> bool) -> Vec<MessageId> {
        self.provisional
            .iter()
            .filter(|(_, send)| send.server_id.as_ref().is_some_and(&present))
            .map(|(id, _)| id.clone())
            .collect()
    }
}
