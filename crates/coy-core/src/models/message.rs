//! Message model

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::{MessageId, UserId};

/// Message payload type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Plain text content
    #[default]
    Text,
    /// Content is an image URL
    Image,
    /// Content is a video URL
    Video,
}

impl MessageKind {
    /// Whether the content field holds a media URL rather than text
    #[must_use]
    pub const fn is_media(self) -> bool {
        matches!(self, Self::Image | Self::Video)
    }
}

/// Who a deletion applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeleteScope {
    /// Mark deleted for both participants and replace the content
    #[default]
    Everyone,
    /// Hide the message only for the deleting user
    JustMe,
}

/// A message in a one-to-one conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Stable identifier
    pub id: MessageId,
    /// Author
    pub sender_id: UserId,
    /// Text, or a media URL for image/video messages
    pub content: String,
    /// Payload type
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    /// Send timestamp (Unix ms)
    pub timestamp: i64,
    /// Weak reference to the replied-to message; the referent may be absent
    #[serde(default)]
    pub reply_to_id: Option<MessageId>,
    #[serde(default)]
    pub is_edited: bool,
    /// Last edit timestamp (Unix ms)
    #[serde(default)]
    pub edited_at: Option<i64>,
    #[serde(default)]
    pub edit_count: u8,
    #[serde(default)]
    pub is_deleted: bool,
    /// Users this message is hidden for
    #[serde(default)]
    pub deleted_for: BTreeSet<UserId>,
    /// One reaction per user, last write wins
    #[serde(default)]
    pub reactions: BTreeMap<UserId, String>,
}

impl Message {
    /// Create a plain text message
    #[must_use]
    pub fn text(
        id: impl Into<MessageId>,
        sender_id: impl Into<UserId>,
        content: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            id: id.into(),
            sender_id: sender_id.into(),
            content: content.into(),
            kind: MessageKind::Text,
            timestamp,
            reply_to_id: None,
            is_edited: false,
            edited_at: None,
            edit_count: 0,
            is_deleted: false,
            deleted_for: BTreeSet::new(),
            reactions: BTreeMap::new(),
        }
    }

    /// Build a message from an outgoing draft
    #[must_use]
    pub fn from_draft(
        id: MessageId,
        sender_id: UserId,
        draft: &OutgoingMessage,
        timestamp: i64,
    ) -> Self {
        Self {
            kind: draft.kind,
            reply_to_id: draft.reply_to_id.clone(),
            ..Self::text(id, sender_id, draft.content.clone(), timestamp)
        }
    }

    /// The reaction `user` currently has on this message
    #[must_use]
    pub fn reaction_of(&self, user: &UserId) -> Option<&str> {
        self.reactions.get(user).map(String::as_str)
    }

    /// Set or clear `user`'s reaction
    pub fn set_reaction(&mut self, user: &UserId, emoji: Option<&str>) {
        match emoji {
            Some(emoji) => {
                self.reactions.insert(user.clone(), emoji.to_string());
            }
            None => {
                self.reactions.remove(user);
            }
        }
    }

    /// Whether `user` removed this message from their own view
    #[must_use]
    pub fn is_hidden_for(&self, user: &UserId) -> bool {
        self.deleted_for.contains(user)
    }

    /// Whether this entry is a local placeholder awaiting its server id
    #[must_use]
    pub fn is_provisional(&self) -> bool {
        self.id.is_provisional()
    }
}

/// Content of a message about to be sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub content: String,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub reply_to_id: Option<MessageId>,
}

impl OutgoingMessage {
    /// A text message draft
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            kind: MessageKind::Text,
            reply_to_id: None,
        }
    }

    /// A media message draft; `url` points at already-uploaded media
    #[must_use]
    pub fn media(kind: MessageKind, url: impl Into<String>) -> Self {
        Self {
            content: url.into(),
            kind,
            reply_to_id: None,
        }
    }

    /// Mark this draft as a reply
    #[must_use]
    pub fn replying_to(mut self, id: impl Into<MessageId>) -> Self {
        self.reply_to_id = Some(id.into());
        self
    }
}
