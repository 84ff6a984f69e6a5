//! Chronological message timeline and pagination cursor

use serde::Serialize;

use crate::models::{Message, MessageId, UserId};

/// Messages in ascending timestamp order, unique by id.
///
/// Entries are never physically removed once confirmed by the server; they
/// are only marked deleted. Provisional sends are the exception.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timeline {
    messages: Vec<Message>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[must_use]
    pub fn position(&self, id: &MessageId) -> Option<usize> {
        self.messages.iter().position(|message| &message.id == id)
    }

    #[must_use]
    pub fn contains(&self, id: &MessageId) -> bool {
        self.position(id).is_some()
    }

    #[must_use]
    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|message| &message.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: &MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|message| &message.id == id)
    }

    /// Resolve a message's reply reference; `None` when the referent is not
    /// loaded or never existed.
    #[must_use]
    pub fn reply_target(&self, message: &Message) -> Option<&Message> {
        message.reply_to_id.as_ref().and_then(|id| self.get(id))
    }

    /// Earliest entry that has a server id
    #[must_use]
    pub fn oldest_confirmed(&self) -> Option<&Message> {
        self.messages.iter().find(|message| !message.is_provisional())
    }

    /// Messages not hidden for `viewer`
    #[must_use]
    pub fn visible_to(&self, viewer: &UserId) -> Vec<Message> {
        self.messages
            .iter()
            .filter(|message| !message.is_hidden_for(viewer))
            .cloned()
            .collect()
    }

    /// Timestamps non-decreasing and ids unique
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let ordered = self
            .messages
            .windows(2)
            .all(|pair| pair[0].timestamp <= pair[1].timestamp);
        let mut ids: Vec<&MessageId> = self.messages.iter().map(|message| &message.id).collect();
        ids.sort();
        ids.dedup();
        ordered && ids.len() == self.messages.len()
    }

    pub(crate) fn replace_all(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    /// Insert before the first entry with a strictly greater timestamp.
    /// Returns the insertion index.
    pub(crate) fn insert_ordered(&mut self, message: Message) -> usize {
        let index = self
            .messages
            .partition_point(|existing| existing.timestamp <= message.timestamp);
        self.messages.insert(index, message);
        index
    }

    /// Add older messages (ascending order) ahead of the current entries.
    ///
    /// Ids already present are skipped. If the batch would break ordering it
    /// falls back to per-message ordered insertion. Returns how many entries
    /// were added.
    pub(crate) fn prepend(&mut self, mut older: Vec<Message>) -> usize {
        older.retain(|message| !self.contains(&message.id));
        older.sort_by_key(|message| message.timestamp);
        let added = older.len();

        let fits_before = match (older.last(), self.messages.first()) {
            (Some(last), Some(first)) => last.timestamp <= first.timestamp,
            _ => true,
        };

        if fits_before {
            self.messages.splice(0..0, older);
        } else {
            tracing::debug!("Older page overlaps loaded messages; inserting individually");
            for message in older {
                self.insert_ordered(message);
            }
        }
        added
    }

    /// Replace an existing entry, moving it if its timestamp changed
    pub(crate) fn replace(&mut self, message: Message) {
        let Some(index) = self.position(&message.id) else {
            self.insert_ordered(message);
            return;
        };
        if self.messages[index].timestamp == message.timestamp {
            self.messages[index] = message;
        } else {
            self.messages.remove(index);
            self.insert_ordered(message);
        }
    }

    pub(crate) fn remove(&mut self, id: &MessageId) -> Option<Message> {
        let index = self.position(id)?;
        Some(self.messages.remove(index))
    }
}

/// Marker for requesting the next older page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PaginationCursor {
    pub oldest_loaded_id: Option<MessageId>,
    /// False once a page came back shorter than the page size
    pub has_more: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ids(timeline: &Timeline) -> Vec<&str> {
        timeline
            .messages()
            .iter()
            .map(|message| message.id.as_str())
            .collect()
    }

    #[test]
    fn insert_ordered_places_between_neighbours() {
        let mut timeline = Timeline::new();
        timeline.replace_all(vec![
            Message::text("1", "a", "x", 10),
            Message::text("2", "a", "y", 20),
        ]);

        let index = timeline.insert_ordered(Message::text("3", "b", "z", 15));
        assert_eq!(index, 1);
        assert_eq!(ids(&timeline), vec!["1", "3", "2"]);
    }

    #[test]
    fn insert_ordered_keeps_equal_timestamps_stable() {
        let mut timeline = Timeline::new();
        timeline.replace_all(vec![Message::text("1", "a", "x", 10)]);
        timeline.insert_ordered(Message::text("2", "a", "y", 10));
        assert_eq!(ids(&timeline), vec!["1", "2"]);
    }

    #[test]
    fn prepend_skips_known_ids_and_falls_back_on_overlap() {
        let mut timeline = Timeline::new();
        timeline.replace_all(vec![
            Message::text("5", "a", "x", 50),
            Message::text("6", "a", "y", 60),
        ]);

        let added = timeline.prepend(vec![
            Message::text("3", "a", "x", 30),
            Message::text("5", "a", "x", 50),
        ]);
        assert_eq!(added, 1);
        assert_eq!(ids(&timeline), vec!["3", "5", "6"]);

        // Clock skew: an "older" message stamped after a loaded one
        let added = timeline.prepend(vec![Message::text("4", "a", "late", 55)]);
        assert_eq!(added, 1);
        assert_eq!(ids(&timeline), vec!["3", "5", "4", "6"]);
        assert!(timeline.is_consistent());
    }

    #[test]
    fn replace_moves_entry_when_timestamp_changes() {
        let mut timeline = Timeline::new();
        timeline.replace_all(vec![
            Message::text("1", "a", "x", 10),
            Message::text("2", "a", "y", 20),
        ]);
        timeline.replace(Message::text("1", "a", "x", 30));
        assert_eq!(ids(&timeline), vec!["2", "1"]);
    }

    #[test]
    fn reply_target_tolerates_missing_referent() {
        let mut timeline = Timeline::new();
        let mut reply = Message::text("2", "a", "re", 20);
        reply.reply_to_id = Some(MessageId::from("gone"));
        timeline.replace_all(vec![Message::text("1", "b", "x", 10), reply.clone()]);
        assert!(timeline.reply_target(&reply).is_none());

        reply.reply_to_id = Some(MessageId::from("1"));
        assert_eq!(
            timeline.reply_target(&reply).map(|m| m.content.as_str()),
            Some("x")
        );
    }

    #[test]
    fn visible_to_hides_messages_deleted_for_viewer() {
        let alice = UserId::from("alice");
        let mut hidden = Message::text("1", "bob", "x", 10);
        hidden.deleted_for.insert(alice.clone());
        let mut timeline = Timeline::new();
        timeline.replace_all(vec![hidden, Message::text("2", "bob", "y", 20)]);

        let visible = timeline.visible_to(&alice);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id.as_str(), "2");
        assert_eq!(timeline.visible_to(&UserId::from("bob")).len(), 2);
    }
}
