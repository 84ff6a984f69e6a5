//! Timeline export helpers shared by the CLI and tests.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::models::{Message, MessageKind};
use crate::util::compact_text;

const REPLY_PREVIEW_CHARS: usize = 24;

/// Export output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Text,
}

impl ExportFormat {
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Text => "txt",
        }
    }
}

/// Serializable message record used in JSON exports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportMessage {
    pub id: String,
    pub sender_id: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: String,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
    pub edit_count: u8,
    pub is_deleted: bool,
    pub reactions: BTreeMap<String, String>,
}

/// Convert a message into an export record.
#[must_use]
pub fn message_to_export_item(message: &Message) -> ExportMessage {
    ExportMessage {
        id: message.id.to_string(),
        sender_id: message.sender_id.to_string(),
        kind: message.kind,
        content: message.content.clone(),
        timestamp: message.timestamp,
        reply_to_id: message.reply_to_id.as_ref().map(ToString::to_string),
        edit_count: message.edit_count,
        is_deleted: message.is_deleted,
        reactions: message
            .reactions
            .iter()
            .map(|(user, emoji)| (user.to_string(), emoji.clone()))
            .collect(),
    }
}

/// Render messages as pretty-printed JSON.
pub fn render_json_export(messages: &[Message]) -> serde_json::Result<String> {
    let items = messages
        .iter()
        .map(message_to_export_item)
        .collect::<Vec<ExportMessage>>();
    serde_json::to_string_pretty(&items)
}

/// Render one line per message:
/// `[ts] sender: content (edited) {user: emoji, ...}`.
///
/// Replies are prefixed with a short preview of the referenced message when
/// it is part of `messages`.
#[must_use]
pub fn render_text_export(messages: &[Message]) -> String {
    let mut output = String::new();

    for message in messages {
        let _ = write!(output, "[{}] {}: ", message.timestamp, message.sender_id);
        if let Some(reply_to) = &message.reply_to_id {
            match messages.iter().find(|candidate| &candidate.id == reply_to) {
                Some(target) => {
                    let _ = write!(
                        output,
                        "(re {}: \"{}\") ",
                        target.sender_id,
                        compact_text(&target.content, REPLY_PREVIEW_CHARS)
                    );
                }
                None => output.push_str("(re unavailable message) "),
            }
        }
        if message.kind.is_media() && !message.is_deleted {
            let _ = write!(output, "<{}> ", kind_label(message.kind));
        }
        output.push_str(&message.content);
        if message.is_edited && !message.is_deleted {
            output.push_str(" (edited)");
        }
        if !message.reactions.is_empty() {
            let reactions = message
                .reactions
                .iter()
                .map(|(user, emoji)| format!("{user}: {emoji}"))
                .collect::<Vec<_>>()
                .join(", ");
            let _ = write!(output, " {{{reactions}}}");
        }
        output.push('\n');
    }

    output
}

const fn kind_label(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Text => "text",
        MessageKind::Image => "image",
        MessageKind::Video => "video",
    }
}

/// Render messages in the selected format.
pub fn render_timeline_export(
    messages: &[Message],
    format: ExportFormat,
) -> serde_json::Result<String> {
    match format {
        ExportFormat::Json => render_json_export(messages),
        ExportFormat::Text => Ok(render_text_export(messages)),
    }
}

/// Build a deterministic default file name for export flows.
#[must_use]
pub fn suggested_export_file_name(format: ExportFormat, timestamp_ms: i64) -> String {
    format!("coy-timeline-{timestamp_ms}.{}", format.extension())
}
