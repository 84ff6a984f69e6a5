use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use coy_core::export::{
    message_to_export_item, render_text_export, render_timeline_export,
    suggested_export_file_name, ExportFormat, ExportMessage,
};
use coy_core::relationship::{InMemoryRelationshipStore, RelationshipService, RelationshipStore};
use coy_core::store::{InMemoryMessageStore, MessageStore};
use coy_core::sync::PaginationCursor;
use coy_core::util::now_millis;
use coy_core::{
    Conversation, ConversationEvent, DeleteScope, Message, MessageId, MessageKind,
    OutgoingMessage, RelationshipStatus, RelationshipView, SyncConfig, UserId,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::cli::OutputFormat;
use crate::commands::common::write_output;
use crate::error::CliError;

/// How long the event stream must stay silent before a step counts as settled
const QUIET_PERIOD: Duration = Duration::from_millis(25);

/// A scripted conversation between the local user and a peer
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplayScript {
    pub local_user: UserId,
    pub peer: UserId,
    #[serde(default)]
    pub relationship: ScriptRelationship,
    /// Server-side history present before the conversation opens
    #[serde(default)]
    pub history: Vec<Message>,
    #[serde(default)]
    pub steps: Vec<ReplayStep>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptRelationship {
    pub mine: Option<RelationshipStatus>,
    pub theirs: Option<RelationshipStatus>,
    /// The peer blocked the local user
    #[serde(default)]
    pub blocked: bool,
}

impl Default for ScriptRelationship {
    fn default() -> Self {
        Self {
            mine: Some(RelationshipStatus::Friends),
            theirs: Some(RelationshipStatus::Friends),
            blocked: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReplayStep {
    Send {
        content: String,
        #[serde(rename = "type", default)]
        kind: MessageKind,
        #[serde(default)]
        reply_to_id: Option<MessageId>,
    },
    /// The peer sends directly to the store
    PeerSend {
        content: String,
        #[serde(rename = "type", default)]
        kind: MessageKind,
    },
    Edit {
        id: MessageId,
        content: String,
    },
    React {
        id: MessageId,
        emoji: String,
    },
    /// The peer reacts directly in the store
    PeerReact {
        id: MessageId,
        emoji: Option<String>,
    },
    Delete {
        id: MessageId,
        #[serde(default)]
        scope: DeleteScope,
    },
    LoadOlder,
    AddAction,
    PeerAddAction,
    SetOffline {
        offline: bool,
    },
    FailNext {
        #[serde(default = "default_fail_count")]
        count: usize,
    },
}

const fn default_fail_count() -> usize {
    1
}

impl ReplayStep {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Send { .. } => "send",
            Self::PeerSend { .. } => "peer_send",
            Self::Edit { .. } => "edit",
            Self::React { .. } => "react",
            Self::PeerReact { .. } => "peer_react",
            Self::Delete { .. } => "delete",
            Self::LoadOlder => "load_older",
            Self::AddAction => "add_action",
            Self::PeerAddAction => "peer_add_action",
            Self::SetOffline { .. } => "set_offline",
            Self::FailNext { .. } => "fail_next",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub action: &'static str,
    pub ok: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub conversation_id: String,
    pub view: Option<RelationshipView>,
    pub can_send: bool,
    pub cursor: PaginationCursor,
    pub steps: Vec<StepReport>,
    /// Visible timeline after the last step, oldest first
    pub timeline: Vec<ExportMessage>,
    #[serde(skip)]
    visible: Vec<Message>,
}

pub async fn run_replay(
    script_path: &Path,
    format: OutputFormat,
    output_path: Option<&Path>,
    export_dir: Option<&Path>,
    config: &SyncConfig,
) -> Result<(), CliError> {
    let payload = std::fs::read_to_string(script_path)?;
    let script = parse_script(&payload)?;
    let report = replay(&script, config).await?;

    if let Some(dir) = export_dir {
        export_timeline(&report, format.into(), dir, now_millis())?;
    }

    let rendered = match format {
        OutputFormat::Json => serde_json::to_string_pretty(&report)?,
        OutputFormat::Text => format_report(&report),
    };
    write_output(&rendered, output_path)
}

/// Write the final visible timeline into `dir` under a generated file name
pub fn export_timeline(
    report: &ReplayReport,
    format: ExportFormat,
    dir: &Path,
    timestamp_ms: i64,
) -> Result<PathBuf, CliError> {
    let rendered = render_timeline_export(&report.visible, format)?;
    std::fs::create_dir_all(dir)?;
    let path = dir.join(suggested_export_file_name(format, timestamp_ms));
    std::fs::write(&path, rendered)?;
    tracing::info!(
        "Exported {} messages to {}",
        report.visible.len(),
        path.display()
    );
    Ok(path)
}

pub fn parse_script(payload: &str) -> Result<ReplayScript, CliError> {
    let script: ReplayScript = serde_json::from_str(payload)
        .map_err(|error| CliError::InvalidScript(error.to_string()))?;
    if script.local_user.as_str().trim().is_empty() || script.peer.as_str().trim().is_empty() {
        return Err(CliError::InvalidScript("user ids cannot be empty".to_string()));
    }
    if script.local_user == script.peer {
        return Err(CliError::InvalidScript(
            "local_user and peer must differ".to_string(),
        ));
    }
    Ok(script)
}

/// Run `script` against fresh in-memory stores
pub async fn replay(script: &ReplayScript, config: &SyncConfig) -> Result<ReplayReport, CliError> {
    let local = &script.local_user;
    let peer = &script.peer;

    let messages = Arc::new(InMemoryMessageStore::new(config));
    let relationships = Arc::new(InMemoryRelationshipStore::new());
    if let Some(mine) = script.relationship.mine {
        relationships.set_status(local, peer, mine).await?;
    }
    if let Some(theirs) = script.relationship.theirs {
        relationships.set_status(peer, local, theirs).await?;
    }
    if script.relationship.blocked {
        relationships.block(peer, local).await;
    }
    let service = RelationshipService::new(relationships);

    let conversation = Conversation::open(
        local.clone(),
        peer.clone(),
        messages.clone(),
        service.clone(),
        config,
    );
    messages
        .seed(conversation.id(), script.history.clone())
        .await;

    let mut events = conversation.subscribe();
    conversation.start().await?;
    settle(&mut events).await;

    let mut steps = Vec::with_capacity(script.steps.len());
    for (index, step) in script.steps.iter().enumerate() {
        let outcome = run_step(step, &conversation, &messages, &service).await;
        settle(&mut events).await;

        let report = match outcome {
            Ok(detail) => StepReport {
                index: index + 1,
                action: step.name(),
                ok: true,
                detail,
            },
            Err(error) => {
                tracing::warn!("Step {} ({}) failed: {}", index + 1, step.name(), error);
                StepReport {
                    index: index + 1,
                    action: step.name(),
                    ok: false,
                    detail: error.to_string(),
                }
            }
        };
        steps.push(report);
    }

    let visible = conversation.visible_snapshot().await;
    let report = ReplayReport {
        conversation_id: conversation.id().to_string(),
        view: conversation.current_view().await,
        can_send: conversation.can_send().await,
        cursor: conversation.cursor().await,
        steps,
        timeline: visible.iter().map(message_to_export_item).collect(),
        visible,
    };
    conversation.close().await;
    Ok(report)
}

async fn run_step(
    step: &ReplayStep,
    conversation: &Conversation,
    messages: &InMemoryMessageStore,
    service: &RelationshipService,
) -> coy_core::Result<String> {
    match step {
        ReplayStep::Send {
            content,
            kind,
            reply_to_id,
        } => {
            let draft = OutgoingMessage {
                content: content.clone(),
                kind: *kind,
                reply_to_id: reply_to_id.clone(),
            };
            let id = conversation.send(draft).await?;
            Ok(format!("sent as {id}"))
        }
        ReplayStep::PeerSend { content, kind } => {
            let draft = OutgoingMessage {
                content: content.clone(),
                kind: *kind,
                reply_to_id: None,
            };
            let id = messages
                .send(conversation.id(), conversation.peer(), &draft)
                .await?;
            Ok(format!("peer sent {id}"))
        }
        ReplayStep::Edit { id, content } => {
            conversation.edit(id, content).await?;
            Ok(format!("edited {id}"))
        }
        ReplayStep::React { id, emoji } => {
            conversation.react(id, emoji).await?;
            Ok(format!("toggled {emoji} on {id}"))
        }
        ReplayStep::PeerReact { id, emoji } => {
            messages
                .set_reaction(conversation.id(), id, conversation.peer(), emoji.as_deref())
                .await?;
            Ok(format!("peer reaction on {id}"))
        }
        ReplayStep::Delete { id, scope } => {
            conversation.delete(id, *scope).await?;
            Ok(format!("deleted {id}"))
        }
        ReplayStep::LoadOlder => {
            let added = conversation.load_older().await?;
            Ok(format!("{added} older messages"))
        }
        ReplayStep::AddAction => {
            let intent = conversation.add_action().await?;
            Ok(intent.map_or_else(|| "blocked".to_string(), |intent| intent.to_string()))
        }
        ReplayStep::PeerAddAction => {
            let intent = service
                .perform_add_action(conversation.peer(), conversation.local_user())
                .await?;
            conversation.refresh_relationship().await?;
            Ok(intent.map_or_else(|| "blocked".to_string(), |intent| intent.to_string()))
        }
        ReplayStep::SetOffline { offline } => {
            messages.set_offline(*offline);
            Ok(if *offline { "offline" } else { "online" }.to_string())
        }
        ReplayStep::FailNext { count } => {
            messages.fail_next(*count);
            Ok(format!("next {count} calls fail"))
        }
    }
}

/// Drain events until none arrive for `QUIET_PERIOD`
async fn settle(events: &mut broadcast::Receiver<ConversationEvent>) {
    loop {
        match tokio::time::timeout(QUIET_PERIOD, events.recv()).await {
            Ok(Ok(_) | Err(broadcast::error::RecvError::Lagged(_))) => {}
            Ok(Err(broadcast::error::RecvError::Closed)) | Err(_) => break,
        }
    }
}

pub fn format_report(report: &ReplayReport) -> String {
    let mut lines: Vec<String> = report
        .steps
        .iter()
        .map(|step| {
            let status = if step.ok { "ok" } else { "error" };
            format!("#{} {} [{status}] {}", step.index, step.action, step.detail)
        })
        .collect();

    let view = report.view.map_or("hidden", RelationshipView::as_str);
    lines.push(format!(
        "relationship: {view} (can_send={})",
        report.can_send
    ));
    lines.push(String::new());

    let mut rendered = lines.join("\n");
    rendered.push('\n');
    rendered.push_str(&render_text_export(&report.visible));
    rendered
}
