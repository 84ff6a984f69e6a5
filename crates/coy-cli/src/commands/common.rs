use std::path::{Path, PathBuf};

use coy_core::relationship::RelationshipSnapshot;
use coy_core::{AddIntent, RelationshipStatus, RelationshipView, SyncConfig};
use serde::Serialize;

use crate::error::CliError;

const UNKNOWN_STATUS: &str = "unknown";

/// One evaluated status pair, as printed by `table`, `resolve` and `intent`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairReport {
    pub mine: Option<RelationshipStatus>,
    pub theirs: Option<RelationshipStatus>,
    pub hidden: bool,
    pub view: Option<RelationshipView>,
    pub can_send: bool,
    pub intent: Option<AddIntent>,
}

pub fn evaluate_pair(snapshot: &RelationshipSnapshot) -> PairReport {
    let gate = snapshot.gate();
    PairReport {
        mine: snapshot.mine,
        theirs: snapshot.theirs,
        hidden: gate.view().is_none(),
        view: gate.view(),
        can_send: gate.can_send(),
        intent: snapshot.add_intent(),
    }
}

pub fn format_pair_line(report: &PairReport) -> String {
    let view = report
        .view
        .map_or("hidden", RelationshipView::as_str);
    let intent = report.intent.map_or("-", AddIntent::as_str);
    format!(
        "{:<12} {:<12} -> {:<12} can_send={:<5} add={intent}",
        status_label(report.mine),
        status_label(report.theirs),
        view,
        report.can_send,
    )
}

/// Parse a status argument; `unknown` (or `none`) stands for a status that
/// is still loading.
pub fn parse_status(value: &str) -> Result<Option<RelationshipStatus>, CliError> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case(UNKNOWN_STATUS) || trimmed.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    trimmed
        .parse::<RelationshipStatus>()
        .map(Some)
        .map_err(CliError::InvalidStatus)
}

pub const fn status_label(status: Option<RelationshipStatus>) -> &'static str {
    match status {
        Some(status) => status.as_str(),
        None => UNKNOWN_STATUS,
    }
}

/// Explicit `--config`, else `<config_dir>/coy/sync.json` when present,
/// else defaults.
pub fn resolve_config(cli_config: Option<&Path>) -> Result<SyncConfig, CliError> {
    if let Some(path) = cli_config {
        return Ok(SyncConfig::load(path)?);
    }
    match default_config_path() {
        Some(path) if path.exists() => Ok(SyncConfig::load(path)?),
        _ => Ok(SyncConfig::default()),
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("coy").join("sync.json"))
}

/// Write to `output` and print its path, or print to stdout
pub fn write_output(rendered: &str, output: Option<&Path>) -> Result<(), CliError> {
    if let Some(path) = output {
        std::fs::write(path, rendered)?;
        println!("{}", path.display());
    } else {
        println!("{rendered}");
    }
    Ok(())
}
