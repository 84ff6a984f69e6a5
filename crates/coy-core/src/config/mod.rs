//! Sync configuration.
//!
//! A `SyncConfig` is normally built from defaults, optionally overridden by a
//! JSON file shipped with the client or passed on the command line.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::MessageKind;

const DEFAULT_PAGE_SIZE: usize = 50;
const DEFAULT_MAX_EDITS: u8 = 2;
const DEFAULT_PROVISIONAL_MATCH_WINDOW_MS: i64 = 10_000;
const DEFAULT_FEED_BUFFER: usize = 64;

/// Tunables for timeline sync and optimistic updates
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Messages per page, for both the live feed and backward pagination
    pub page_size: usize,
    /// Edits allowed per message
    pub max_edits: u8,
    /// How far apart a provisional send and its server copy may be stamped
    /// and still be matched by content (ms)
    pub provisional_match_window_ms: i64,
    /// Snapshots buffered per feed subscriber before older ones are dropped
    pub feed_buffer: usize,
    /// Content shown for a deleted text message
    pub deleted_text_placeholder: String,
    /// Content shown for a deleted image or video
    pub deleted_media_placeholder: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_edits: DEFAULT_MAX_EDITS,
            provisional_match_window_ms: DEFAULT_PROVISIONAL_MATCH_WINDOW_MS,
            feed_buffer: DEFAULT_FEED_BUFFER,
            deleted_text_placeholder: "This message was deleted".to_string(),
            deleted_media_placeholder: "This media was deleted".to_string(),
        }
    }
}

impl SyncConfig {
    /// Parse and validate a JSON document. Missing fields keep defaults.
    pub fn from_json_str(payload: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(payload)
            .map_err(|error| Error::Config(format!("invalid sync config JSON: {error}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let payload = std::fs::read_to_string(path)?;
        tracing::debug!("Loaded sync config from {}", path.display());
        Self::from_json_str(&payload)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::Config("page_size must be greater than 0".to_string()));
        }
        if self.max_edits == 0 {
            return Err(Error::Config("max_edits must be greater than 0".to_string()));
        }
        if self.feed_buffer == 0 {
            return Err(Error::Config(
                "feed_buffer must be greater than 0".to_string(),
            ));
        }
        if self.provisional_match_window_ms < 0 {
            return Err(Error::Config(
                "provisional_match_window_ms must not be negative".to_string(),
            ));
        }
        if self.deleted_text_placeholder.trim().is_empty()
            || self.deleted_media_placeholder.trim().is_empty()
        {
            return Err(Error::Config(
                "deleted placeholders must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Placeholder content for a deleted message of `kind`
    #[must_use]
    pub fn deleted_placeholder(&self, kind: MessageKind) -> &str {
        if kind.is_media() {
            &self.deleted_media_placeholder
        } else {
            &self.deleted_text_placeholder
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let config = SyncConfig::default();
        assert_eq!(config.page_size, 50);
        assert_eq!(config.max_edits, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = SyncConfig::from_json_str(r#"{ "page_size": 20 }"#).unwrap();
        assert_eq!(config.page_size, 20);
        assert_eq!(config.max_edits, 2);
        assert_eq!(config.deleted_text_placeholder, "This message was deleted");
    }

    #[test]
    fn rejects_unknown_fields_and_zero_page_size() {
        let error = SyncConfig::from_json_str(r#"{ "pagesize": 20 }"#).unwrap_err();
        assert!(error.to_string().contains("unknown field"));

        let error = SyncConfig::from_json_str(r#"{ "page_size": 0 }"#).unwrap_err();
        assert!(error.to_string().contains("page_size"));
    }

    #[test]
    fn rejects_blank_placeholders() {
        let error = SyncConfig::from_json_str(r#"{ "deleted_media_placeholder": "   " }"#)
            .unwrap_err();
        assert!(matches!(error, Error::Config(_)));
    }

    #[test]
    fn placeholder_depends_on_kind() {
        let config = SyncConfig::default();
        assert_eq!(
            config.deleted_placeholder(MessageKind::Text),
            "This message was deleted"
        );
        assert_eq!(
            config.deleted_placeholder(MessageKind::Video),
            "This media was deleted"
        );
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "max_edits": 3, "feed_buffer": 8 }}"#).unwrap();

        let config = SyncConfig::load(file.path()).unwrap();
        assert_eq!(config.max_edits, 3);
        assert_eq!(config.feed_buffer, 8);
    }
}
