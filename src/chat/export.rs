//! Export artifact for conversations.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::chat::types::Conversation;

/// Schema version written into export artifacts. Not checked on import.
pub const EXPORT_SCHEMA_VERSION: &str = "1.0.0";

/// Errors raised while reading an export artifact.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Reading or writing the file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not a valid export document.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Conversations plus export metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportData {
    /// Conversations, most recently updated first.
    pub conversations: Vec<Conversation>,
    /// When the export was taken.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub export_time: DateTime<Utc>,
    /// Schema version string.
    pub version: String,
}

impl ExportData {
    /// Pretty JSON form, as offered for download.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse an export document.
    ///
    /// # Errors
    /// Returns an error if the JSON does not match the export shape.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Download file name, e.g. `ai-chat-export-2024-05-01.json`.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("ai-chat-export-{}.json", self.export_time.format("%Y-%m-%d"))
    }
}

/// Write an export into `dir`.
///
/// Best effort: failures are logged and reported as `None`.
pub async fn write_export(dir: &Path, data: &ExportData) -> Option<PathBuf> {
    let json = match data.to_json_pretty() {
        Ok(json) => json,
        Err(err) => {
            warn!(?err, "Failed to serialize conversation export");
            return None;
        }
    };

    let path = dir.join(data.file_name());
    match tokio::fs::write(&path, json).await {
        Ok(()) => {
            info!(path = %path.display(), conversations = data.conversations.len(), "Conversations exported");
            Some(path)
        }
        Err(err) => {
            warn!(?err, path = %path.display(), "Failed to write conversation export");
            None
        }
    }
}

/// Read an export document from disk.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed.
pub async fn read_export(path: &Path) -> Result<ExportData, ExportError> {
    let json = tokio::fs::read_to_string(path).await?;
    Ok(ExportData::from_json(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(version: &str) -> ExportData {
        ExportData {
            conversations: Vec::new(),
            export_time: DateTime::from_timestamp_millis(1_714_521_600_000).unwrap(),
            version: version.to_string(),
        }
    }

    #[test]
    fn test_file_name_uses_export_date() {
        assert_eq!(sample("1.0.0").file_name(), "ai-chat-export-2024-05-01.json");
    }

    #[test]
    fn test_unknown_version_is_accepted() {
        let json = sample("0.0.1-legacy").to_json_pretty().unwrap();
        let parsed = ExportData::from_json(&json).unwrap();
        assert_eq!(parsed.version, "0.0.1-legacy");
        assert!(json.contains("exportTime"));
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = std::env::temp_dir().join(format!("agent-chat-export-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();

        let data = sample(EXPORT_SCHEMA_VERSION);
        let path = write_export(&dir, &data).await.unwrap();
        let read = read_export(&path).await.unwrap();
        assert_eq!(read, data);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_write_into_missing_dir_is_swallowed() {
        let dir = std::env::temp_dir()
            .join(format!("agent-chat-missing-{}", uuid::Uuid::new_v4()))
            .join("nested");
        assert!(write_export(&dir, &sample(EXPORT_SCHEMA_VERSION)).await.is_none());
    }
}
