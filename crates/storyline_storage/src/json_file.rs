//! JSON file conversation store.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use storyline_core::ConversationRecord;
use storyline_error::{JsonError, StorageError, StorageErrorKind, StorylineResult};
use storyline_interface::ConversationStore;

/// Stores the whole conversation log in one pretty-printed JSON object.
///
/// The object maps each record id, as a decimal string, to the record body.
/// Records are read back in ascending id order.
///
/// Writes go to a sibling temp file first and are renamed into place, so a crash
/// mid-write leaves the previous log intact.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Creates a store backed by `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConversationStore for JsonFileStore {
    async fn exists(&self) -> StorylineResult<bool> {
        tokio::fs::try_exists(&self.path).await.map_err(|e| {
            StorageError::new(StorageErrorKind::FileRead(format!(
                "{}: {}",
                self.path.display(),
                e
            )))
            .into()
        })
    }

    #[tracing::instrument(skip(self), fields(path = %self.path.display()))]
    async fn read_all(&self) -> StorylineResult<Vec<ConversationRecord>> {
        if !self.exists().await? {
            tracing::debug!("Conversation log not found, starting empty");
            return Ok(Vec::new());
        }

        let text = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            StorageError::new(StorageErrorKind::FileRead(format!(
                "{}: {}",
                self.path.display(),
                e
            )))
        })?;

        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let keyed: BTreeMap<u64, ConversationRecord> =
            serde_json::from_str(&text).map_err(|e| {
                JsonError::new(format!(
                    "Failed to parse conversation log {}: {}",
                    self.path.display(),
                    e
                ))
            })?;
        let records: Vec<ConversationRecord> = keyed
            .into_iter()
            .map(|(id, record)| record.with_id(id))
            .collect();

        tracing::debug!(count = records.len(), "Read conversation log");
        Ok(records)
    }

    #[tracing::instrument(skip(self, records), fields(path = %self.path.display(), count = records.len()))]
    async fn write_all(&self, records: &[ConversationRecord]) -> StorylineResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::new(StorageErrorKind::DirectoryCreation(format!(
                    "{}: {}",
                    parent.display(),
                    e
                )))
            })?;
        }

        let keyed: BTreeMap<u64, &ConversationRecord> =
            records.iter().map(|record| (*record.id(), record)).collect();
        let text = serde_json::to_string_pretty(&keyed)
            .map_err(|e| JsonError::new(format!("Failed to serialize conversation log: {}", e)))?;

        // Write to temp file first, then rename for atomicity
        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, text).await.map_err(|e| {
            StorageError::new(StorageErrorKind::FileWrite(format!(
                "{}: {}",
                temp_path.display(),
                e
            )))
        })?;

        tokio::fs::rename(&temp_path, &self.path).await.map_err(|e| {
            StorageError::new(StorageErrorKind::FileWrite(format!(
                "rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            )))
        })?;

        tracing::debug!("Wrote conversation log");
        Ok(())
    }
}
