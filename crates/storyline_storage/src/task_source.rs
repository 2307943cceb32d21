//! Task definition sources.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use storyline_error::{StorageError, StorageErrorKind, StorylineResult};
use storyline_interface::{TaskDefinition, TaskSource};
use tracing::debug;

/// Reads task files relative to a base directory.
///
/// Absolute references and references that climb out of the base directory are
/// rejected.
#[derive(Debug, Clone)]
pub struct FileTaskSource {
    base_dir: PathBuf,
}

impl FileTaskSource {
    /// Creates a source rooted at `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Root directory.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn resolve(&self, reference: &str) -> StorylineResult<PathBuf> {
        let relative = Path::new(reference);
        let escapes = relative
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir));
        if relative.is_absolute() || relative.has_root() || escapes {
            return Err(StorageError::new(StorageErrorKind::InvalidPath(format!(
                "task reference must be relative to {}: {}",
                self.base_dir.display(),
                reference
            )))
            .into());
        }
        Ok(self.base_dir.join(relative))
    }
}

impl TaskSource for FileTaskSource {
    #[tracing::instrument(skip(self), fields(base = %self.base_dir.display()))]
    fn load(&self, reference: &str) -> StorylineResult<TaskDefinition> {
        let text = self.load_text(reference)?;
        Ok(TaskDefinition::parse(&text))
    }

    fn load_text(&self, reference: &str) -> StorylineResult<String> {
        let path = self.resolve(reference)?;
        debug!(path = %path.display(), "Reading task resource");
        std::fs::read_to_string(&path).map_err(|e| {
            StorageError::new(StorageErrorKind::FileRead(format!(
                "{}: {}",
                path.display(),
                e
            )))
            .into()
        })
    }
}

/// Task resources held in memory, keyed by reference.
#[derive(Debug, Clone, Default)]
pub struct InlineTaskSource {
    entries: HashMap<String, String>,
}

impl InlineTaskSource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a resource.
    pub fn with(mut self, reference: impl Into<String>, text: impl Into<String>) -> Self {
        self.entries.insert(reference.into(), text.into());
        self
    }
}

impl TaskSource for InlineTaskSource {
    fn load(&self, reference: &str) -> StorylineResult<TaskDefinition> {
        Ok(TaskDefinition::parse(&self.load_text(reference)?))
    }

    fn load_text(&self, reference: &str) -> StorylineResult<String> {
        self.entries.get(reference).cloned().ok_or_else(|| {
            StorageError::new(StorageErrorKind::FileRead(format!(
                "no inline resource named {}",
                reference
            )))
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_source_reads_relative_paths() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("tasks")).unwrap();
        std::fs::write(
            dir.path().join("tasks/tension.txt"),
            "<name>tension</name><description>Rate it</description>",
        )
        .unwrap();

        let source = FileTaskSource::new(dir.path());
        let task = source.load("tasks/tension.txt").unwrap();
        assert_eq!(task.name(), "tension");
        assert!(source.load("tasks/missing.txt").is_err());
    }

    #[test]
    fn test_file_source_rejects_escaping_paths() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = FileTaskSource::new(dir.path());
        assert!(source.load_text("/etc/hostname").is_err());
        assert!(source.load_text("../secret.txt").is_err());
    }

    #[test]
    fn test_inline_source() {
        let source = InlineTaskSource::new().with("t", "<name>n</name>");
        assert_eq!(source.load("t").unwrap().name(), "n");
        assert!(source.load("other").is_err());
    }
}
