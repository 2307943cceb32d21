//! Conversation log bookkeeping.
//!
//! [`ConversationLog`] caches the records of a [`ConversationStore`] and implements
//! the record-level half of the snapshot persistence protocol: locating the baseline
//! section for a commit, writing a committed section into the current assistant
//! record, and finding the latest sections for recovery. Every mutation is written
//! back to the store before the method returns.

use storyline_core::{
    ConversationRecord, Phase, SnapshotSection, Speaker, VariableSnapshot,
};
use storyline_error::{SnapshotError, SnapshotErrorKind, StorylineResult};
use storyline_interface::ConversationStore;
use tracing::{debug, info, instrument, warn};

/// Replaces full-width parentheses and lenticular brackets with ASCII brackets.
///
/// # Examples
///
/// ```
/// use storyline_storage::normalize_brackets;
///
/// assert_eq!(normalize_brackets("（whispers）【aside】"), "(whispers)[aside]");
/// ```
pub fn normalize_brackets(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '（' => '(',
            '）' => ')',
            '【' => '[',
            '】' => ']',
            other => other,
        })
        .collect()
}

/// Cached conversation log backed by a store.
#[derive(Debug)]
pub struct ConversationLog<S> {
    store: S,
    records: Vec<ConversationRecord>,
}

impl<S: ConversationStore> ConversationLog<S> {
    /// Loads the log from `store`.
    #[instrument(skip(store))]
    pub async fn open(store: S) -> StorylineResult<Self> {
        let records = store.read_all().await?;
        debug!(count = records.len(), "Opened conversation log");
        Ok(Self { store, records })
    }

    /// Re-reads the records from the store.
    pub async fn reload(&mut self) -> StorylineResult<()> {
        self.records = self.store.read_all().await?;
        Ok(())
    }

    /// Underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// All records, oldest first.
    pub fn records(&self) -> &[ConversationRecord] {
        &self.records
    }

    /// Whether the log has no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Highest layer in the log, or 0 when empty.
    pub fn max_layer(&self) -> u32 {
        self.records.iter().map(|r| *r.layer()).max().unwrap_or(0)
    }

    /// Newest record.
    pub fn last(&self) -> Option<&ConversationRecord> {
        self.records.last()
    }

    /// Newest user input, if any.
    pub fn latest_user_text(&self) -> Option<&str> {
        self.records
            .iter()
            .rev()
            .find(|r| *r.speaker() == Speaker::User)
            .map(|r| r.content().as_str())
    }

    /// Assistant record on the current max layer.
    pub fn current_assistant(&self) -> Option<&ConversationRecord> {
        let layer = self.max_layer();
        self.records
            .iter()
            .rev()
            .find(|r| *r.layer() == layer && *r.speaker() == Speaker::Assistant)
    }

    fn current_assistant_mut(&mut self) -> StorylineResult<&mut ConversationRecord> {
        let layer = self.max_layer();
        self.records
            .iter_mut()
            .rev()
            .find(|r| *r.layer() == layer && *r.speaker() == Speaker::Assistant)
            .ok_or_else(|| SnapshotError::new(SnapshotErrorKind::NoCurrentAssistant(layer)).into())
    }

    fn next_id(&self) -> u64 {
        self.records.iter().map(|r| *r.id()).max().unwrap_or(0) + 1
    }

    async fn persist(&self) -> StorylineResult<()> {
        self.store.write_all(&self.records).await
    }

    /// Writes the opening assistant record on layer 1.
    ///
    /// Returns `false` without touching the store when the log already has records.
    #[instrument(skip_all)]
    pub async fn initialize(
        &mut self,
        content: impl Into<String>,
        scene: Option<String>,
        summary: Option<String>,
        snapshot: VariableSnapshot,
    ) -> StorylineResult<bool> {
        if !self.records.is_empty() {
            debug!("Conversation log already initialized");
            return Ok(false);
        }

        let mut opening = ConversationRecord::assistant(1, 1, content, scene, summary);
        *opening.snapshot_mut() = snapshot;
        self.records = vec![opening];
        self.persist().await?;
        info!("Initialized conversation log with opening record");
        Ok(true)
    }

    /// Appends user input and the assistant placeholder that will answer it.
    ///
    /// Full-width brackets are normalized first. Returns the new layer.
    ///
    /// # Errors
    ///
    /// Fails when the log is empty or already ends with a user record.
    #[instrument(skip(self, text), fields(length = text.len()))]
    pub async fn append_user_input(&mut self, text: &str) -> StorylineResult<u32> {
        let last = self
            .records
            .last()
            .ok_or_else(|| SnapshotError::new(SnapshotErrorKind::EmptyLog))?;
        if *last.speaker() == Speaker::User {
            return Err(SnapshotError::new(SnapshotErrorKind::SpeakerOrder(
                "the newest record is already user input".to_string(),
            ))
            .into());
        }

        let layer = last.layer() + 1;
        let user_id = self.next_id();
        self.records
            .push(ConversationRecord::user(user_id, layer, normalize_brackets(text)));
        self.records
            .push(ConversationRecord::placeholder(user_id + 1, layer));
        self.persist().await?;
        info!(layer, "Appended user input");
        Ok(layer)
    }

    /// Makes sure the current layer ends with an assistant record.
    ///
    /// Appends an empty placeholder after a trailing user record; otherwise a no-op.
    pub async fn ensure_placeholder(&mut self) -> StorylineResult<()> {
        let last = self
            .records
            .last()
            .ok_or_else(|| SnapshotError::new(SnapshotErrorKind::EmptyLog))?;
        if *last.speaker() == Speaker::User {
            let layer = *last.layer();
            let id = self.next_id();
            self.records.push(ConversationRecord::placeholder(id, layer));
            self.persist().await?;
            debug!(layer, "Added assistant placeholder");
        }
        Ok(())
    }

    /// Fills generated narrative into the current assistant record.
    #[instrument(skip_all, fields(length = content.len()))]
    pub async fn fill_assistant(
        &mut self,
        content: &str,
        scene: Option<String>,
        summary: Option<String>,
        reasoning: Option<String>,
    ) -> StorylineResult<()> {
        let record = self.current_assistant_mut()?;
        record.fill(content, scene, summary, reasoning);
        self.persist().await
    }

    /// Removes up to `count` newest records, always keeping the first.
    ///
    /// Returns how many records were removed.
    #[instrument(skip(self))]
    pub async fn delete_latest(&mut self, count: usize) -> StorylineResult<usize> {
        let removable = self.records.len().saturating_sub(1);
        let removed = count.min(removable);
        if removed == 0 {
            return Ok(0);
        }
        self.records.truncate(self.records.len() - removed);
        self.persist().await?;
        info!(removed, "Deleted newest records");
        Ok(removed)
    }

    /// Baseline section for a commit in `phase`.
    ///
    /// Reads the section from the assistant record one layer below the current max
    /// layer. Returns an empty section on the first layer, or when that record is
    /// missing or lacks the section, so a commit naming any variable fails.
    pub fn baseline(&self, phase: Phase) -> SnapshotSection {
        let max_layer = self.max_layer();
        if max_layer <= 1 {
            return SnapshotSection::new();
        }
        let target = max_layer - 1;
        let section = self
            .records
            .iter()
            .find(|r| *r.speaker() == Speaker::Assistant && *r.layer() == target)
            .and_then(|r| r.section(phase));
        if section.is_none() {
            warn!(layer = target, phase = %phase, "Baseline layer has no snapshot section");
        }
        section.cloned().unwrap_or_default()
    }

    /// Writes a committed section into the assistant record on the current max layer.
    #[instrument(skip(self, section), fields(phase = %phase, entries = section.len()))]
    pub async fn save_section(
        &mut self,
        phase: Phase,
        section: SnapshotSection,
    ) -> StorylineResult<()> {
        let record = self.current_assistant_mut()?;
        record.snapshot_mut().set_section(phase, section);
        let layer = *record.layer();
        self.persist().await?;
        info!(layer, "Saved snapshot section");
        Ok(())
    }

    /// Latest non-empty section written by `phase` anywhere in the log.
    pub fn latest_section(&self, phase: Phase) -> Option<&SnapshotSection> {
        self.records
            .iter()
            .rev()
            .filter(|r| *r.speaker() == Speaker::Assistant)
            .filter_map(|r| r.section(phase))
            .find(|section| !section.is_empty())
    }

    /// Merged state for recovery: the latest `post` section overlaid with the latest
    /// `pre` section.
    ///
    /// Returns `None` when the log holds no assistant records or no snapshots.
    pub fn latest_merged(&self) -> Option<SnapshotSection> {
        let post = self.latest_section(Phase::Post);
        let pre = self.latest_section(Phase::Pre);
        if post.is_none() && pre.is_none() {
            return None;
        }

        let mut merged = post.cloned().unwrap_or_default();
        if let Some(pre) = pre {
            merged.extend(pre.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Some(merged)
    }
}
