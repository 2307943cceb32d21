//! Volatile conversation store.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use storyline_core::ConversationRecord;
use storyline_error::StorylineResult;
use storyline_interface::ConversationStore;
use tokio::sync::RwLock;

/// Keeps the log in memory. Clones share the same records.
///
/// The write counter lets callers assert that an operation left the log untouched.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    records: Arc<RwLock<Option<Vec<ConversationRecord>>>>,
    writes: Arc<AtomicUsize>,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `write_all` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn exists(&self) -> StorylineResult<bool> {
        Ok(self.records.read().await.is_some())
    }

    async fn read_all(&self) -> StorylineResult<Vec<ConversationRecord>> {
        Ok(self.records.read().await.clone().unwrap_or_default())
    }

    async fn write_all(&self, records: &[ConversationRecord]) -> StorylineResult<()> {
        *self.records.write().await = Some(records.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
