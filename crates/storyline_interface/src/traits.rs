//! Trait definitions for collaborators.

use crate::{StreamSinks, TaskDefinition};
use async_trait::async_trait;
use storyline_core::{ConversationRecord, GenerateRequest, GenerateResponse, Outcome, StopSignal};
use storyline_error::StorylineResult;

/// Core trait that every language-model backend implements.
///
/// Judge calls set `request.json_mode` and pass sinks without a content callback.
/// Narrative calls stream tokens through `sinks` as they arrive. Implementations
/// check `stop` between chunks and return [`Outcome::Stopped`] once it is raised.
#[async_trait]
pub trait LlmDriver: Send + Sync {
    /// Generate a response for the request.
    async fn generate(
        &self,
        request: &GenerateRequest,
        sinks: &StreamSinks,
        stop: &StopSignal,
    ) -> StorylineResult<Outcome<GenerateResponse>>;

    /// Backend name (e.g. "openai-compatible", "scripted").
    fn provider_name(&self) -> &'static str;

    /// Model identifier.
    fn model_name(&self) -> &str;
}

/// Whole-file persistence for the conversation log.
///
/// The log is small and written back in full after every mutation.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Whether a log has been written before.
    async fn exists(&self) -> StorylineResult<bool>;

    /// Reads every record, oldest first. A missing log reads as empty.
    async fn read_all(&self) -> StorylineResult<Vec<ConversationRecord>>;

    /// Replaces the stored log.
    async fn write_all(&self, records: &[ConversationRecord]) -> StorylineResult<()>;
}

/// Resolves a task reference from a variable definition into its text.
pub trait TaskSource: Send + Sync {
    /// Loads the definition named by `reference`.
    ///
    /// Missing `<name>` or `<description>` tags yield empty fields rather than errors.
    fn load(&self, reference: &str) -> StorylineResult<TaskDefinition>;

    /// Loads a raw text resource (for example a keyword table) named by `reference`.
    fn load_text(&self, reference: &str) -> StorylineResult<String>;
}
