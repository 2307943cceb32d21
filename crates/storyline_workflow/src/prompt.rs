//! Narrative prompt assembly.

use crate::{history_summary, inject_lore};
use storyline_core::{
    ConversationRecord, GenerateRequest, StorylineConfig, TemplateValues, render_messages,
};
use storyline_error::{StorylineResult, WorkflowError, WorkflowErrorKind};
use storyline_variables::Registry;
use tracing::{debug, instrument};

/// Builds the streamed narrative request for the current turn.
///
/// The templates in `prompts.narrative` receive `{chat_history}`, `{user}`,
/// `{length_limit}`, `{current_input}`, `{position_0}`, `{position_1}` and
/// `{temporary_hint}`. Lore activation reads the same history summary that
/// fills `{chat_history}`.
///
/// # Errors
///
/// Fails when lore substitution fails or the templates render no messages.
#[instrument(skip_all, fields(records = records.len(), input = current_input.len()))]
pub fn build_narrative_request(
    config: &StorylineConfig,
    registry: &Registry,
    records: &[ConversationRecord],
    current_input: &str,
) -> StorylineResult<GenerateRequest> {
    let history = history_summary(records, config.memory_depth, config.chat_method);
    let lore = inject_lore(&config.lore, registry, &history)?;

    let mut values = TemplateValues::new();
    values.insert("chat_history", history);
    values.insert("user", config.user_name.clone());
    values.insert("length_limit", config.length_limit_text());
    values.insert("current_input", current_input.to_string());
    values.insert("position_0", lore.position_0);
    values.insert("position_1", lore.position_1);
    values.insert("temporary_hint", lore.temporary_hint);

    let messages = render_messages(&config.prompts.narrative, &values, &config.user_name)?;
    if messages.is_empty() {
        return Err(WorkflowError::new(WorkflowErrorKind::EmptyPrompt(
            "narrative".to_string(),
        ))
        .into());
    }

    debug!(messages = messages.len(), "Built narrative prompt");
    Ok(GenerateRequest {
        messages,
        ..Default::default()
    })
}
