//! Prompt template rendering.

use crate::{ChatMessage, MessageBlock, Role};
use std::collections::BTreeMap;
use storyline_error::{StorylineResult, WorkflowError, WorkflowErrorKind};

/// Named values substituted for `{placeholder}` markers.
pub type TemplateValues = BTreeMap<&'static str, String>;

/// Renders message blocks into chat messages.
///
/// Each enabled block has its `{key}` markers replaced from `values` and `<user>`
/// replaced with `user_name`. Blocks that render blank are dropped. A block with an
/// empty role continues the previous message on a new line; with no previous
/// message it is dropped.
///
/// # Errors
///
/// Fails on a role other than `system`, `user`, `assistant` or empty.
///
/// # Examples
///
/// ```
/// use storyline_core::{MessageBlock, Role, TemplateValues, render_messages};
///
/// let blocks = vec![
///     MessageBlock { role: "system".into(), content: "Narrate for <user>.".into(), enable: true },
///     MessageBlock { role: "".into(), content: "{hint}".into(), enable: true },
///     MessageBlock { role: "user".into(), content: "{input}".into(), enable: true },
/// ];
/// let mut values = TemplateValues::new();
/// values.insert("hint", String::new());
/// values.insert("input", "Open the door".into());
///
/// let messages = render_messages(&blocks, &values, "Mira").unwrap();
/// assert_eq!(messages.len(), 2);
/// assert_eq!(messages[0].content, "Narrate for Mira.");
/// assert_eq!(messages[1].role, Role::User);
/// ```
pub fn render_messages(
    blocks: &[MessageBlock],
    values: &TemplateValues,
    user_name: &str,
) -> StorylineResult<Vec<ChatMessage>> {
    let mut messages: Vec<ChatMessage> = Vec::new();

    for block in blocks.iter().filter(|b| b.enable) {
        let content = fill(&block.content, values).replace("<user>", user_name);
        if content.trim().is_empty() {
            continue;
        }

        let role = block.role.trim();
        if role.is_empty() {
            if let Some(previous) = messages.last_mut() {
                previous.content.push('\n');
                previous.content.push_str(content.trim());
            }
            continue;
        }

        let role = role.parse::<Role>().map_err(|_| {
            WorkflowError::new(WorkflowErrorKind::Template(format!(
                "unknown message role '{}'",
                block.role
            )))
        })?;
        messages.push(ChatMessage::new(role, content.trim()));
    }

    Ok(messages)
}

/// Replaces every `{key}` marker with its value. Unknown markers are kept.
pub fn fill(template: &str, values: &TemplateValues) -> String {
    values.iter().fold(template.to_string(), |text, (key, value)| {
        text.replace(&format!("{{{}}}", key), value)
    })
}
