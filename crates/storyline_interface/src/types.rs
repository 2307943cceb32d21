//! Data types shared by collaborator traits.

use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Callback receiving streamed tokens.
pub type TokenSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Push callbacks for streamed reasoning and content tokens.
///
/// Sinks only append to whatever display the caller owns; they never influence
/// generation.
#[derive(Clone, Default)]
pub struct StreamSinks {
    reasoning: Option<TokenSink>,
    content: Option<TokenSink>,
}

impl StreamSinks {
    /// Sinks that discard every token.
    pub fn none() -> Self {
        Self::default()
    }

    /// Sinks with the given callbacks.
    pub fn new(reasoning: Option<TokenSink>, content: Option<TokenSink>) -> Self {
        Self { reasoning, content }
    }

    /// Forward a reasoning token.
    pub fn emit_reasoning(&self, token: &str) {
        if let Some(sink) = &self.reasoning {
            sink(token);
        }
    }

    /// Forward a content token.
    pub fn emit_content(&self, token: &str) {
        if let Some(sink) = &self.content {
            sink(token);
        }
    }

    /// Whether a content callback is installed.
    pub fn has_content(&self) -> bool {
        self.content.is_some()
    }
}

impl std::fmt::Debug for StreamSinks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSinks")
            .field("reasoning", &self.reasoning.is_some())
            .field("content", &self.content.is_some())
            .finish()
    }
}

/// Text between the first `<tag>` and the following `</tag>`, trimmed.
fn tagged(text: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = text.find(&open)? + open.len();
    let end = text[start..].find(&close)? + start;
    Some(text[start..end].trim().to_string())
}

/// Name and description of a fuzzy judgment task.
///
/// # Examples
///
/// ```
/// use storyline_interface::TaskDefinition;
///
/// let task = TaskDefinition::parse("<name>tension</name>\n<description>Rate 0-5.</description>");
/// assert_eq!(task.name(), "tension");
/// assert_eq!(task.description(), "Rate 0-5.");
///
/// let partial = TaskDefinition::parse("no tags here");
/// assert!(partial.name().is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, Getters)]
pub struct TaskDefinition {
    /// Key the judge uses in its JSON response
    name: String,
    /// Instructions for the judge
    description: String,
}

impl TaskDefinition {
    /// Creates a definition.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }

    /// Parses `<name>` and `<description>` tags, tolerating either being absent.
    pub fn parse(text: &str) -> Self {
        let task = Self {
            name: tagged(text, "name").unwrap_or_default(),
            description: tagged(text, "description").unwrap_or_default(),
        };
        if task.name.is_empty() {
            tracing::warn!("Task definition has no <name> tag");
        }
        task
    }

    /// Rendered as `Task: name\ndescription` for judge prompts.
    pub fn render(&self) -> String {
        format!("Task: {}\n{}", self.name, self.description)
    }
}
