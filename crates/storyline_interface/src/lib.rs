//! Collaborator trait definitions for the Storyline role-play state engine.
//!
//! The state engine talks to three kinds of collaborators:
//! - [`LlmDriver`] generates judge verdicts and narrative text
//! - [`ConversationStore`] persists the conversation log
//! - [`TaskSource`] resolves fuzzy-task definitions at load time

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod traits;
mod types;

pub use traits::{ConversationStore, LlmDriver, TaskSource};
pub use types::{StreamSinks, TaskDefinition, TokenSink};
