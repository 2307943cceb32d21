//! Turn workflow for the Storyline role-play state engine.
//!
//! [`Workflow`] runs each turn as pre-update, create and post-update phases over
//! a conversation log. This crate also assembles the narrative prompt: the
//! rolling [`history_summary`], positional lore from [`inject_lore`], and the
//! length instruction. Generated narrative is split into its tagged fields with
//! [`NarrativeFields`], and [`StreamFilter`] trims the live stream down to those
//! fields for display.
//!
//! [`ScriptedDriver`] replays canned replies and stands in for a language model
//! in tests and offline sessions.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod extract;
mod history;
mod lore;
mod orchestrator;
mod prompt;
mod scripted;
mod stream_filter;

pub use extract::{NarrativeFields, tagged_field};
pub use history::history_summary;
pub use lore::{LoreInjection, inject_lore};
pub use orchestrator::{Workflow, WorkflowState};
pub use prompt::build_narrative_request;
pub use scripted::{ScriptedDriver, ScriptedReply};
pub use stream_filter::{SYSTEM_TAGS, StreamFilter};
