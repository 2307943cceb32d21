//! Core data types for the Storyline role-play state engine.
//!
//! This crate provides the data shared by every other Storyline crate: phases and
//! speakers, chat messages exchanged with language-model collaborators, stage values,
//! conversation records with their variable snapshots, the cooperative stop signal,
//! and the layered configuration.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod logging;
mod message;
mod outcome;
mod phase;
mod record;
mod request;
mod stage;
mod template;

pub use config::{
    BindingPart, BoundLore, ChatMethod, LoreConfig, MessageBlock, PathsConfig, PositionLore,
    PromptsConfig, SimpleLore, StorylineConfig,
};
pub use logging::init_tracing;
pub use message::{ChatMessage, Role};
pub use outcome::{Outcome, StopSignal};
pub use phase::{Phase, Speaker};
pub use record::{ConversationRecord, SnapshotEntry, SnapshotSection, VariableSnapshot};
pub use request::{GenerateRequest, GenerateResponse};
pub use stage::{StageDescription, StageTransition, StageValue, round_one_decimal};
pub use template::{TemplateValues, fill, render_messages};
