//! Conversation log persistence for Storyline.
//!
//! The conversation log is the only durable store: every committed variable value
//! lives in a snapshot section of an assistant record. This crate provides:
//! - [`JsonFileStore`]: pretty-printed JSON file written atomically
//! - [`InMemoryStore`]: volatile store for tests and embedding
//! - [`ConversationLog`]: cached records plus the turn bookkeeping built on them
//! - [`FileTaskSource`] and [`InlineTaskSource`]: task definition lookup

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod conversation;
mod json_file;
mod memory;
mod task_source;

pub use conversation::{ConversationLog, normalize_brackets};
pub use json_file::JsonFileStore;
pub use memory::InMemoryStore;
pub use task_source::{FileTaskSource, InlineTaskSource};
