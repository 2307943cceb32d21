//! Error types for the Storyline role-play state engine.
//!
//! This crate provides the foundation error types used throughout the Storyline workspace.
//!
//! # Error Hierarchy
//!
//! All errors follow the `ErrorKind` + wrapper struct pattern:
//! - `*ErrorKind` enum defines specific error conditions
//! - `*Error` struct wraps the kind with source location tracking
//! - All errors use `#[track_caller]` for automatic location capture
//!
//! Cancellation is not an error. A stopped collaborator call is reported through
//! `storyline_core::Outcome::Stopped` instead.
//!
//! # Examples
//!
//! ```
//! use storyline_error::{StorylineResult, VariableError, VariableErrorKind};
//!
//! fn lookup(name: &str) -> StorylineResult<f64> {
//!     Err(VariableError::new(VariableErrorKind::UnknownVariable(name.to_string())))?
//! }
//!
//! assert!(lookup("mood").is_err());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod judge;
mod json;
mod snapshot;
mod storage;
mod variable;
mod workflow;

pub use config::ConfigError;
pub use error::{StorylineError, StorylineErrorKind, StorylineResult};
pub use judge::{JudgeError, JudgeErrorKind};
pub use json::JsonError;
pub use snapshot::{SnapshotError, SnapshotErrorKind};
pub use storage::{StorageError, StorageErrorKind};
pub use variable::{VariableError, VariableErrorKind};
pub use workflow::{WorkflowError, WorkflowErrorKind};
