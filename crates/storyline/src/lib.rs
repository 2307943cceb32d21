//! Storyline - turn-based role-play state engine
//!
//! Storyline tracks numeric story variables across the turns of a role-play
//! conversation. Variables are recomputed from text each turn, by keyword rules
//! or by a language-model judge, and every committed value is stored as a
//! snapshot inside the conversation log itself.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use storyline::{
//!     ConversationLog, FileTaskSource, JsonFileStore, ScriptedDriver, StorylineConfig,
//!     VariableManager, Workflow,
//! };
//!
//! # async fn example() -> storyline::StorylineResult<()> {
//! let config = StorylineConfig::load()?;
//! let definitions = std::fs::read_to_string(&config.paths.variables).unwrap();
//! let manager =
//!     VariableManager::from_json(&definitions, &FileTaskSource::new(&config.paths.task_dir))?;
//! let log = ConversationLog::open(JsonFileStore::new(&config.paths.conversation_log)).await?;
//!
//! let judge = Arc::new(ScriptedDriver::new("judge", []));
//! let narrator = Arc::new(ScriptedDriver::new("narrator", []));
//! let mut workflow = Workflow::new(config, manager, log, judge, narrator);
//! workflow.initialize("<main_body>The gate creaks open.</main_body>").await?;
//! workflow.run_turn("I step inside").await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! Storyline is organized as a workspace with focused crates:
//!
//! - `storyline_error` - Error types
//! - `storyline_core` - Shared data types and configuration
//! - `storyline_interface` - Collaborator traits (`LlmDriver`, `ConversationStore`, `TaskSource`)
//! - `storyline_storage` - Conversation log persistence
//! - `storyline_variables` - Variables, stages, constraints and the judge task queue
//! - `storyline_workflow` - Turn orchestration and narrative prompt assembly
//!
//! This crate (`storyline`) re-exports everything for convenience.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub use storyline_core::*;
pub use storyline_error::*;
pub use storyline_interface::*;
pub use storyline_storage::*;
pub use storyline_variables::*;
pub use storyline_workflow::*;
