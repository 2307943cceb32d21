//! Variable state engine for Storyline.
//!
//! Story state is a set of numeric [`Variable`]s. Each turn the
//! [`VariableManager`] recomputes them from text with keyword rules, or queues
//! fuzzy tasks that a language-model judge resolves in batches through the
//! [`TaskQueue`]. Results are committed as snapshot sections into the conversation
//! log, which is also where the latest state is recovered from.
//!
//! # Example
//!
//! ```
//! use storyline_core::Phase;
//! use storyline_storage::InlineTaskSource;
//! use storyline_variables::{TaskQueue, VariableManager};
//!
//! let definitions = r#"[{
//!     "name": "anger",
//!     "update_type": "keyword_appear",
//!     "update_config": {"rage": {"keywords": ["hate"], "min_value": 2, "max_value": 2}},
//!     "min_value": 0,
//!     "max_value": 10
//! }]"#;
//!
//! let mut manager = VariableManager::from_json(definitions, &InlineTaskSource::new()).unwrap();
//! let mut queue = TaskQueue::new(5);
//! let updates = manager.recalculate_all("I hate storms", Phase::Pre, &mut queue).unwrap();
//! assert_eq!(updates.len(), 1);
//! assert!(queue.is_empty());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod constraint;
mod definition;
mod judge;
mod manager;
mod stage;
mod task;
mod variable;

pub use constraint::{Condition, ConstraintElement, ConstraintSet, StageLookup};
pub use definition::load_variables;
pub use judge::{JudgeContext, JudgeStyle, Verdict, build_judge_request, extract_json, parse_verdicts};
pub use manager::{Registry, VariableManager};
pub use stage::{StageDescriptions, StageMethod, StageTrack};
pub use task::{AssembledTask, TaskInstance, TaskQueue, TaskType};
pub use variable::{
    Delta, KeywordGroup, ResetKind, ResetRule, UpdateKind, UpdateRule, Variable, VariableKind,
    VariableUpdate,
};
