//! Variables and their update and reset rules.

use crate::{ConstraintSet, StageLookup, StageTrack, TaskInstance, TaskQueue, TaskType};
use rand::Rng;
use serde::{Deserialize, Serialize};
use storyline_core::{Phase, StageDescription, StageTransition, StageValue, round_one_decimal};
use storyline_error::StorylineResult;
use storyline_interface::TaskDefinition;
use tracing::debug;

/// Whether a variable carries a stage track.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum VariableKind {
    /// Plain numeric record
    Record,
    /// Drives a stage track
    StageIndependent,
}

/// Update rule selector, as spelled in definitions.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum UpdateKind {
    /// Every keyword occurrence scores
    KeywordCount,
    /// Each matching group scores once
    KeywordAppear,
    /// Judged by the language model
    LlmFuzzy,
}

/// Reset rule selector, as spelled in definitions.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ResetKind {
    /// Any keyword resets
    Keyword,
    /// Judged by the language model
    Llm,
}

/// Keywords that share one score range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordGroup {
    /// Keywords, matched case-insensitively
    pub keywords: Vec<String>,
    /// Lower end of the score range
    pub min_value: f64,
    /// Upper end of the score range
    pub max_value: f64,
}

impl KeywordGroup {
    /// Non-overlapping, case-insensitive occurrences of all keywords in `lowered`.
    fn count_in(&self, lowered: &str) -> usize {
        self.keywords
            .iter()
            .filter(|k| !k.is_empty())
            .map(|k| lowered.matches(&k.to_lowercase()).count())
            .sum()
    }

    fn appears_in(&self, lowered: &str) -> bool {
        self.keywords
            .iter()
            .filter(|k| !k.is_empty())
            .any(|k| lowered.contains(&k.to_lowercase()))
    }

    /// Random score in the group's range.
    ///
    /// The range is split into 100 steps and one step in `1..=100` is drawn, so the
    /// lower end itself is never drawn unless the range is empty.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let step: u32 = rng.gen_range(1..=100);
        round_one_decimal(self.min_value + (self.max_value - self.min_value) * f64::from(step) / 100.0)
    }
}

/// How a variable's value changes.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateRule {
    /// Score every keyword occurrence per group
    KeywordCount(Vec<KeywordGroup>),
    /// Score each matching group once
    KeywordAppear(Vec<KeywordGroup>),
    /// Ask the judge
    LlmFuzzy(TaskDefinition),
}

impl UpdateRule {
    /// Selector of this rule.
    pub fn kind(&self) -> UpdateKind {
        match self {
            UpdateRule::KeywordCount(_) => UpdateKind::KeywordCount,
            UpdateRule::KeywordAppear(_) => UpdateKind::KeywordAppear,
            UpdateRule::LlmFuzzy(_) => UpdateKind::LlmFuzzy,
        }
    }
}

/// When a variable returns to its reset value.
#[derive(Debug, Clone, PartialEq)]
pub enum ResetRule {
    /// Any keyword appears (case-insensitive substring)
    Keyword(Vec<String>),
    /// Ask the judge
    Llm(TaskDefinition),
}

/// Change requested for one variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Delta {
    /// Added to the baseline value
    Numeric(f64),
    /// Replace with the variable's reset value
    Reset,
}

/// Result of a rule or judge verdict, applied at commit.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableUpdate {
    /// Target variable
    pub variable: String,
    /// Requested change
    pub delta: Delta,
}

impl VariableUpdate {
    /// A numeric change.
    pub fn numeric(variable: impl Into<String>, delta: f64) -> Self {
        Self {
            variable: variable.into(),
            delta: Delta::Numeric(delta),
        }
    }

    /// A reset.
    pub fn reset(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            delta: Delta::Reset,
        }
    }
}

/// A tracked story variable.
///
/// Values are always clamped to `[min, max]` and rounded to one decimal. Stage
/// fields exist exactly when the kind is [`VariableKind::StageIndependent`].
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub(crate) name: String,
    pub(crate) initial: f64,
    pub(crate) value: f64,
    pub(crate) min: f64,
    pub(crate) max: f64,
    pub(crate) phase: Phase,
    pub(crate) update: UpdateRule,
    pub(crate) reset: Option<ResetRule>,
    pub(crate) reset_value: f64,
    pub(crate) constraints: ConstraintSet,
    pub(crate) stage: Option<StageTrack>,
    pub(crate) stage_transition: Option<StageTransition>,
}

impl Variable {
    /// Unique name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared initial value.
    pub fn initial_value(&self) -> f64 {
        self.initial
    }

    /// Current value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// `[min, max]` bounds.
    pub fn bounds(&self) -> (f64, f64) {
        (self.min, self.max)
    }

    /// Phase this variable is recomputed in.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Record or stage-independent.
    pub fn kind(&self) -> VariableKind {
        if self.stage.is_some() {
            VariableKind::StageIndependent
        } else {
            VariableKind::Record
        }
    }

    /// Update rule.
    pub fn update_rule(&self) -> &UpdateRule {
        &self.update
    }

    /// Reset rule, if any.
    pub fn reset_rule(&self) -> Option<&ResetRule> {
        self.reset.as_ref()
    }

    /// Value applied on reset.
    pub fn reset_value(&self) -> f64 {
        self.reset_value
    }

    /// Update constraints.
    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    /// Stage track of a stage-independent variable.
    pub fn stage_track(&self) -> Option<&StageTrack> {
        self.stage.as_ref()
    }

    /// Current stage, recomputed from the value.
    pub fn stage_value(&self) -> Option<StageValue> {
        self.stage.as_ref().map(|track| track.compute(self.value).0)
    }

    /// Current stage description, recomputed from the value.
    pub fn stage_description(&self) -> Option<StageDescription> {
        self.stage.as_ref().map(|track| track.compute(self.value).1)
    }

    /// Stage change recorded by the last commit.
    pub fn stage_transition(&self) -> Option<&StageTransition> {
        self.stage_transition.as_ref()
    }

    /// Clamps to the bounds and rounds to one decimal.
    pub(crate) fn normalize(&self, value: f64) -> f64 {
        round_one_decimal(value.clamp(self.min, self.max))
    }

    /// Restores persisted state.
    pub(crate) fn restore(&mut self, value: f64, transition: Option<StageTransition>) {
        self.value = value;
        self.stage_transition = if self.stage.is_some() { transition } else { None };
    }

    /// Evaluates the update rule against `text`.
    ///
    /// Keyword rules return a numeric update when the total score is non-zero. The
    /// fuzzy rule enqueues an update task and returns nothing. Nothing happens while
    /// the constraint set is unsatisfied.
    pub fn update<R: Rng + ?Sized>(
        &self,
        text: &str,
        stages: &impl StageLookup,
        rng: &mut R,
        queue: &mut TaskQueue,
    ) -> StorylineResult<Option<VariableUpdate>> {
        if !self.constraints.satisfied(stages)? {
            debug!(variable = %self.name, "Update skipped, constraints unsatisfied");
            return Ok(None);
        }

        let lowered = text.to_lowercase();
        let total = match &self.update {
            UpdateRule::KeywordCount(groups) => groups
                .iter()
                .map(|group| match group.count_in(&lowered) {
                    0 => 0.0,
                    count => count as f64 * group.draw(rng),
                })
                .sum::<f64>(),
            UpdateRule::KeywordAppear(groups) => groups
                .iter()
                .filter(|group| group.appears_in(&lowered))
                .map(|group| group.draw(rng))
                .sum::<f64>(),
            UpdateRule::LlmFuzzy(definition) => {
                queue.push(TaskInstance::new(&self.name, TaskType::Update, definition.clone()));
                return Ok(None);
            }
        };

        if total == 0.0 {
            return Ok(None);
        }
        debug!(variable = %self.name, delta = total, "Keyword update");
        Ok(Some(VariableUpdate::numeric(&self.name, total)))
    }

    /// Evaluates the reset rule against `text`.
    ///
    /// The keyword rule returns a reset when any keyword appears. The judged rule
    /// enqueues a reset task and returns nothing.
    pub fn reset(&self, text: &str, queue: &mut TaskQueue) -> Option<VariableUpdate> {
        match self.reset.as_ref()? {
            ResetRule::Keyword(keywords) => {
                let lowered = text.to_lowercase();
                let hit = keywords
                    .iter()
                    .filter(|k| !k.is_empty())
                    .any(|k| lowered.contains(&k.to_lowercase()));
                if hit {
                    debug!(variable = %self.name, "Keyword reset");
                    Some(VariableUpdate::reset(&self.name))
                } else {
                    None
                }
            }
            ResetRule::Llm(definition) => {
                queue.push(TaskInstance::new(&self.name, TaskType::Reset, definition.clone()));
                None
            }
        }
    }
}
