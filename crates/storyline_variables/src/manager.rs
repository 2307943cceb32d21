//! Variable registry, recompute pass and snapshot commits.

use crate::{
    Delta, StageLookup, TaskQueue, Variable, VariableUpdate, load_variables,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::{BTreeSet, HashMap};
use storyline_core::{Phase, SnapshotEntry, SnapshotSection, StageTransition, VariableSnapshot};
use storyline_error::{
    SnapshotError, SnapshotErrorKind, StorylineResult, VariableError, VariableErrorKind,
};
use storyline_interface::{ConversationStore, TaskSource};
use storyline_storage::ConversationLog;
use tracing::{debug, info, instrument};

/// Variables in registration order with a by-name index.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    variables: Vec<Variable>,
    index: HashMap<String, usize>,
}

impl Registry {
    /// Builds a registry, rejecting duplicate names.
    pub fn new(variables: Vec<Variable>) -> Result<Self, VariableError> {
        let mut index = HashMap::with_capacity(variables.len());
        for (position, variable) in variables.iter().enumerate() {
            if index.insert(variable.name.clone(), position).is_some() {
                return Err(VariableError::new(VariableErrorKind::DuplicateName(
                    variable.name.clone(),
                )));
            }
        }
        Ok(Self { variables, index })
    }

    /// Looks up a variable.
    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.index.get(name).map(|i| &self.variables[*i])
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut Variable> {
        self.index.get(name).map(|i| &mut self.variables[*i])
    }

    /// Variables in registration order.
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Registered names.
    pub fn names(&self) -> BTreeSet<&str> {
        self.index.keys().map(String::as_str).collect()
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

impl StageLookup for Registry {
    fn scalar_stage(&self, name: &str) -> Option<i64> {
        self.get(name)?.stage_value()?.as_scalar()
    }
}

/// Owns the live variables and moves them between turns.
///
/// The manager recomputes variables from text, commits results into the
/// conversation log as snapshot sections, and restores the latest committed state
/// from the log.
#[derive(Debug)]
pub struct VariableManager {
    registry: Registry,
    rng: StdRng,
}

impl VariableManager {
    /// Creates a manager with an entropy-seeded random source.
    pub fn new(variables: Vec<Variable>) -> StorylineResult<Self> {
        Ok(Self {
            registry: Registry::new(variables)?,
            rng: StdRng::from_entropy(),
        })
    }

    /// Creates a manager whose keyword scores are reproducible.
    pub fn with_seed(variables: Vec<Variable>, seed: u64) -> StorylineResult<Self> {
        Ok(Self {
            registry: Registry::new(variables)?,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Loads definitions and creates a manager.
    pub fn from_json(json: &str, source: &dyn TaskSource) -> StorylineResult<Self> {
        Self::new(load_variables(json, source)?)
    }

    /// The registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Looks up a variable.
    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.registry.get(name)
    }

    /// Variables in registration order.
    pub fn variables(&self) -> &[Variable] {
        self.registry.variables()
    }

    /// Current value of a variable.
    pub fn value_of(&self, name: &str) -> Option<f64> {
        self.registry.get(name).map(Variable::value)
    }

    /// One recompute pass over the variables of `phase`.
    ///
    /// Each variable is tried for a reset first; when the reset fires its update
    /// rule is skipped. Judged rules add tasks to `queue` instead of returning
    /// results.
    #[instrument(skip(self, text, queue), fields(phase = %phase, length = text.len()))]
    pub fn recalculate_all(
        &mut self,
        text: &str,
        phase: Phase,
        queue: &mut TaskQueue,
    ) -> StorylineResult<Vec<VariableUpdate>> {
        let Self { registry, rng } = self;
        let registry = &*registry;
        let mut results = Vec::new();

        for variable in registry.variables.iter().filter(|v| v.phase == phase) {
            if let Some(reset) = variable.reset(text, queue) {
                results.push(reset);
                continue;
            }
            if let Some(update) = variable.update(text, registry, rng, queue)? {
                results.push(update);
            }
        }

        debug!(results = results.len(), queued = queue.len(), "Recompute pass finished");
        Ok(results)
    }

    /// Commits update results into the current assistant record.
    ///
    /// The baseline section one layer below the current layer is restored into the
    /// registry first, values and stage transitions alike. Results are then applied
    /// in order, and each one sets the transition of its stage variable from the
    /// stage it found to the stage it left, or clears it when the stage held. The
    /// last result for a variable decides. Variables without results keep their
    /// baseline entry unchanged. Returns the written section, or `None` for an
    /// empty commit, which leaves the log alone.
    ///
    /// # Errors
    ///
    /// - results from both phases
    /// - a baseline name the registry does not know
    /// - a result for a variable absent from the baseline
    /// - no assistant record on the current layer
    #[instrument(skip_all, fields(updates = updates.len()))]
    pub async fn apply_updates<S: ConversationStore>(
        &mut self,
        updates: &[VariableUpdate],
        log: &mut ConversationLog<S>,
    ) -> StorylineResult<Option<SnapshotSection>> {
        let Some(first) = updates.first() else {
            debug!("Nothing to commit");
            return Ok(None);
        };

        let phase = self.phase_of(&first.variable)?;
        for update in updates {
            if self.phase_of(&update.variable)? != phase {
                return Err(SnapshotError::new(SnapshotErrorKind::MixedPhase(format!(
                    "'{}' is {} but '{}' is {}",
                    first.variable,
                    phase,
                    update.variable,
                    self.phase_of(&update.variable)?
                )))
                .into());
            }
        }

        let baseline = log.baseline(phase);
        for (name, entry) in &baseline {
            let variable = self.registry.get_mut(name).ok_or_else(|| {
                SnapshotError::new(SnapshotErrorKind::UnknownBaselineVariable(name.clone()))
            })?;
            variable.restore(entry.value, entry.stage_transition.clone());
        }

        for update in updates {
            if !baseline.contains_key(&update.variable) {
                return Err(SnapshotError::new(SnapshotErrorKind::MissingBaseline(
                    update.variable.clone(),
                ))
                .into());
            }
        }

        for update in updates {
            let variable = self
                .registry
                .get_mut(&update.variable)
                .ok_or_else(|| VariableError::new(VariableErrorKind::UnknownVariable(update.variable.clone())))?;
            let old_stage = variable.stage_value();
            let next = match update.delta {
                Delta::Reset => variable.reset_value,
                Delta::Numeric(delta) => variable.value + delta,
            };
            variable.value = variable.normalize(next);
            if let (Some(old), Some(new)) = (old_stage, variable.stage_value()) {
                variable.stage_transition = StageTransition::between(old, new);
            }
            debug!(
                variable = %variable.name,
                value = variable.value,
                transition = ?variable.stage_transition,
                "Applied update"
            );
        }

        let mut section = SnapshotSection::new();
        for name in baseline.keys() {
            let variable = self.registry.get(name).ok_or_else(|| {
                SnapshotError::new(SnapshotErrorKind::UnknownBaselineVariable(name.clone()))
            })?;
            section.insert(
                name.clone(),
                SnapshotEntry {
                    value: variable.value,
                    stage_transition: variable.stage_transition.clone(),
                },
            );
        }

        log.save_section(phase, section.clone()).await?;
        info!(phase = %phase, entries = section.len(), "Committed variable updates");
        Ok(Some(section))
    }

    fn phase_of(&self, name: &str) -> StorylineResult<Phase> {
        self.registry
            .get(name)
            .map(Variable::phase)
            .ok_or_else(|| VariableError::new(VariableErrorKind::UnknownVariable(name.to_string())).into())
    }

    /// Restores the latest committed state from the log.
    ///
    /// Returns `false` when the log holds no snapshots.
    ///
    /// # Errors
    ///
    /// Fails when the merged snapshot does not cover exactly the registered names.
    #[instrument(skip_all)]
    pub fn restore_latest<S: ConversationStore>(
        &mut self,
        log: &ConversationLog<S>,
    ) -> StorylineResult<bool> {
        let Some(merged) = log.latest_merged() else {
            debug!("No snapshot to restore");
            return Ok(false);
        };

        let registered = self.registry.names();
        let recorded: BTreeSet<&str> = merged.keys().map(String::as_str).collect();
        if registered != recorded {
            let join = |names: Vec<&&str>| {
                names.into_iter().copied().collect::<Vec<_>>().join(", ")
            };
            return Err(SnapshotError::new(SnapshotErrorKind::NameSetMismatch {
                missing_in_snapshot: join(registered.difference(&recorded).collect()),
                missing_in_registry: join(recorded.difference(&registered).collect()),
            })
            .into());
        }

        for (name, entry) in &merged {
            if let Some(variable) = self.registry.get_mut(name) {
                variable.restore(entry.value, entry.stage_transition.clone());
            }
        }
        debug!(restored = merged.len(), "Restored latest snapshot");
        Ok(true)
    }

    /// Snapshot of declared initial values for the opening record.
    ///
    /// Pre-update variables go into the `pre` section, the rest into `post`.
    pub fn initial_snapshot(&self) -> VariableSnapshot {
        let mut pre = SnapshotSection::new();
        let mut post = SnapshotSection::new();
        for variable in self.registry.variables() {
            let entry = SnapshotEntry {
                value: variable.initial,
                stage_transition: None,
            };
            match variable.phase {
                Phase::Pre => pre.insert(variable.name.clone(), entry),
                Phase::Post => post.insert(variable.name.clone(), entry),
            };
        }
        VariableSnapshot {
            pre: Some(pre),
            post: Some(post),
        }
    }
}
