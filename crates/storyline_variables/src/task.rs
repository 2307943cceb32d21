//! Fuzzy judgment tasks and batch assembly.

use derive_getters::Getters;
use std::collections::VecDeque;
use storyline_interface::TaskDefinition;
use tracing::{debug, warn};

/// What a judged task decides.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum TaskType {
    /// The judge scores a numeric change
    Update,
    /// The judge answers 1 to reset or 0 to keep
    Reset,
}

/// One queued judgment for one variable.
#[derive(Debug, Clone, PartialEq, Getters)]
pub struct TaskInstance {
    /// Target variable
    variable: String,
    /// Update or reset
    task_type: TaskType,
    /// Parsed task text
    definition: TaskDefinition,
}

impl TaskInstance {
    /// Creates a task.
    pub fn new(variable: impl Into<String>, task_type: TaskType, definition: TaskDefinition) -> Self {
        Self {
            variable: variable.into(),
            task_type,
            definition,
        }
    }

    /// Membership key used to deduplicate the pending group.
    pub fn key(&self) -> (&str, TaskType) {
        (&self.variable, self.task_type)
    }
}

/// Snapshot of a pending task as shown to the judge.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledTask {
    /// Task name, the key of the judge's answer
    pub name: String,
    /// Task instructions
    pub description: String,
    /// Value of the target variable when the batch was assembled
    pub current_value: f64,
}

impl AssembledTask {
    /// `Task: name\ndescription` block for the judge prompt.
    pub fn render(&self) -> String {
        format!("Task: {}\n{}", self.name, self.description)
    }
}

/// FIFO of queued tasks plus the pending group of the current judge round.
///
/// Each round moves at most `batch_size` tasks from the queue into the pending
/// group. Parsing the judge's answer empties the pending group again.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    queue: VecDeque<TaskInstance>,
    pending: Vec<TaskInstance>,
    assembly: Vec<AssembledTask>,
    batch_size: usize,
}

impl TaskQueue {
    /// Creates an empty queue. A zero batch size is raised to one.
    pub fn new(batch_size: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            pending: Vec::new(),
            assembly: Vec::new(),
            batch_size: batch_size.max(1),
        }
    }

    /// Maximum tasks per round.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Adds a task to the back of the queue.
    pub fn push(&mut self, task: TaskInstance) {
        debug!(variable = %task.variable, task_type = %task.task_type, "Queued task");
        self.queue.push_back(task);
    }

    /// Number of queued tasks, excluding the pending group.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether no tasks are queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Tasks of the current round.
    pub fn pending(&self) -> &[TaskInstance] {
        &self.pending
    }

    /// Judge view of the current round.
    pub fn assembly(&self) -> &[AssembledTask] {
        &self.assembly
    }

    /// Moves up to `batch_size` queued tasks into the pending group.
    ///
    /// A task whose membership key is already pending is dropped. `current_value`
    /// supplies each target variable's value for the assembly snapshot. The assembly
    /// list is rebuilt from the pending group on every call.
    pub fn assemble_batch(&mut self, current_value: impl Fn(&str) -> Option<f64>) -> &[AssembledTask] {
        while self.pending.len() < self.batch_size {
            let Some(task) = self.queue.pop_front() else {
                break;
            };
            if self.pending.iter().any(|p| p.key() == task.key()) {
                debug!(variable = %task.variable, task_type = %task.task_type, "Dropped duplicate task");
                continue;
            }
            self.pending.push(task);
        }

        self.assembly = self
            .pending
            .iter()
            .map(|task| AssembledTask {
                name: task.definition.name().clone(),
                description: task.definition.description().clone(),
                current_value: current_value(&task.variable).unwrap_or_else(|| {
                    warn!(variable = %task.variable, "Task targets an unknown variable");
                    0.0
                }),
            })
            .collect();
        debug!(pending = self.pending.len(), queued = self.queue.len(), "Assembled batch");
        &self.assembly
    }

    /// Empties the pending group and returns it in FIFO order.
    pub fn take_pending(&mut self) -> Vec<TaskInstance> {
        self.assembly.clear();
        std::mem::take(&mut self.pending)
    }

    /// Drops every queued and pending task.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.pending.clear();
        self.assembly.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(variable: &str, task_type: TaskType) -> TaskInstance {
        TaskInstance::new(
            variable,
            task_type,
            TaskDefinition::new(format!("{}_{}", variable, task_type), "judge it"),
        )
    }

    #[test]
    fn test_seven_tasks_drain_five_then_two() {
        let mut queue = TaskQueue::new(5);
        for i in 0..7 {
            queue.push(task(&format!("v{}", i), TaskType::Update));
        }

        assert_eq!(queue.assemble_batch(|_| Some(1.0)).len(), 5);
        assert_eq!(queue.take_pending().len(), 5);
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.assemble_batch(|_| Some(1.0)).len(), 2);
        assert_eq!(queue.take_pending().len(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_duplicate_key_dropped() {
        let mut queue = TaskQueue::new(5);
        queue.push(task("mood", TaskType::Update));
        queue.push(task("mood", TaskType::Update));
        queue.push(task("mood", TaskType::Reset));

        let assembled = queue.assemble_batch(|name| (name == "mood").then_some(4.5));
        assert_eq!(assembled.len(), 2);
        assert_eq!(assembled[0].current_value, 4.5);
        assert_eq!(assembled[1].name, "mood_reset");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_clear_drops_everything() {
        let mut queue = TaskQueue::new(1);
        queue.push(task("a", TaskType::Update));
        queue.push(task("b", TaskType::Update));
        queue.assemble_batch(|_| None);
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.pending().is_empty());
        assert!(queue.assembly().is_empty());
    }
}
