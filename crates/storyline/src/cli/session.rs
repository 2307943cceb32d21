//! Session command handlers.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use storyline::{
    ConversationLog, FileTaskSource, JsonError, JsonFileStore, LlmDriver, Outcome, Phase,
    ScriptedDriver, StorageError, StorageErrorKind, StorylineConfig, StorylineResult, TaskQueue,
    TokenSink, Workflow, history_summary,
};
use tracing::{info, instrument};

fn read_file(path: &Path) -> StorylineResult<String> {
    std::fs::read_to_string(path).map_err(|e| {
        StorageError::new(StorageErrorKind::FileRead(format!("{}: {}", path.display(), e))).into()
    })
}

/// Judge and narrator drivers replaying a reply script.
fn scripted_drivers(path: &Path) -> StorylineResult<(Arc<dyn LlmDriver>, Arc<dyn LlmDriver>)> {
    let text = read_file(path)?;
    let script: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| JsonError::new(format!("Invalid reply script {}: {}", path.display(), e)))?;
    let replies = |key: &str| {
        script
            .get(key)
            .cloned()
            .unwrap_or_else(|| serde_json::Value::Array(Vec::new()))
            .to_string()
    };
    let judge: Arc<dyn LlmDriver> = Arc::new(ScriptedDriver::from_json("judge", &replies("judge"))?);
    let narrator: Arc<dyn LlmDriver> =
        Arc::new(ScriptedDriver::from_json("narrator", &replies("narrator"))?);
    Ok((judge, narrator))
}

/// A workflow over the on-disk conversation log.
pub struct Session {
    workflow: Workflow<JsonFileStore>,
}

impl Session {
    /// Loads variables and the conversation log named by the configuration.
    ///
    /// Without a reply script, collaborators that are asked for anything fail.
    #[instrument(skip_all)]
    pub async fn open(config: StorylineConfig, replies: Option<&Path>) -> StorylineResult<Self> {
        let definitions = read_file(&config.paths.variables)?;
        let source = FileTaskSource::new(&config.paths.task_dir);
        let manager = storyline::VariableManager::from_json(&definitions, &source)?;
        let log = ConversationLog::open(JsonFileStore::new(&config.paths.conversation_log)).await?;
        manager_summary(&manager);

        let (judge, narrator) = match replies {
            Some(path) => scripted_drivers(path)?,
            None => {
                let offline: Arc<dyn LlmDriver> = Arc::new(ScriptedDriver::new("offline", []));
                (Arc::clone(&offline), offline)
            }
        };

        let mut workflow = Workflow::new(config, manager, log, judge, narrator);
        workflow.recover()?;
        Ok(Self { workflow })
    }

    /// Writes the opening record.
    pub async fn init(&mut self, opening: Option<&Path>) -> StorylineResult<()> {
        let path = opening
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.workflow.config().paths.opening.clone());
        let text = read_file(&path)?;
        if self.workflow.initialize(&text).await? {
            println!("Conversation started from {}", path.display());
        } else {
            println!("Conversation already exists; nothing written");
        }
        Ok(())
    }

    /// Runs one turn, streaming the narrative to stdout.
    pub async fn say(self, text: &str, filtered: bool) -> StorylineResult<()> {
        let sink: TokenSink = Arc::new(|token: &str| {
            print!("{}", token);
            let _ = std::io::stdout().flush();
        });
        let mut workflow = self
            .workflow
            .with_sinks(None, Some(sink))
            .with_stream_filter(filtered);

        match workflow.run_turn(text).await? {
            Outcome::Completed(()) => {
                println!();
                for line in workflow.information() {
                    info!(information = %line, "Collaborator diagnostics");
                }
            }
            Outcome::Stopped => println!("\n[stopped]"),
        }
        Self { workflow }.print_state();
        Ok(())
    }

    /// Prints every variable with its stage.
    pub fn print_state(&self) {
        for variable in self.workflow.manager().variables() {
            let stage = match (variable.stage_value(), variable.stage_description()) {
                (Some(value), Some(description)) => format!("  stage {} ({})", value, description),
                _ => String::new(),
            };
            println!(
                "{:<20} {:>8.1}  [{}]{}",
                variable.name(),
                variable.value(),
                variable.phase(),
                stage
            );
        }
    }

    /// Deletes the newest records.
    pub async fn undo(&mut self, count: usize) -> StorylineResult<()> {
        let removed = self.workflow.delete_messages(count).await?;
        println!("Deleted {} record(s)", removed);
        self.print_state();
        Ok(())
    }

    /// Shows what keyword rules would do with `text`, and which tasks a judge
    /// would be asked. Nothing is committed.
    pub fn recalc(&self, text: &str, phase: Phase) -> StorylineResult<()> {
        let mut manager = storyline::VariableManager::new(
            self.workflow.manager().variables().to_vec(),
        )?;
        let mut queue = TaskQueue::new(self.workflow.config().batch_size);
        for update in manager.recalculate_all(text, phase, &mut queue)? {
            println!("{:<20} {:?}", update.variable, update.delta);
        }
        while !queue.is_empty() {
            for task in queue.assemble_batch(|name| manager.value_of(name)) {
                println!("judge task: {} (current {})", task.name, task.current_value);
            }
            queue.take_pending();
        }
        Ok(())
    }

    /// Prints the narrator's history summary.
    pub fn print_history(&self, depth: Option<u32>) {
        let config = self.workflow.config();
        let depth = depth.unwrap_or(config.memory_depth);
        println!(
            "{}",
            history_summary(self.workflow.log().records(), depth, config.chat_method)
        );
    }
}

fn manager_summary(manager: &storyline::VariableManager) {
    let pre = manager
        .variables()
        .iter()
        .filter(|v| v.phase() == Phase::Pre)
        .count();
    info!(
        variables = manager.variables().len(),
        pre,
        post = manager.variables().len() - pre,
        "Loaded variables"
    );
}
