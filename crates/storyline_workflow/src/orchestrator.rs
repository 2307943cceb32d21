//! Turn orchestration.
//!
//! A turn runs three phases in order:
//!
//! 1. **Pre-update** recomputes pre-phase variables from the user's input.
//! 2. **Create** streams the next narrative passage and writes it into the log.
//! 3. **Post-update** recomputes post-phase variables from that passage.
//!
//! Each update phase commits once, after all of its judge rounds. Raising the
//! stop signal abandons the running phase without committing, clears the task
//! queue, and keeps the remaining phases of the turn from running.

use crate::{NarrativeFields, StreamFilter, build_narrative_request, history_summary};
use std::sync::Arc;
use storyline_core::{ChatMethod, Outcome, Phase, StopSignal, StorylineConfig};
use storyline_error::{StorylineResult, WorkflowError, WorkflowErrorKind};
use storyline_interface::{ConversationStore, LlmDriver, StreamSinks, TokenSink};
use storyline_storage::ConversationLog;
use storyline_variables::{
    JudgeContext, JudgeStyle, TaskQueue, VariableManager, VariableUpdate, Verdict,
    build_judge_request,
};
use tracing::{debug, info, instrument, warn};

/// Where the workflow currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum WorkflowState {
    /// Waiting for input
    #[default]
    Idle,
    /// Recomputing pre-phase variables
    PreUpdate,
    /// Generating narrative
    Create,
    /// Recomputing post-phase variables
    PostUpdate,
    /// The last phase was stopped
    Stopped,
}

/// Drives turns against a conversation log.
pub struct Workflow<S: ConversationStore> {
    config: StorylineConfig,
    manager: VariableManager,
    log: ConversationLog<S>,
    queue: TaskQueue,
    judge: Arc<dyn LlmDriver>,
    narrator: Arc<dyn LlmDriver>,
    stop: StopSignal,
    state: WorkflowState,
    reasoning_sink: Option<TokenSink>,
    content_sink: Option<TokenSink>,
    filter_stream: bool,
    information: Vec<String>,
}

impl<S: ConversationStore> std::fmt::Debug for Workflow<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("state", &self.state)
            .field("judge", &self.judge.model_name())
            .field("narrator", &self.narrator.model_name())
            .field("records", &self.log.records().len())
            .field("queued", &self.queue.len())
            .finish()
    }
}

impl<S: ConversationStore> Workflow<S> {
    /// Creates a workflow. The batch size comes from the configuration.
    pub fn new(
        config: StorylineConfig,
        manager: VariableManager,
        log: ConversationLog<S>,
        judge: Arc<dyn LlmDriver>,
        narrator: Arc<dyn LlmDriver>,
    ) -> Self {
        let queue = TaskQueue::new(config.batch_size);
        Self {
            config,
            manager,
            log,
            queue,
            judge,
            narrator,
            stop: StopSignal::new(),
            state: WorkflowState::Idle,
            reasoning_sink: None,
            content_sink: None,
            filter_stream: false,
            information: Vec::new(),
        }
    }

    /// Installs display callbacks for streamed narrative.
    pub fn with_sinks(mut self, reasoning: Option<TokenSink>, content: Option<TokenSink>) -> Self {
        self.reasoning_sink = reasoning;
        self.content_sink = content;
        self
    }

    /// Shows only tagged sections of streamed narrative.
    pub fn with_stream_filter(mut self, enabled: bool) -> Self {
        self.filter_stream = enabled;
        self
    }

    /// Handle that stops the running phase.
    ///
    /// The signal stays raised until [`Workflow::run_turn`] or the caller lowers
    /// it, so phases started while it is raised do nothing and report
    /// [`Outcome::Stopped`].
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Current state.
    pub fn state(&self) -> WorkflowState {
        self.state
    }

    /// Configuration in use.
    pub fn config(&self) -> &StorylineConfig {
        &self.config
    }

    /// The variables.
    pub fn manager(&self) -> &VariableManager {
        &self.manager
    }

    /// The conversation log.
    pub fn log(&self) -> &ConversationLog<S> {
        &self.log
    }

    /// Tasks still queued. Empty whenever no phase is running.
    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    /// Diagnostics tails reported by collaborators, oldest first.
    pub fn information(&self) -> &[String] {
        &self.information
    }

    /// Writes the opening record, or restores the latest state when the log
    /// already exists.
    ///
    /// Returns whether the opening was written.
    #[instrument(skip_all)]
    pub async fn initialize(&mut self, opening: &str) -> StorylineResult<bool> {
        let fields = NarrativeFields::opening(opening, &self.config.user_name);
        let written = self
            .log
            .initialize(
                fields.main_body,
                fields.scene,
                fields.summary,
                self.manager.initial_snapshot(),
            )
            .await?;
        if !written {
            self.recover()?;
        }
        Ok(written)
    }

    /// Restores variables from the newest snapshot in the log.
    ///
    /// A log without snapshots leaves the initial values in place and returns `false`.
    pub fn recover(&mut self) -> StorylineResult<bool> {
        self.manager.restore_latest(&self.log)
    }

    /// Appends user input for the next turn. Returns the new layer.
    pub async fn submit_user_input(&mut self, text: &str) -> StorylineResult<u32> {
        self.log.append_user_input(text).await
    }

    /// Deletes up to `count` newest records and restores the state they leave.
    ///
    /// The opening record is always kept. Returns how many records were removed.
    #[instrument(skip(self))]
    pub async fn delete_messages(&mut self, count: usize) -> StorylineResult<usize> {
        let removed = self.log.delete_latest(count).await?;
        if removed > 0 {
            self.manager.restore_latest(&self.log)?;
        }
        Ok(removed)
    }

    /// Submits input and runs the three phases.
    ///
    /// The stop signal is lowered first; a stop raised during the turn ends it
    /// after the current phase, which reports [`Outcome::Stopped`].
    #[instrument(skip(self, text), fields(length = text.len()))]
    pub async fn run_turn(&mut self, text: &str) -> StorylineResult<Outcome<()>> {
        self.stop.reset();
        self.submit_user_input(text).await?;

        if self.run_pre_phase().await?.is_stopped() || self.stop.is_stopped() {
            return Ok(self.halt());
        }
        if self.run_create_phase().await?.is_stopped() || self.stop.is_stopped() {
            return Ok(self.halt());
        }
        if self.run_post_phase().await?.is_stopped() {
            return Ok(self.halt());
        }

        info!(layer = self.log.max_layer(), "Turn complete");
        Ok(Outcome::Completed(()))
    }

    /// Recomputes pre-phase variables from the latest user input and commits them.
    #[instrument(skip(self))]
    pub async fn run_pre_phase(&mut self) -> StorylineResult<Outcome<()>> {
        if !self.begin(WorkflowState::PreUpdate) {
            return self.finish(Ok(Outcome::Stopped));
        }
        let result = self.pre_phase().await;
        self.finish(result)
    }

    async fn pre_phase(&mut self) -> StorylineResult<Outcome<()>> {
        self.log.ensure_placeholder().await?;
        self.manager.restore_latest(&self.log)?;
        let text = self
            .log
            .latest_user_text()
            .ok_or_else(|| WorkflowError::new(WorkflowErrorKind::MissingUserInput))?
            .to_string();
        self.update_phase(Phase::Pre, &text).await
    }

    /// Generates the next passage and writes it into the current assistant record.
    #[instrument(skip(self))]
    pub async fn run_create_phase(&mut self) -> StorylineResult<Outcome<()>> {
        if !self.begin(WorkflowState::Create) {
            return self.finish(Ok(Outcome::Stopped));
        }
        let result = self.create_phase().await;
        self.finish(result)
    }

    async fn create_phase(&mut self) -> StorylineResult<Outcome<()>> {
        self.manager.restore_latest(&self.log)?;
        let input = self
            .log
            .latest_user_text()
            .ok_or_else(|| WorkflowError::new(WorkflowErrorKind::MissingUserInput))?
            .to_string();

        let request = build_narrative_request(
            &self.config,
            self.manager.registry(),
            self.log.records(),
            &input,
        )?;

        let content = match (&self.content_sink, self.filter_stream) {
            (Some(sink), true) => Some(StreamFilter::wrap(Arc::clone(sink))),
            (sink, _) => sink.clone(),
        };
        let sinks = StreamSinks::new(self.reasoning_sink.clone(), content);

        let response = match self.narrator.generate(&request, &sinks, &self.stop).await? {
            Outcome::Completed(response) => response,
            Outcome::Stopped => {
                info!("Narrative generation stopped");
                return Ok(Outcome::Stopped);
            }
        };
        self.note_information(&response.information);

        let fields = NarrativeFields::parse(&response.content);
        if fields.main_body.is_empty() {
            warn!("Narrative response has no <main_body> section");
        }
        let reasoning = Some(response.reasoning).filter(|r| !r.is_empty());
        self.log
            .fill_assistant(&fields.main_body, fields.scene, fields.summary, reasoning)
            .await?;
        info!(length = fields.main_body.len(), "Narrative written");
        Ok(Outcome::Completed(()))
    }

    /// Recomputes post-phase variables from the generated passage and commits them.
    #[instrument(skip(self))]
    pub async fn run_post_phase(&mut self) -> StorylineResult<Outcome<()>> {
        if !self.begin(WorkflowState::PostUpdate) {
            return self.finish(Ok(Outcome::Stopped));
        }
        let result = self.post_phase().await;
        self.finish(result)
    }

    async fn post_phase(&mut self) -> StorylineResult<Outcome<()>> {
        self.manager.restore_latest(&self.log)?;
        let text = match self.log.current_assistant() {
            Some(record) if !record.is_placeholder() => record.scene_prefixed_content(""),
            _ => {
                warn!("No generated passage on the current layer; skipping post-update");
                return Ok(Outcome::Completed(()));
            }
        };
        self.update_phase(Phase::Post, &text).await
    }

    async fn update_phase(&mut self, phase: Phase, text: &str) -> StorylineResult<Outcome<()>> {
        let result = self.judge_rounds(phase, text).await;
        self.queue.clear();

        let updates = match result? {
            Outcome::Completed(updates) => updates,
            Outcome::Stopped => {
                info!(phase = %phase, "Update phase stopped; nothing committed");
                return Ok(Outcome::Stopped);
            }
        };
        self.manager.apply_updates(&updates, &mut self.log).await?;
        Ok(Outcome::Completed(()))
    }

    /// Recompute pass followed by judge rounds until the queue drains.
    async fn judge_rounds(
        &mut self,
        phase: Phase,
        text: &str,
    ) -> StorylineResult<Outcome<Vec<VariableUpdate>>> {
        let style = match (phase, self.config.chat_method) {
            (Phase::Pre, ChatMethod::Guided) => JudgeStyle::Pre,
            _ => JudgeStyle::Post,
        };
        let summary = match style {
            JudgeStyle::Post => history_summary(
                self.log.records(),
                self.config.judge_memory_depth,
                self.config.chat_method,
            ),
            JudgeStyle::Pre => String::new(),
        };
        let templates = match style {
            JudgeStyle::Pre => &self.config.prompts.judge_pre,
            JudgeStyle::Post => &self.config.prompts.judge_post,
        };
        let context = JudgeContext {
            style,
            text,
            summary: &summary,
            templates,
            user_name: &self.config.user_name,
        };

        let mut updates = self.manager.recalculate_all(text, phase, &mut self.queue)?;
        let mut round = 0;
        while !self.queue.is_empty() {
            if self.stop.is_stopped() {
                return Ok(Outcome::Stopped);
            }
            round += 1;

            let manager = &self.manager;
            let assembled = self.queue.assemble_batch(|name| manager.value_of(name));
            let request = build_judge_request(&context, assembled)?;
            debug!(round, tasks = assembled.len(), "Judge round");

            let response = match self
                .judge
                .generate(&request, &StreamSinks::none(), &self.stop)
                .await?
            {
                Outcome::Completed(response) => response,
                Outcome::Stopped => return Ok(Outcome::Stopped),
            };
            if !response.information.is_empty() {
                self.information.push(response.information.clone());
            }

            for verdict in self.queue.resolve(&response.content)? {
                match verdict {
                    Verdict::Update(update) => updates.push(update),
                    Verdict::Anomaly {
                        variable,
                        task,
                        value,
                    } => {
                        warn!(%variable, %task, %value, "Discarding anomalous judge value");
                    }
                }
            }
        }

        debug!(phase = %phase, rounds = round, updates = updates.len(), "Judge rounds finished");
        Ok(Outcome::Completed(updates))
    }

    fn note_information(&mut self, information: &str) {
        if !information.is_empty() {
            self.information.push(information.to_string());
        }
    }

    /// Enters `state`. Returns `false` when a stop is already pending.
    fn begin(&mut self, state: WorkflowState) -> bool {
        self.state = state;
        if self.stop.is_stopped() {
            info!(state = %state, "Stop pending; phase skipped");
            return false;
        }
        info!(state = %state, "Phase started");
        true
    }

    fn finish(&mut self, result: StorylineResult<Outcome<()>>) -> StorylineResult<Outcome<()>> {
        self.state = match &result {
            Ok(Outcome::Stopped) => WorkflowState::Stopped,
            _ => WorkflowState::Idle,
        };
        result
    }

    fn halt(&mut self) -> Outcome<()> {
        self.queue.clear();
        self.state = WorkflowState::Stopped;
        info!("Turn stopped");
        Outcome::Stopped
    }
}
