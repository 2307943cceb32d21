//! Judge requests and verdicts.
//!
//! One judge round sends every assembled task to the collaborator in a single
//! request and reads back a JSON object mapping task names to values.

use crate::{AssembledTask, TaskInstance, TaskQueue, TaskType, VariableUpdate};
use serde_json::Value;
use storyline_core::{GenerateRequest, MessageBlock, TemplateValues, render_messages};
use storyline_error::{
    JudgeError, JudgeErrorKind, StorylineResult, WorkflowError, WorkflowErrorKind,
};
use tracing::{debug, instrument, warn};

/// Shape of the judge prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum JudgeStyle {
    /// Task definitions and the input text only
    Pre,
    /// Also the current task values and the rolling plot summary
    Post,
}

/// Inputs shared by every round of one phase.
#[derive(Debug, Clone, Copy)]
pub struct JudgeContext<'a> {
    /// Prompt shape
    pub style: JudgeStyle,
    /// Text being judged
    pub text: &'a str,
    /// Rolling narrative summary, used by post-style prompts
    pub summary: &'a str,
    /// Message templates for this style
    pub templates: &'a [MessageBlock],
    /// Substituted for `{user}` and `<user>`
    pub user_name: &'a str,
}

/// Builds the single judge request for an assembled batch.
///
/// # Errors
///
/// Fails when the templates are invalid or render no messages.
pub fn build_judge_request(
    context: &JudgeContext<'_>,
    assembled: &[AssembledTask],
) -> StorylineResult<GenerateRequest> {
    let mut values = TemplateValues::new();
    values.insert(
        "task_definitions",
        assembled
            .iter()
            .map(AssembledTask::render)
            .collect::<Vec<_>>()
            .join("\n"),
    );
    values.insert("current_input", context.text.to_string());
    values.insert("user", context.user_name.to_string());

    if context.style == JudgeStyle::Post {
        values.insert(
            "current_state",
            assembled
                .iter()
                .map(|task| format!("{}: {}", task.name, task.current_value))
                .collect::<Vec<_>>()
                .join("\n"),
        );
        values.insert("plot_history", context.summary.to_string());
    } else {
        values.insert("current_state", String::new());
        values.insert("plot_history", String::new());
    }

    let messages = render_messages(context.templates, &values, context.user_name)?;
    if messages.is_empty() {
        return Err(WorkflowError::new(WorkflowErrorKind::EmptyPrompt(format!(
            "judge {}",
            context.style
        )))
        .into());
    }

    Ok(GenerateRequest {
        messages,
        json_mode: true,
        ..Default::default()
    })
}

/// Outcome of one judged task.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// A change to apply at commit
    Update(VariableUpdate),
    /// A value the task type does not allow
    Anomaly {
        /// Target variable
        variable: String,
        /// Task name
        task: String,
        /// Offending value
        value: Value,
    },
}

/// Extracts a JSON object from a judge response.
///
/// Tries a fenced code block first, then the first balanced `{...}`.
///
/// # Examples
///
/// ```
/// use storyline_variables::extract_json;
///
/// let response = "Scores:\n```json\n{\"tension\": 2}\n```";
/// assert_eq!(extract_json(response).unwrap(), "{\"tension\": 2}");
///
/// let bare = "Sure! {\"tension\": {\"nested\": \"}\"}} done";
/// assert_eq!(extract_json(bare).unwrap(), "{\"tension\": {\"nested\": \"}\"}}");
/// ```
pub fn extract_json(response: &str) -> Result<String, JudgeError> {
    if response.trim().is_empty() {
        return Err(JudgeError::new(JudgeErrorKind::EmptyResponse));
    }
    if let Some(json) = extract_from_code_block(response)
        && json.starts_with('{')
    {
        return Ok(json);
    }
    if let Some(json) = extract_balanced(response, '{', '}') {
        return Ok(json);
    }

    warn!(response_length = response.len(), "No JSON found in judge response");
    Err(JudgeError::new(JudgeErrorKind::NoJson(response.len())))
}

/// Content of the first fenced code block, with or without a language tag.
fn extract_from_code_block(response: &str) -> Option<String> {
    let start = response.find("```")? + 3;
    let skip_to = response[start..]
        .find('\n')
        .map(|n| start + n + 1)
        .unwrap_or(start);
    let end = response[skip_to..]
        .find("```")
        .map(|n| skip_to + n)
        .unwrap_or(response.len());
    Some(response[skip_to..end].trim().to_string())
}

/// Content between the first `open` and its matching `close`, skipping strings.
fn extract_balanced(response: &str, open: char, close: char) -> Option<String> {
    let start = response.find(open)?;
    let mut depth = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in response[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            c if c == open && !in_string => depth += 1,
            c if c == close && !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(response[start..start + i + c.len_utf8()].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Interprets a judge response for the given pending tasks, in FIFO order.
///
/// Tasks whose name is missing from the response are dropped. A reset task
/// answered `0` keeps the value (a zero change), `1` resets it, and anything else
/// is an anomaly. An update task takes any numeric answer verbatim.
///
/// # Errors
///
/// Fails when the response holds no parseable JSON object.
#[instrument(skip_all, fields(tasks = pending.len()))]
pub fn parse_verdicts(response: &str, pending: &[TaskInstance]) -> StorylineResult<Vec<Verdict>> {
    let json = extract_json(response)?;
    let parsed: Value = serde_json::from_str(&json)
        .map_err(|e| JudgeError::new(JudgeErrorKind::InvalidJson(e.to_string())))?;
    let object = parsed
        .as_object()
        .ok_or_else(|| JudgeError::new(JudgeErrorKind::NotAnObject))?;

    let mut verdicts = Vec::with_capacity(pending.len());
    for task in pending {
        let name = task.definition().name();
        let Some(value) = object.get(name.as_str()) else {
            warn!(task = %name, variable = %task.variable(), "Judge omitted task");
            continue;
        };

        let number = value.as_f64();
        let verdict = match (task.task_type(), number) {
            (TaskType::Reset, Some(n)) if n == 0.0 => {
                Verdict::Update(VariableUpdate::numeric(task.variable(), 0.0))
            }
            (TaskType::Reset, Some(n)) if n == 1.0 => {
                Verdict::Update(VariableUpdate::reset(task.variable()))
            }
            (TaskType::Update, Some(n)) => {
                Verdict::Update(VariableUpdate::numeric(task.variable(), n))
            }
            _ => Verdict::Anomaly {
                variable: task.variable().clone(),
                task: name.clone(),
                value: value.clone(),
            },
        };
        debug!(task = %name, ?verdict, "Judged task");
        verdicts.push(verdict);
    }
    Ok(verdicts)
}

impl TaskQueue {
    /// Resolves the pending group against a judge response.
    ///
    /// The pending group is empty afterwards, whether or not parsing succeeds.
    pub fn resolve(&mut self, response: &str) -> StorylineResult<Vec<Verdict>> {
        let pending = self.take_pending();
        parse_verdicts(response, &pending)
    }
}
