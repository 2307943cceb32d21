//! Scripted collaborator that replays canned replies.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use storyline_core::{GenerateRequest, GenerateResponse, Outcome, StopSignal};
use storyline_error::{JsonError, StorylineResult, WorkflowError, WorkflowErrorKind};
use storyline_interface::{LlmDriver, StreamSinks};
use tracing::debug;

/// One canned reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedReply {
    /// Stream this response
    Reply(GenerateResponse),
    /// Behave as if the user pressed stop during the call
    Stop,
    /// Fail with this message
    Fail(String),
}

impl ScriptedReply {
    /// A reply with content only.
    pub fn text(content: impl Into<String>) -> Self {
        Self::Reply(GenerateResponse {
            content: content.into(),
            ..Default::default()
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawReply {
    Text(String),
    Full {
        #[serde(default)]
        reasoning: String,
        #[serde(default)]
        content: String,
        #[serde(default)]
        information: String,
    },
}

/// Driver answering each call with the next scripted reply.
///
/// Content is streamed word by word and the stop signal is checked between
/// words. Every request is recorded for inspection.
#[derive(Debug)]
pub struct ScriptedDriver {
    model: String,
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedDriver {
    /// Creates a driver with the given replies.
    pub fn new(model: impl Into<String>, replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self {
            model: model.into(),
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Reads replies from a JSON array of strings or
    /// `{reasoning, content, information}` objects.
    pub fn from_json(model: impl Into<String>, json: &str) -> StorylineResult<Self> {
        let raw: Vec<RawReply> = serde_json::from_str(json)
            .map_err(|e| JsonError::new(format!("Invalid reply script: {}", e)))?;
        let replies = raw.into_iter().map(|reply| match reply {
            RawReply::Text(content) => ScriptedReply::text(content),
            RawReply::Full {
                reasoning,
                content,
                information,
            } => ScriptedReply::Reply(GenerateResponse {
                reasoning,
                content,
                information,
            }),
        });
        Ok(Self::new(model, replies))
    }

    /// Replies not yet consumed.
    pub fn remaining(&self) -> usize {
        self.replies.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn failure(&self, message: impl Into<String>) -> WorkflowError {
        WorkflowError::new(WorkflowErrorKind::Driver {
            driver: format!("{}/{}", self.provider_name(), self.model),
            message: message.into(),
        })
    }
}

#[async_trait]
impl LlmDriver for ScriptedDriver {
    async fn generate(
        &self,
        request: &GenerateRequest,
        sinks: &StreamSinks,
        stop: &StopSignal,
    ) -> StorylineResult<Outcome<GenerateResponse>> {
        self.requests
            .lock()
            .map_err(|_| self.failure("request log poisoned"))?
            .push(request.clone());
        let next = self
            .replies
            .lock()
            .map_err(|_| self.failure("script poisoned"))?
            .pop_front();

        let response = match next {
            Some(ScriptedReply::Reply(response)) => response,
            Some(ScriptedReply::Stop) => {
                stop.stop();
                return Ok(Outcome::Stopped);
            }
            Some(ScriptedReply::Fail(message)) => return Err(self.failure(message).into()),
            None => return Err(self.failure("script exhausted").into()),
        };

        if !response.reasoning.is_empty() {
            sinks.emit_reasoning(&response.reasoning);
        }
        for chunk in response.content.split_inclusive(' ') {
            if stop.is_stopped() {
                debug!("Scripted stream stopped");
                return Ok(Outcome::Stopped);
            }
            sinks.emit_content(chunk);
        }
        Ok(Outcome::Completed(response))
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
