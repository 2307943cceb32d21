//! Request and response types for collaborator generation calls.

use crate::ChatMessage;
use serde::{Deserialize, Serialize};

/// Generation request sent to a judge or narrative collaborator.
///
/// # Examples
///
/// ```
/// use storyline_core::{ChatMessage, GenerateRequest, Role};
///
/// let request = GenerateRequest {
///     messages: vec![ChatMessage::new(Role::User, "Rate the tension.")],
///     json_mode: true,
///     ..Default::default()
/// };
///
/// assert_eq!(request.messages.len(), 1);
/// assert!(request.json_mode);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GenerateRequest {
    /// The conversation messages to send
    pub messages: Vec<ChatMessage>,
    /// Ask the collaborator for a JSON object response
    pub json_mode: bool,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Model identifier to use
    pub model: Option<String>,
}

/// Collaborator response.
///
/// `information` carries free-form diagnostics (token usage, finish reason) that the
/// orchestrator collects but never interprets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GenerateResponse {
    /// Reasoning text, if the model exposes it
    pub reasoning: String,
    /// Main content
    pub content: String,
    /// Diagnostics tail
    pub information: String,
}
