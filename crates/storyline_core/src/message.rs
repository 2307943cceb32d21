//! Chat messages exchanged with language-model collaborators.

use serde::{Deserialize, Serialize};

/// Roles are the same for judge and narrative requests.
///
/// Prompt templates name roles in lowercase (`system`, `user`, `assistant`) and the
/// parser accepts any casing.
///
/// # Examples
///
/// ```
/// use storyline_core::Role;
///
/// assert_eq!("System".parse::<Role>().unwrap(), Role::System);
/// assert_eq!(Role::Assistant.to_string(), "assistant");
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Role {
    /// System messages provide context and instructions
    System,
    /// User messages carry the player's side of the exchange
    User,
    /// Assistant messages carry prior model output
    Assistant,
}

/// A single role-tagged message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who is speaking
    pub role: Role,
    /// Text content
    pub content: String,
}

impl ChatMessage {
    /// Creates a message.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}
