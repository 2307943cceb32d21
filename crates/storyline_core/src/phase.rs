//! Turn phases and conversation speakers.

use serde::{Deserialize, Serialize};

/// The two recompute phases of a turn.
///
/// Each variable is affiliated with exactly one phase. Pre-update variables are
/// recomputed from the user's input before the narrative is written; post-update
/// variables are recomputed from the generated narrative afterwards. The phase also
/// names the snapshot section (`pre` or `post`) that receives the committed values.
///
/// # Examples
///
/// ```
/// use storyline_core::Phase;
///
/// assert_eq!(Phase::from_pre_update(true), Phase::Pre);
/// assert_eq!(Phase::Post.to_string(), "post");
/// assert_eq!("PRE".parse::<Phase>().unwrap(), Phase::Pre);
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
pub enum Phase {
    /// Recomputed from user input before narrative creation
    Pre,
    /// Recomputed from the generated narrative
    Post,
}

impl Phase {
    /// Phase selected by a variable's pre-update affiliation flag.
    pub fn from_pre_update(pre_update: bool) -> Self {
        if pre_update { Phase::Pre } else { Phase::Post }
    }

    /// Whether this is the pre-update phase.
    pub fn is_pre(self) -> bool {
        self == Phase::Pre
    }
}

/// Author of a conversation record.
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
    derive_more::Display,
)]
pub enum Speaker {
    /// The human player
    User,
    /// The narrative model
    Assistant,
}
