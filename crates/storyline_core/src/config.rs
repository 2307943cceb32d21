//! Layered configuration.
//!
//! Configuration sources in order of precedence (later sources override earlier):
//! 1. Bundled defaults (`storyline.toml` shipped with the library)
//! 2. User config in home directory (`~/.config/storyline/storyline.toml`)
//! 3. User config in current directory (`./storyline.toml`)

use config::{Config, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use storyline_error::{ConfigError, StorylineError, StorylineResult};
use tracing::{debug, instrument};

/// How the conversation is framed for the models.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ChatMethod {
    /// The user steers a story; history renders as narrative only
    #[default]
    Guided,
    /// The user is a participant; history renders as a dialogue
    Interactive,
}

/// One block of a prompt template.
///
/// Blocks with an empty role are appended to the previous message. Disabled blocks
/// and blocks whose rendered content is blank are skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBlock {
    /// `system`, `user`, `assistant`, or empty to continue the previous message
    #[serde(default)]
    pub role: String,
    /// Content with `{placeholder}` markers
    #[serde(default)]
    pub content: String,
    /// Whether the block is rendered
    #[serde(default = "enabled")]
    pub enable: bool,
}

fn enabled() -> bool {
    true
}

/// Prompt templates for each collaborator call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PromptsConfig {
    /// Judge prompt for pre-update rounds in guided mode
    #[serde(default)]
    pub judge_pre: Vec<MessageBlock>,
    /// Judge prompt for post-update rounds (and pre-update rounds in interactive mode)
    #[serde(default)]
    pub judge_post: Vec<MessageBlock>,
    /// Narrative prompt for the create phase
    #[serde(default)]
    pub narrative: Vec<MessageBlock>,
}

/// File locations used by the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Conversation log JSON file
    pub conversation_log: PathBuf,
    /// Variable definitions JSON file
    pub variables: PathBuf,
    /// Base directory for task definition files and keyword tables
    pub task_dir: PathBuf,
    /// Opening narrative text
    pub opening: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            conversation_log: PathBuf::from("data/conversation.json"),
            variables: PathBuf::from("data/variables.json"),
            task_dir: PathBuf::from("data"),
            opening: PathBuf::from("data/opening.txt"),
        }
    }
}

/// Lore that is injected whenever one of its keywords appears in recent history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleLore {
    /// Processing order within a position (ascending)
    #[serde(default)]
    pub depth: u32,
    /// Activation keywords; an entry without keywords never activates
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Injected text
    pub content: String,
}

/// Index selector inside a bound lore entry.
///
/// A single index picks one flattened stage digit; a group joins several digits
/// into one key such as `stage_1_3`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BindingPart {
    /// One stage digit
    Index(usize),
    /// Several stage digits
    Group(Vec<usize>),
}

/// Lore whose content follows the stages of bound variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundLore {
    /// Processing order within a position (ascending)
    #[serde(default)]
    pub depth: u32,
    /// Activation keywords; an entry without keywords never activates
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Stage-independent variables whose stages are flattened in order
    pub variables: Vec<String>,
    /// One selector per part; part `i` reads `stages["part_i"]`
    pub binding: Vec<BindingPart>,
    /// Text placed before the stage content
    pub base: String,
    /// `part_i` to `stage_key` to text
    #[serde(default)]
    pub stages: BTreeMap<String, BTreeMap<String, String>>,
}

/// Lore entries for one prompt position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PositionLore {
    /// Fixed entries keyed by name
    #[serde(default)]
    pub simple: BTreeMap<String, SimpleLore>,
    /// Stage-bound entries keyed by name
    #[serde(default)]
    pub bound: BTreeMap<String, BoundLore>,
}

/// Lore for the two narrative prompt positions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LoreConfig {
    /// Rendered into `{position_0}`
    #[serde(default)]
    pub position_0: PositionLore,
    /// Rendered into `{position_1}`
    #[serde(default)]
    pub position_1: PositionLore,
}

/// Top-level Storyline configuration.
///
/// # Example
///
/// ```no_run
/// use storyline_core::StorylineConfig;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = StorylineConfig::load()?;
/// println!("Memory depth: {}", config.memory_depth);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorylineConfig {
    /// Name substituted for `{user}` and `<user>`
    pub user_name: String,
    /// Guided or interactive framing
    #[serde(default)]
    pub chat_method: ChatMethod,
    /// Layers rendered in full in the narrative history
    pub memory_depth: u32,
    /// Layers rendered in full in the judge's plot history
    pub judge_memory_depth: u32,
    /// `[min, max]` narrative length; a negative bound is unlimited
    pub length_limit: [i64; 2],
    /// Maximum tasks resolved per judge round
    pub batch_size: usize,
    /// File locations
    #[serde(default)]
    pub paths: PathsConfig,
    /// Prompt templates
    #[serde(default)]
    pub prompts: PromptsConfig,
    /// Positional lore
    #[serde(default)]
    pub lore: LoreConfig,
}

impl StorylineConfig {
    /// Load configuration from a specific file path layered over the bundled defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<std::path::Path>) -> StorylineResult<Self> {
        debug!("Loading configuration from file");

        Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .add_source(File::from(path.as_ref()))
            .build()
            .map_err(|e| {
                StorylineError::from(ConfigError::new(format!(
                    "Failed to read configuration from {}: {}",
                    path.as_ref().display(),
                    e
                )))
            })?
            .try_deserialize::<Self>()
            .map_err(|e| {
                StorylineError::from(ConfigError::new(format!(
                    "Failed to parse configuration: {}",
                    e
                )))
            })?
            .validated()
    }

    /// Load configuration with precedence: current dir > home dir > bundled default.
    ///
    /// User config files are optional and silently skipped if not found.
    #[instrument]
    pub fn load() -> StorylineResult<Self> {
        debug!("Loading configuration with precedence: current dir > home dir > bundled defaults");

        let mut builder =
            Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".config/storyline/storyline.toml");
            builder = builder.add_source(File::from(home_config).required(false));
        }

        builder = builder.add_source(File::with_name("storyline").required(false));

        builder
            .build()
            .map_err(|e| {
                StorylineError::from(ConfigError::new(format!(
                    "Failed to build configuration: {}",
                    e
                )))
            })?
            .try_deserialize::<Self>()
            .map_err(|e| {
                StorylineError::from(ConfigError::new(format!(
                    "Failed to parse configuration: {}",
                    e
                )))
            })?
            .validated()
    }

    /// Bundled defaults only.
    pub fn bundled() -> StorylineResult<Self> {
        toml::from_str::<Self>(DEFAULT_CONFIG)
            .map_err(|e| {
                StorylineError::from(ConfigError::new(format!(
                    "Bundled configuration is invalid: {}",
                    e
                )))
            })?
            .validated()
    }

    fn validated(self) -> StorylineResult<Self> {
        if self.batch_size == 0 {
            return Err(ConfigError::new("batch_size must be at least 1").into());
        }
        if self.prompts.narrative.is_empty() {
            return Err(ConfigError::new("prompts.narrative must define at least one block").into());
        }
        Ok(self)
    }

    /// Narrative length instruction derived from `length_limit`.
    ///
    /// # Examples
    ///
    /// ```
    /// use storyline_core::StorylineConfig;
    ///
    /// let mut config = StorylineConfig::bundled().unwrap();
    /// config.length_limit = [300, -1];
    /// assert_eq!(config.length_limit_text(), "at least 300 words");
    /// config.length_limit = [-1, -1];
    /// assert_eq!(config.length_limit_text(), "");
    /// ```
    pub fn length_limit_text(&self) -> String {
        let [min, max] = self.length_limit;
        match (min >= 0, max >= 0) {
            (true, true) => format!("between {} and {} words", min, max),
            (true, false) => format!("at least {} words", min),
            (false, true) => format!("at most {} words", max),
            (false, false) => String::new(),
        }
    }
}

const DEFAULT_CONFIG: &str = include_str!("../../../storyline.toml");

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_bundled_defaults_parse() {
        let config = StorylineConfig::bundled().unwrap();
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.chat_method, ChatMethod::Guided);
        assert!(!config.prompts.judge_pre.is_empty());
        assert!(!config.prompts.judge_post.is_empty());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "user_name = \"Mira\"\nchat_method = \"interactive\"\nmemory_depth = 2").unwrap();

        let config = StorylineConfig::from_file(&path).unwrap();
        assert_eq!(config.user_name, "Mira");
        assert_eq!(config.chat_method, ChatMethod::Interactive);
        assert_eq!(config.memory_depth, 2);
        assert_eq!(config.batch_size, 5);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "batch_size = 0\n").unwrap();
        assert!(StorylineConfig::from_file(&path).is_err());
    }

    #[test]
    fn test_bound_lore_binding_parts() {
        let toml_text = r#"
            variables = ["season", "bond"]
            binding = [0, [1, 2]]
            base = "<setting>"
            keywords = ["garden"]
        "#;
        let lore: BoundLore = toml::from_str(toml_text).unwrap();
        assert_eq!(
            lore.binding,
            vec![BindingPart::Index(0), BindingPart::Group(vec![1, 2])]
        );
        assert_eq!(lore.depth, 0);
    }
}
