//! Top-level error wrapper types.

use crate::{
    ConfigError, JsonError, JudgeError, SnapshotError, StorageError, VariableError,
    WorkflowError,
};

/// Every error condition the workspace can raise.
///
/// # Examples
///
/// ```
/// use storyline_error::{StorylineError, ConfigError};
///
/// let err: StorylineError = ConfigError::new("bad depth").into();
/// assert!(format!("{}", err).contains("Configuration Error"));
/// ```
#[derive(Debug, derive_more::From, derive_more::Display, derive_more::Error)]
pub enum StorylineErrorKind {
    /// Configuration error
    #[from(ConfigError)]
    Config(ConfigError),
    /// JSON serialization/deserialization error
    #[from(JsonError)]
    Json(JsonError),
    /// Storage error
    #[from(StorageError)]
    Storage(StorageError),
    /// Variable definition or registry error
    #[from(VariableError)]
    Variable(VariableError),
    /// Snapshot persistence protocol error
    #[from(SnapshotError)]
    Snapshot(SnapshotError),
    /// Judge response error
    #[from(JudgeError)]
    Judge(JudgeError),
    /// Workflow orchestration error
    #[from(WorkflowError)]
    Workflow(WorkflowError),
}

/// Storyline error with kind discrimination.
#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("Storyline Error: {}", _0)]
pub struct StorylineError(Box<StorylineErrorKind>);

impl StorylineError {
    /// Create a new error from a kind.
    pub fn new(kind: StorylineErrorKind) -> Self {
        Self(Box::new(kind))
    }

    /// Get the error kind.
    pub fn kind(&self) -> &StorylineErrorKind {
        &self.0
    }
}

// Generic From implementation for any type that converts to StorylineErrorKind
impl<T> From<T> for StorylineError
where
    T: Into<StorylineErrorKind>,
{
    fn from(err: T) -> Self {
        Self::new(err.into())
    }
}

/// Result type for Storyline operations.
///
/// # Examples
///
/// ```
/// use storyline_error::{StorylineResult, JsonError};
///
/// fn decode() -> StorylineResult<String> {
///     Err(JsonError::new("unexpected end of input"))?
/// }
/// assert!(decode().is_err());
/// ```
pub type StorylineResult<T> = std::result::Result<T, StorylineError>;
