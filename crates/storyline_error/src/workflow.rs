//! Workflow orchestration error types.

/// Specific error conditions for turn orchestration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum WorkflowErrorKind {
    /// Assembled prompt has no messages
    #[display("Prompt for phase '{}' rendered no messages", _0)]
    EmptyPrompt(String),
    /// Template placeholder or lore substitution failed
    #[display("Template error: {}", _0)]
    Template(String),
    /// A phase needs user input that is not in the log
    #[display("No user input available for the current turn")]
    MissingUserInput,
    /// Collaborator driver reported a failure
    #[display("Driver '{}' failed: {}", driver, message)]
    Driver {
        /// Driver name
        driver: String,
        /// Failure message
        message: String,
    },
}

/// Error type for workflow operations.
///
/// # Examples
///
/// ```
/// use storyline_error::{WorkflowError, WorkflowErrorKind};
///
/// let err = WorkflowError::new(WorkflowErrorKind::MissingUserInput);
/// assert!(format!("{}", err).contains("user input"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Workflow Error: {} at line {} in {}", kind, line, file)]
pub struct WorkflowError {
    /// The specific error condition
    pub kind: WorkflowErrorKind,
    /// Line number where the error occurred
    pub line: u32,
    /// Source file where the error occurred
    pub file: &'static str,
}

impl WorkflowError {
    /// Create a new WorkflowError with automatic location tracking.
    #[track_caller]
    pub fn new(kind: WorkflowErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }
}
