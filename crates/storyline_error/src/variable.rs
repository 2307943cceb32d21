//! Variable definition and registry error types.

/// Specific error conditions for variable definitions and lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum VariableErrorKind {
    /// Declarative definition could not be decoded or failed validation
    #[display("Invalid definition for variable '{}': {}", name, message)]
    Definition {
        /// Variable name (or position when the name is unknown)
        name: String,
        /// What was wrong
        message: String,
    },
    /// Two definitions share a name
    #[display("Variable '{}' is defined more than once", _0)]
    DuplicateName(String),
    /// A referenced file, task or keyword table could not be resolved
    #[display("Unresolved reference in variable '{}': {}", name, reference)]
    UndefinedReference {
        /// Variable that holds the reference
        name: String,
        /// The reference that failed
        reference: String,
    },
    /// Stage-independent variable lacks a required stage field
    #[display("Variable '{}' is missing stage field '{}'", name, field)]
    MissingStageField {
        /// Variable name
        name: String,
        /// Missing field
        field: String,
    },
    /// Stage configuration cannot produce stages
    #[display("Invalid stage configuration for '{}': {}", name, message)]
    InvalidStageConfig {
        /// Variable name
        name: String,
        /// What was wrong
        message: String,
    },
    /// Constraint element has the wrong shape
    #[display("Malformed constraint on '{}': {}", name, message)]
    MalformedConstraint {
        /// Variable carrying the constraint
        name: String,
        /// What was wrong
        message: String,
    },
    /// Constraint or lore entry targets a variable without a scalar stage value
    #[display("Variable '{}' must be stage-independent with a scalar stage value", _0)]
    ScalarStageRequired(String),
    /// Variable name is not present in the registry
    #[display("Unknown variable: {}", _0)]
    UnknownVariable(String),
}

/// Error type for variable operations.
///
/// # Examples
///
/// ```
/// use storyline_error::{VariableError, VariableErrorKind};
///
/// let err = VariableError::new(VariableErrorKind::UnknownVariable("anger".into()));
/// assert!(format!("{}", err).contains("anger"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Variable Error: {} at line {} in {}", kind, line, file)]
pub struct VariableError {
    /// The specific error condition
    pub kind: VariableErrorKind,
    /// Line number where the error occurred
    pub line: u32,
    /// Source file where the error occurred
    pub file: &'static str,
}

impl VariableError {
    /// Create a new VariableError with automatic location tracking.
    #[track_caller]
    pub fn new(kind: VariableErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }
}
