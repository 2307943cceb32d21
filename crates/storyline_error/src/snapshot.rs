//! Snapshot persistence protocol error types.

/// Specific error conditions for commit, recovery and conversation bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum SnapshotErrorKind {
    /// Update results from different phases were committed together
    #[display("Updates mix pre-update and post-update variables: {}", _0)]
    MixedPhase(String),
    /// Updated variable is not present in the restored baseline
    #[display("Variable '{}' is missing from the baseline snapshot", _0)]
    MissingBaseline(String),
    /// Baseline names a variable the registry does not know
    #[display("Baseline snapshot references unknown variable '{}'", _0)]
    UnknownBaselineVariable(String),
    /// Recovered snapshot does not cover the same names as the registry
    #[display(
        "Snapshot names do not match registry (missing from snapshot: [{}], missing from registry: [{}])",
        missing_in_snapshot,
        missing_in_registry
    )]
    NameSetMismatch {
        /// Registry names absent from the snapshot
        missing_in_snapshot: String,
        /// Snapshot names absent from the registry
        missing_in_registry: String,
    },
    /// No assistant record exists at the current layer
    #[display("No assistant record at layer {}", _0)]
    NoCurrentAssistant(u32),
    /// The conversation log has no records
    #[display("Conversation log is empty")]
    EmptyLog,
    /// Records would no longer alternate speakers
    #[display("Speaker order violated: {}", _0)]
    SpeakerOrder(String),
}

/// Error type for snapshot operations.
///
/// # Examples
///
/// ```
/// use storyline_error::{SnapshotError, SnapshotErrorKind};
///
/// let err = SnapshotError::new(SnapshotErrorKind::EmptyLog);
/// assert!(format!("{}", err).contains("empty"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Snapshot Error: {} at line {} in {}", kind, line, file)]
pub struct SnapshotError {
    /// The specific error condition
    pub kind: SnapshotErrorKind,
    /// Line number where the error occurred
    pub line: u32,
    /// Source file where the error occurred
    pub file: &'static str,
}

impl SnapshotError {
    /// Create a new SnapshotError with automatic location tracking.
    #[track_caller]
    pub fn new(kind: SnapshotErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }
}
