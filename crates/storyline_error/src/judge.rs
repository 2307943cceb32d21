//! Judge response error types.

/// Specific error conditions while reading a judge response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum JudgeErrorKind {
    /// The response contained no JSON at all
    #[display("No JSON found in judge response (length: {})", _0)]
    NoJson(usize),
    /// The extracted JSON failed to parse
    #[display("Invalid JSON in judge response: {}", _0)]
    InvalidJson(String),
    /// The JSON was valid but not an object
    #[display("Judge response is not a JSON object")]
    NotAnObject,
    /// The driver returned no content
    #[display("Judge returned an empty response")]
    EmptyResponse,
}

/// Error type for judge response parsing.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Judge Error: {} at line {} in {}", kind, line, file)]
pub struct JudgeError {
    /// The specific error condition
    pub kind: JudgeErrorKind,
    /// Line number where the error occurred
    pub line: u32,
    /// Source file where the error occurred
    pub file: &'static str,
}

impl JudgeError {
    /// Create a new JudgeError with automatic location tracking.
    #[track_caller]
    pub fn new(kind: JudgeErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }
}
