//! Cooperative cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Result of an operation that can be stopped by the user.
///
/// Stopping is a normal outcome rather than an error: the caller abandons the
/// current phase without committing anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The operation ran to completion
    Completed(T),
    /// The stop signal was raised before the operation completed
    Stopped,
}

impl<T> Outcome<T> {
    /// Whether the operation was stopped.
    pub fn is_stopped(&self) -> bool {
        matches!(self, Outcome::Stopped)
    }

    /// Maps the completed value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Completed(value) => Outcome::Completed(f(value)),
            Outcome::Stopped => Outcome::Stopped,
        }
    }

    /// Returns the completed value, if any.
    pub fn completed(self) -> Option<T> {
        match self {
            Outcome::Completed(value) => Some(value),
            Outcome::Stopped => None,
        }
    }
}

/// Shared stop flag observed by drivers and the orchestrator.
///
/// Clones share the same flag. Drivers check it between streamed chunks; the
/// orchestrator checks it between judge rounds.
///
/// # Examples
///
/// ```
/// use storyline_core::StopSignal;
///
/// let signal = StopSignal::new();
/// let handle = signal.clone();
/// handle.stop();
/// assert!(signal.is_stopped());
/// signal.reset();
/// assert!(!handle.is_stopped());
/// ```
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
}

impl StopSignal {
    /// Creates a lowered signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the signal.
    pub fn stop(&self) {
        tracing::debug!("Stop requested");
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether the signal is raised.
    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Lowers the signal.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
