//! Minimal contract for performing one live prompt computation.
//!
//! This crate defines only the capability the restore coordinator drives when
//! no stored state can be reused. It excludes transport details, request
//! payloads, and retry policy; those belong to concrete runner implementations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

/// Shared cancellation flag for a live run.
pub type CancelSignal = Arc<AtomicBool>;

/// Creates a fresh, unset cancellation signal.
#[must_use]
pub fn cancel_signal() -> CancelSignal {
    Arc::new(AtomicBool::new(false))
}

/// Returns true once cancellation has been requested on `signal`.
#[must_use]
pub fn is_cancelled(signal: &CancelSignal) -> bool {
    signal.load(Ordering::SeqCst)
}

/// Error reported by a runner.
///
/// Callers forward this unchanged; no layer above the runner retries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunError {
    #[error("run cancelled")]
    Cancelled,
    #[error("run failed: {0}")]
    Failed(String),
}

impl RunError {
    /// Constructs a failure with a caller-provided message.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

impl From<String> for RunError {
    fn from(message: String) -> Self {
        Self::Failed(message)
    }
}

impl From<&str> for RunError {
    fn from(message: &str) -> Self {
        Self::Failed(message.to_string())
    }
}

/// Capability that performs one live computation for a prompt.
pub trait Runner: Send + Sync {
    /// Sends `prompt` and returns the complete response text.
    ///
    /// Implementations should observe `cancel` and return
    /// [`RunError::Cancelled`] when it is set.
    fn run(&self, prompt: &str, cancel: CancelSignal) -> Result<String, RunError>;
}

impl<R: Runner + ?Sized> Runner for &R {
    fn run(&self, prompt: &str, cancel: CancelSignal) -> Result<String, RunError> {
        (**self).run(prompt, cancel)
    }
}

impl<R: Runner + ?Sized> Runner for Box<R> {
    fn run(&self, prompt: &str, cancel: CancelSignal) -> Result<String, RunError> {
        (**self).run(prompt, cancel)
    }
}

impl<R: Runner + ?Sized> Runner for Arc<R> {
    fn run(&self, prompt: &str, cancel: CancelSignal) -> Result<String, RunError> {
        (**self).run(prompt, cancel)
    }
}
