//! Deterministic mock implementation of the shared `prompt_runner` contract.
//!
//! This crate contains no transport logic and is intended for local
//! development and coordinator-level integration testing.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use prompt_runner::{is_cancelled, CancelSignal, RunError, Runner};

/// Response used when the script is exhausted.
pub const DEFAULT_MOCK_RESPONSE: &str = "mock response";

/// Scripted runner that records every prompt it receives.
#[derive(Debug, Default)]
pub struct MockRunner {
    script: Mutex<VecDeque<Result<String, RunError>>>,
    exhausted: Option<RunError>,
    calls: Mutex<Vec<String>>,
}

impl MockRunner {
    /// Creates a runner that answers every prompt with [`DEFAULT_MOCK_RESPONSE`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a runner that replays `responses` in order, then falls back to
    /// [`DEFAULT_MOCK_RESPONSE`].
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    /// Creates a runner that replays arbitrary results, errors included.
    #[must_use]
    pub fn with_results(results: Vec<Result<String, RunError>>) -> Self {
        Self {
            script: Mutex::new(results.into()),
            exhausted: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Creates a runner whose every call fails with `error`.
    #[must_use]
    pub fn failing(error: RunError) -> Self {
        Self {
            exhausted: Some(error),
            ..Self::default()
        }
    }

    /// Prompts received so far, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        lock_unpoisoned(&self.calls).clone()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        lock_unpoisoned(&self.calls).len()
    }
}

impl Runner for MockRunner {
    fn run(&self, prompt: &str, cancel: CancelSignal) -> Result<String, RunError> {
        lock_unpoisoned(&self.calls).push(prompt.to_string());

        if is_cancelled(&cancel) {
            return Err(RunError::Cancelled);
        }

        if let Some(result) = lock_unpoisoned(&self.script).pop_front() {
            return result;
        }
        match &self.exhausted {
            Some(error) => Err(error.clone()),
            None => Ok(DEFAULT_MOCK_RESPONSE.to_string()),
        }
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use prompt_runner::cancel_signal;

    use super::*;

    #[test]
    fn default_runner_answers_with_default_response() {
        let runner = MockRunner::new();

        let output = runner
            .run("hello", cancel_signal())
            .expect("mock run should succeed");

        assert_eq!(output, DEFAULT_MOCK_RESPONSE);
        assert_eq!(runner.calls(), vec!["hello".to_string()]);
    }

    #[test]
    fn scripted_responses_replay_in_order_then_fall_back() {
        let runner = MockRunner::with_responses(vec!["one".to_string(), "two".to_string()]);

        assert_eq!(runner.run("a", cancel_signal()).as_deref(), Ok("one"));
        assert_eq!(runner.run("b", cancel_signal()).as_deref(), Ok("two"));
        assert_eq!(
            runner.run("c", cancel_signal()).as_deref(),
            Ok(DEFAULT_MOCK_RESPONSE)
        );
        assert_eq!(runner.call_count(), 3);
    }

    #[test]
    fn failing_runner_returns_scripted_error() {
        let runner = MockRunner::failing(RunError::failed("upstream down"));

        let error = runner
            .run("prompt", cancel_signal())
            .expect_err("scripted failure should surface");

        assert_eq!(error, RunError::Failed("upstream down".to_string()));
    }

    #[test]
    fn failing_runner_fails_on_every_call() {
        let runner = MockRunner::failing(RunError::Cancelled);

        for prompt in ["first", "second", "third"] {
            assert_eq!(runner.run(prompt, cancel_signal()), Err(RunError::Cancelled));
        }
        assert_eq!(runner.call_count(), 3);
    }

    #[test]
    fn cancelled_signal_short_circuits_but_still_records_call() {
        let runner = MockRunner::with_responses(vec!["unused".to_string()]);
        let cancel = cancel_signal();
        cancel.store(true, Ordering::SeqCst);

        assert_eq!(runner.run("prompt", cancel), Err(RunError::Cancelled));
        assert_eq!(runner.call_count(), 1);
    }
}
