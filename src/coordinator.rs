//! Per-invocation choice between reusing persisted state and a live run.
//!
//! Precedence, first match wins:
//! 1. a non-empty prompt override forces a live run with the override text
//!    (warning once if `refine` was also requested)
//! 2. without `refine`, a configured state directory is tried; a bundle that
//!    loads and matches the requested scope is returned as-is
//! 3. otherwise the runner is invoked exactly once
//!
//! Nothing is persisted here. Saving a live result is a separate caller step.

use std::path::PathBuf;

use prompt_runner::{CancelSignal, RunError, Runner};
use state_store::{SnapshotStore, StateBundle};

use crate::config::EnvConfig;
use crate::overrides::{effective_prompt, resolve_override};

/// Warning emitted when overrides and refine are requested together.
pub const OVERRIDE_REFINE_WARNING: &str =
    "prompt override and refine were both requested; the override wins and refine is ignored";

/// Inputs for one coordinator decision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreRequest {
    pub state_dir: Option<PathBuf>,
    pub scope_key: Option<String>,
    pub refine: bool,
    pub override_prompts: Vec<String>,
    pub override_file_text: Option<String>,
    /// Prompt sent when no override is given.
    pub default_prompt: String,
}

impl RestoreRequest {
    #[must_use]
    pub fn new(default_prompt: impl Into<String>) -> Self {
        Self {
            default_prompt: default_prompt.into(),
            ..Self::default()
        }
    }

    /// Seeds directory, scope and refine from the environment.
    #[must_use]
    pub fn from_env_config(config: &EnvConfig, default_prompt: impl Into<String>) -> Self {
        Self {
            state_dir: config.state_dir.clone(),
            scope_key: config.scope_key.clone(),
            refine: config.refine,
            ..Self::new(default_prompt)
        }
    }

    #[must_use]
    pub fn with_state_dir(mut self, state_dir: impl Into<PathBuf>) -> Self {
        self.state_dir = Some(state_dir.into());
        self
    }

    #[must_use]
    pub fn with_scope_key(mut self, scope_key: impl Into<String>) -> Self {
        self.scope_key = Some(scope_key.into());
        self
    }

    #[must_use]
    pub fn with_refine(mut self, refine: bool) -> Self {
        self.refine = refine;
        self
    }

    #[must_use]
    pub fn with_override_prompts(mut self, prompts: Vec<String>) -> Self {
        self.override_prompts = prompts;
        self
    }

    #[must_use]
    pub fn with_override_file_text(mut self, text: impl Into<String>) -> Self {
        self.override_file_text = Some(text.into());
        self
    }
}

/// Result of one decision. Exactly one of restore or live run happened.
#[derive(Debug, Clone, PartialEq)]
pub struct RestoreOutcome {
    pub used_restore: bool,
    pub bundle: Option<StateBundle>,
    pub prompt_sent: Option<String>,
    pub output: Option<String>,
}

impl RestoreOutcome {
    fn restored(bundle: StateBundle) -> Self {
        Self {
            used_restore: true,
            bundle: Some(bundle),
            prompt_sent: None,
            output: None,
        }
    }

    fn live(prompt: String, output: String) -> Self {
        Self {
            used_restore: false,
            bundle: None,
            prompt_sent: Some(prompt),
            output: Some(output),
        }
    }
}

#[derive(Debug)]
pub struct RestoreCoordinator<R> {
    runner: R,
}

impl<R: Runner> RestoreCoordinator<R> {
    #[must_use]
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    #[must_use]
    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Decides and executes; the conflict warning goes to `tracing`.
    pub fn run(
        &self,
        request: &RestoreRequest,
        cancel: CancelSignal,
    ) -> Result<RestoreOutcome, RunError> {
        self.execute(request, cancel, None)
    }

    /// Decides and executes, delivering the conflict warning to `warn`.
    pub fn run_with_warnings(
        &self,
        request: &RestoreRequest,
        cancel: CancelSignal,
        warn: &mut dyn FnMut(&str),
    ) -> Result<RestoreOutcome, RunError> {
        self.execute(request, cancel, Some(warn))
    }

    fn execute(
        &self,
        request: &RestoreRequest,
        cancel: CancelSignal,
        warn: Option<&mut dyn FnMut(&str)>,
    ) -> Result<RestoreOutcome, RunError> {
        let override_text = resolve_override(
            &request.override_prompts,
            request.override_file_text.as_deref(),
        );

        if let Some(prompt) = override_text {
            if request.refine {
                match warn {
                    Some(warn) => warn(OVERRIDE_REFINE_WARNING),
                    None => tracing::warn!("{OVERRIDE_REFINE_WARNING}"),
                }
            }
            tracing::debug!("prompt override present; forcing live run");
            return self.live_run(prompt, cancel);
        }

        if !request.refine {
            if let Some(bundle) = self.try_restore(request) {
                return Ok(RestoreOutcome::restored(bundle));
            }
        }

        let prompt = effective_prompt(
            &request.override_prompts,
            request.override_file_text.as_deref(),
            &request.default_prompt,
        );
        self.live_run(prompt, cancel)
    }

    fn try_restore(&self, request: &RestoreRequest) -> Option<StateBundle> {
        let dir = request.state_dir.as_ref()?;

        let bundle = match SnapshotStore::new(dir).load_latest() {
            Ok(bundle) => bundle,
            Err(error) => {
                tracing::debug!(%error, "restore unavailable; falling back to live run");
                return None;
            }
        };

        match request.scope_key.as_deref() {
            Some(scope) if scope != bundle.scope_key => {
                tracing::debug!(
                    requested = scope,
                    stored = %bundle.scope_key,
                    "stored state belongs to another scope; falling back to live run"
                );
                None
            }
            _ => {
                tracing::debug!(scope = %bundle.scope_key, "restoring stored state");
                Some(bundle)
            }
        }
    }

    fn live_run(&self, prompt: String, cancel: CancelSignal) -> Result<RestoreOutcome, RunError> {
        let output = self.runner.run(&prompt, cancel)?;
        Ok(RestoreOutcome::live(prompt, output))
    }
}
