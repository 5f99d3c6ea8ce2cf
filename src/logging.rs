//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

use crate::config::EnvConfig;

pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Builds the filter from `PROMPT_STATE_LOG`, falling back to [`DEFAULT_LOG_FILTER`]
/// when it is unset or unparsable.
#[must_use]
pub fn env_filter(config: &EnvConfig) -> EnvFilter {
    config
        .log_filter
        .as_deref()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Installs a stderr fmt subscriber. Returns false if one was already set.
pub fn init_tracing(config: &EnvConfig) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .is_ok()
}
