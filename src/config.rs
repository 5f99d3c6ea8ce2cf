//! Environment configuration.

use std::env;
use std::path::PathBuf;

pub const STATE_DIR_VAR: &str = "PROMPT_STATE_DIR";
pub const SCOPE_KEY_VAR: &str = "PROMPT_STATE_SCOPE";
pub const REFINE_VAR: &str = "PROMPT_STATE_REFINE";
pub const LOG_FILTER_VAR: &str = "PROMPT_STATE_LOG";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvConfig {
    pub state_dir: Option<PathBuf>,
    pub scope_key: Option<String>,
    pub refine: bool,
    pub log_filter: Option<String>,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self {
            state_dir: env_string_opt(STATE_DIR_VAR).map(PathBuf::from),
            scope_key: env_string_opt(SCOPE_KEY_VAR),
            refine: env_flag(REFINE_VAR),
            log_filter: env_string_opt(LOG_FILTER_VAR),
        }
    }
}

fn env_flag(key: &str) -> bool {
    env::var(key).map(|value| value == "1").unwrap_or(false)
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}
