use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// A bundle failed one of its structural invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("unsupported bundle version '{found}'; expected '{expected}'")]
    UnsupportedVersion {
        found: String,
        expected: &'static str,
    },

    #[error("invalid RFC3339 timestamp in field '{field}': {value}")]
    InvalidTimestamp { field: &'static str, value: String },

    #[error("timestamp in field '{field}' must be UTC: {value}")]
    NonUtcTimestamp { field: &'static str, value: String },

    #[error("required field '{field}' is empty")]
    EmptyField { field: &'static str },
}

#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("bundle rejected: {0}")]
    Schema(#[from] SchemaError),

    #[error("state directory {path} is not private to its owner (mode {mode:o})")]
    InsecureDirectory { path: PathBuf, mode: u32 },

    #[error("state directory {path} is owned by uid {owner}, not the current user")]
    ForeignOwner { path: PathBuf, owner: u32 },

    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize state for {path}: {source}")]
    JsonSerialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to format current UTC timestamp as RFC3339: {0}")]
    ClockFormat(#[source] time::error::Format),
}

impl StateStoreError {
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn json_serialize(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::JsonSerialize {
            path: path.into(),
            source,
        }
    }
}

/// The one outcome of a failed load: there is no usable state.
///
/// Absence and corruption are indistinguishable here. The concrete cause is
/// kept for logging through [`std::error::Error::source`].
#[derive(Debug, Error)]
#[error("no usable state in {dir}")]
pub struct StateUnavailable {
    dir: PathBuf,
    #[source]
    cause: LoadFailure,
}

impl StateUnavailable {
    pub(crate) fn new(dir: &Path, cause: LoadFailure) -> Self {
        Self {
            dir: dir.to_path_buf(),
            cause,
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Internal reasons a load can fail. Never exposed as a matchable type.
#[derive(Debug)]
pub(crate) enum LoadFailure {
    Directory(StateStoreError),
    Io {
        operation: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    PointerVersion {
        found: String,
    },
    UnsafeName {
        name: String,
    },
    DigestMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
    Schema {
        path: PathBuf,
        source: SchemaError,
    },
}

impl LoadFailure {
    pub(crate) fn io(operation: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.to_path_buf(),
            source,
        }
    }
}

impl fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory(error) => write!(f, "state directory rejected: {error}"),
            Self::Io {
                operation,
                path,
                source,
            } => write!(f, "I/O error while {operation} at {}: {source}", path.display()),
            Self::Json { path, source } => {
                write!(f, "malformed JSON in {}: {source}", path.display())
            }
            Self::PointerVersion { found } => {
                write!(f, "latest pointer has unsupported version '{found}'")
            }
            Self::UnsafeName { name } => {
                write!(f, "snapshot name '{name}' is not a bare file name")
            }
            Self::DigestMismatch {
                path,
                expected,
                actual,
            } => write!(
                f,
                "digest mismatch for {}: pointer records {expected}, content hashes to {actual}",
                path.display()
            ),
            Self::Schema { path, source } => {
                write!(f, "snapshot {} failed validation: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for LoadFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Directory(error) => Some(error),
            Self::Io { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
            Self::Schema { source, .. } => Some(source),
            Self::PointerVersion { .. } | Self::UnsafeName { .. } | Self::DigestMismatch { .. } => {
                None
            }
        }
    }
}
