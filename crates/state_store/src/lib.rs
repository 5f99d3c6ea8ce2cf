//! Crash-safe, content-addressed persistence for prompting session state.

mod error;
mod lock;
mod paths;
mod refine;
mod sanitize;
mod schema;
mod store;

pub use error::{SchemaError, StateStoreError, StateUnavailable};
pub use lock::{LockOptions, StateLock};
pub use paths::{
    is_bare_file_name, sanitize_timestamp_for_filename, snapshot_file_name, LATEST_FILE_NAME,
    LOCK_FILE_NAME,
};
pub use refine::{refine, refine_at, DEVELOPER_PROMPT, USER_TEXT_TAG};
pub use sanitize::{is_credential_key, is_raw_body_key, redact_text, sanitize, REDACTION_MASK};
pub use schema::{
    canonical_bytes, compute_source_hash, digest_hex, validate, LatestPointer, Settings,
    StateBundle, SCHEMA_VERSION,
};
pub use store::{load_latest, save, DirSync, FsDirSync, SavedSnapshot, SnapshotStore};
