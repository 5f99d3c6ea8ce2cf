//! Persist and restore the working state of an automated prompting session.
//!
//! # Public API Overview
//! - Decide between replaying stored state and a live run via [`RestoreCoordinator`].
//! - Persist bundles with [`SnapshotStore`] and evolve them with [`refine`].
//! - Read decision inputs from the environment with [`config::EnvConfig`] and
//!   install logging with [`logging::init_tracing`].

pub mod config;
pub mod coordinator;
pub mod logging;
pub mod overrides;

pub use crate::coordinator::{
    RestoreCoordinator, RestoreOutcome, RestoreRequest, OVERRIDE_REFINE_WARNING,
};
pub use crate::overrides::{effective_prompt, resolve_override};

/// Live-run capability contract.
pub use prompt_runner::{cancel_signal, is_cancelled, CancelSignal, RunError, Runner};

/// Snapshot persistence, schema and refinement.
pub use state_store::{
    canonical_bytes, compute_source_hash, digest_hex, load_latest, refine, refine_at, sanitize,
    save, validate, DirSync, FsDirSync, LatestPointer, LockOptions, SavedSnapshot, SchemaError,
    Settings, SnapshotStore, StateBundle, StateStoreError, StateUnavailable, LATEST_FILE_NAME,
    SCHEMA_VERSION,
};
