//! Best-effort advisory lock over a state directory.
//!
//! The lock only reduces write interleaving between cooperating writers. It is
//! NOT a mutual-exclusion guarantee: when the marker cannot be created before
//! the deadline, the caller proceeds unlocked. Every write in the store is
//! individually atomic (temp file + rename), so correctness never depends on
//! holding this lock; the worst case is last-writer-wins on `latest.json`.
//!
//! A marker left behind by a crashed writer is never reclaimed. Later writers
//! wait out the deadline and then fall through to the unlocked path.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;
use uuid::Uuid;

use crate::error::StateStoreError;
use crate::paths::LOCK_FILE_NAME;

/// Retry tuning for [`StateLock::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    /// Wall-clock budget before giving up and proceeding without the lock.
    pub deadline: Duration,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(2),
            min_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_millis(150),
        }
    }
}

impl LockOptions {
    fn jittered_backoff(&self) -> Duration {
        let min = self.min_backoff.as_millis() as u64;
        let max = (self.max_backoff.as_millis() as u64).max(min);
        Duration::from_millis(rand::rng().random_range(min..=max))
    }
}

/// Guard for the `state.lock` marker. Dropping it releases the lock.
#[derive(Debug)]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct StateLock {
    marker: Option<PathBuf>,
}

impl StateLock {
    /// Tries to create the marker, retrying with jitter until the deadline.
    ///
    /// Contention is not an error: on timeout an unheld guard is returned.
    /// Only I/O failures unrelated to contention are reported.
    pub fn acquire(dir: &Path, options: &LockOptions) -> Result<Self, StateStoreError> {
        let marker = dir.join(LOCK_FILE_NAME);
        let started = Instant::now();

        loop {
            match create_marker(&marker) {
                Ok(()) => {
                    tracing::debug!(path = %marker.display(), "acquired state lock");
                    return Ok(Self {
                        marker: Some(marker),
                    });
                }
                Err(source) if source.kind() == ErrorKind::AlreadyExists => {}
                Err(source) => {
                    return Err(StateStoreError::io("creating lock marker", &marker, source));
                }
            }

            let elapsed = started.elapsed();
            if elapsed >= options.deadline {
                tracing::warn!(
                    path = %marker.display(),
                    waited_ms = elapsed.as_millis() as u64,
                    "state lock still held after deadline; proceeding without it"
                );
                return Ok(Self { marker: None });
            }

            let remaining = options.deadline - elapsed;
            thread::sleep(options.jittered_backoff().min(remaining));
        }
    }

    /// False when acquisition timed out and the caller is running unlocked.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.marker.is_some()
    }

    /// Removes the marker now, reporting any failure.
    pub fn release(mut self) -> Result<(), StateStoreError> {
        match self.marker.take() {
            Some(marker) => remove_marker(&marker),
            None => Ok(()),
        }
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if let Some(marker) = self.marker.take() {
            if let Err(error) = remove_marker(&marker) {
                tracing::warn!(%error, "failed to release state lock");
            }
        }
    }
}

fn create_marker(marker: &Path) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(marker)?;
    // Owner token is informational only; nothing reads it back.
    writeln!(file, "pid={} token={}", std::process::id(), Uuid::new_v4())?;
    Ok(())
}

fn remove_marker(marker: &Path) -> Result<(), StateStoreError> {
    match std::fs::remove_file(marker) {
        Ok(()) => {
            tracing::debug!(path = %marker.display(), "released state lock");
            Ok(())
        }
        Err(source) if source.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(StateStoreError::io("removing lock marker", marker, source)),
    }
}
