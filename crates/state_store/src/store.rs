use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

use crate::error::{LoadFailure, StateStoreError, StateUnavailable};
use crate::lock::{LockOptions, StateLock};
use crate::paths::{
    is_bare_file_name, is_snapshot_file_name, snapshot_file_name, snapshot_sort_key,
    LATEST_FILE_NAME,
};
use crate::sanitize::sanitize;
use crate::schema::{canonical_bytes, digest_hex, validate, LatestPointer, StateBundle, SCHEMA_VERSION};

/// Flushes a directory entry to durable storage after a rename.
///
/// Injected into [`SnapshotStore`] so tests can observe or replace the
/// durability step without global state.
pub trait DirSync: Send + Sync {
    fn sync_dir(&self, dir: &Path) -> std::io::Result<()>;
}

/// Default [`DirSync`] that fsyncs the directory itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsDirSync;

impl DirSync for FsDirSync {
    #[cfg(unix)]
    fn sync_dir(&self, dir: &Path) -> std::io::Result<()> {
        fs::File::open(dir)?.sync_all()
    }

    #[cfg(not(unix))]
    fn sync_dir(&self, _dir: &Path) -> std::io::Result<()> {
        Ok(())
    }
}

/// Where a successful [`SnapshotStore::save`] put the bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedSnapshot {
    pub file_name: String,
    pub path: PathBuf,
    pub sha256: String,
    /// False when the advisory lock timed out and the write ran unlocked.
    pub locked: bool,
}

/// Content-addressed bundle persistence for one state directory.
///
/// Layout:
/// - `latest.json` names the current snapshot and its digest
/// - `state-<timestamp>-<hash8>.json` holds one immutable snapshot per save
/// - `state.lock` exists only while a save is in flight
///
/// Every file is installed by writing a private temp file in the same
/// directory, syncing it, renaming it into place and then syncing the
/// directory. Readers never see partial files and never need the lock.
#[derive(Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
    lock_options: LockOptions,
    dir_sync: Arc<dyn DirSync>,
}

impl fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotStore")
            .field("dir", &self.dir)
            .field("lock_options", &self.lock_options)
            .finish_non_exhaustive()
    }
}

impl SnapshotStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock_options: LockOptions::default(),
            dir_sync: Arc::new(FsDirSync),
        }
    }

    #[must_use]
    pub fn with_lock_options(mut self, lock_options: LockOptions) -> Self {
        self.lock_options = lock_options;
        self
    }

    #[must_use]
    pub fn with_dir_sync(mut self, dir_sync: Arc<dyn DirSync>) -> Self {
        self.dir_sync = dir_sync;
        self
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Validates, redacts and persists `bundle`, then advances `latest.json`.
    ///
    /// The caller's bundle is not modified; the sanitized copy, with
    /// `source_hash` recomputed from its identifying fields, is what lands on
    /// disk. Nothing is written when validation or the directory security
    /// check fails.
    pub fn save(&self, bundle: &StateBundle) -> Result<SavedSnapshot, StateStoreError> {
        validate(bundle)?;
        ensure_private_dir(&self.dir)?;

        let lock = StateLock::acquire(&self.dir, &self.lock_options)?;
        let locked = lock.is_held();

        let mut sanitized = sanitize(bundle);
        sanitized.refresh_source_hash();
        let snapshot_bytes = canonical_bytes(&sanitized)
            .map_err(|source| StateStoreError::json_serialize(&self.dir, source))?;
        let sha256 = digest_hex(&snapshot_bytes);
        let file_name = snapshot_file_name(&sanitized.created_at, &sha256);
        let path = self.dir.join(&file_name);
        self.write_atomic(&path, &snapshot_bytes)?;

        let pointer = LatestPointer::v1(file_name.clone(), sha256.clone());
        let latest_path = self.dir.join(LATEST_FILE_NAME);
        let mut pointer_bytes = serde_json::to_vec_pretty(&pointer)
            .map_err(|source| StateStoreError::json_serialize(&latest_path, source))?;
        pointer_bytes.push(b'\n');
        self.write_atomic(&latest_path, &pointer_bytes)?;

        restrict_dir_permissions(&self.dir)?;
        drop(lock);

        tracing::info!(
            dir = %self.dir.display(),
            snapshot = %file_name,
            sha256 = %sha256,
            locked,
            "saved state snapshot"
        );

        Ok(SavedSnapshot {
            file_name,
            path,
            sha256,
            locked,
        })
    }

    /// Loads the bundle `latest.json` points at.
    ///
    /// Every failure, including a missing pointer, a tampered pointer, a
    /// digest mismatch or an insecure directory, yields [`StateUnavailable`].
    pub fn load_latest(&self) -> Result<StateBundle, StateUnavailable> {
        self.try_load_latest().map_err(|cause| self.unavailable(cause))
    }

    /// Reads and checks `latest.json` without following it.
    pub fn read_pointer(&self) -> Result<LatestPointer, StateUnavailable> {
        self.try_read_pointer().map_err(|cause| self.unavailable(cause))
    }

    /// Loads one named snapshot, for walking the refinement chain.
    pub fn load_snapshot(&self, file_name: &str) -> Result<StateBundle, StateUnavailable> {
        self.try_load_snapshot(file_name, None)
            .map_err(|cause| self.unavailable(cause))
    }

    /// Snapshot file names in the directory, oldest first by the timestamp
    /// embedded in each name.
    pub fn list_snapshots(&self) -> Result<Vec<String>, StateStoreError> {
        check_dir_security(&self.dir)?;
        let entries = fs::read_dir(&self.dir)
            .map_err(|source| StateStoreError::io("listing state directory", &self.dir, source))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry
                .map_err(|source| StateStoreError::io("listing state directory", &self.dir, source))?;
            if let Some(name) = entry.file_name().to_str() {
                if is_snapshot_file_name(name) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort_by(|a, b| snapshot_sort_key(a).cmp(&snapshot_sort_key(b)));
        Ok(names)
    }

    fn try_load_latest(&self) -> Result<StateBundle, LoadFailure> {
        let pointer = self.try_read_pointer()?;
        self.try_load_snapshot(&pointer.path, pointer.sha256.as_deref())
    }

    fn try_read_pointer(&self) -> Result<LatestPointer, LoadFailure> {
        check_dir_security(&self.dir).map_err(LoadFailure::Directory)?;

        let latest_path = self.dir.join(LATEST_FILE_NAME);
        let bytes = fs::read(&latest_path)
            .map_err(|source| LoadFailure::io("reading latest pointer", &latest_path, source))?;
        let pointer: LatestPointer =
            serde_json::from_slice(&bytes).map_err(|source| LoadFailure::Json {
                path: latest_path.clone(),
                source,
            })?;

        if pointer.version != SCHEMA_VERSION {
            return Err(LoadFailure::PointerVersion {
                found: pointer.version,
            });
        }
        if !is_bare_file_name(&pointer.path) {
            return Err(LoadFailure::UnsafeName { name: pointer.path });
        }

        Ok(pointer)
    }

    fn try_load_snapshot(
        &self,
        file_name: &str,
        expected_sha256: Option<&str>,
    ) -> Result<StateBundle, LoadFailure> {
        check_dir_security(&self.dir).map_err(LoadFailure::Directory)?;
        if !is_bare_file_name(file_name) {
            return Err(LoadFailure::UnsafeName {
                name: file_name.to_string(),
            });
        }

        let path = self.dir.join(file_name);
        let bytes =
            fs::read(&path).map_err(|source| LoadFailure::io("reading snapshot", &path, source))?;

        if let Some(expected) = expected_sha256 {
            let actual = digest_hex(&bytes);
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(LoadFailure::DigestMismatch {
                    path,
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        let mut bundle: StateBundle =
            serde_json::from_slice(&bytes).map_err(|source| LoadFailure::Json {
                path: path.clone(),
                source,
            })?;
        if let Err(source) = validate(&bundle) {
            return Err(LoadFailure::Schema { path, source });
        }
        if !bundle.has_consistent_source_hash() {
            tracing::debug!(
                snapshot = %path.display(),
                "stored source_hash does not match identity; recomputing"
            );
            bundle.refresh_source_hash();
        }

        Ok(bundle)
    }

    fn unavailable(&self, cause: LoadFailure) -> StateUnavailable {
        tracing::debug!(
            dir = %self.dir.display(),
            cause = %cause,
            "no usable state; treating as absent"
        );
        StateUnavailable::new(&self.dir, cause)
    }

    fn write_atomic(&self, target: &Path, bytes: &[u8]) -> Result<(), StateStoreError> {
        let target_name = target
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("state");
        let temp = self
            .dir
            .join(format!(".{target_name}.{}.tmp", Uuid::new_v4().simple()));

        if let Err(error) = write_synced(&temp, bytes) {
            let _ = fs::remove_file(&temp);
            return Err(error);
        }

        if let Err(source) = fs::rename(&temp, target) {
            let _ = fs::remove_file(&temp);
            return Err(StateStoreError::io("renaming temp file into place", target, source));
        }

        self.dir_sync
            .sync_dir(&self.dir)
            .map_err(|source| StateStoreError::io("syncing state directory", &self.dir, source))
    }
}

/// Saves `bundle` into `dir` with default settings.
pub fn save(dir: impl Into<PathBuf>, bundle: &StateBundle) -> Result<SavedSnapshot, StateStoreError> {
    SnapshotStore::new(dir).save(bundle)
}

/// Loads the latest bundle from `dir` with default settings.
pub fn load_latest(dir: impl Into<PathBuf>) -> Result<StateBundle, StateUnavailable> {
    SnapshotStore::new(dir).load_latest()
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), StateStoreError> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options
        .open(path)
        .map_err(|source| StateStoreError::io("creating temp file", path, source))?;
    file.write_all(bytes)
        .map_err(|source| StateStoreError::io("writing temp file", path, source))?;
    file.sync_all()
        .map_err(|source| StateStoreError::io("syncing temp file", path, source))
}

fn ensure_private_dir(dir: &Path) -> Result<(), StateStoreError> {
    if !dir.exists() {
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }
        builder
            .create(dir)
            .map_err(|source| StateStoreError::io("creating state directory", dir, source))?;
    }

    check_dir_security(dir)
}

/// Rejects directories another user could write into or that we don't own.
#[cfg(unix)]
fn check_dir_security(dir: &Path) -> Result<(), StateStoreError> {
    use std::os::unix::fs::{MetadataExt, PermissionsExt};

    let metadata = fs::metadata(dir)
        .map_err(|source| StateStoreError::io("inspecting state directory", dir, source))?;
    if !metadata.is_dir() {
        return Err(StateStoreError::io(
            "inspecting state directory",
            dir,
            std::io::Error::other("not a directory"),
        ));
    }

    // SAFETY: geteuid has no preconditions and cannot fail.
    let euid = unsafe { libc::geteuid() };
    if metadata.uid() != euid {
        return Err(StateStoreError::ForeignOwner {
            path: dir.to_path_buf(),
            owner: metadata.uid(),
        });
    }

    let mode = metadata.permissions().mode() & 0o777;
    if mode & 0o022 != 0 {
        return Err(StateStoreError::InsecureDirectory {
            path: dir.to_path_buf(),
            mode,
        });
    }

    Ok(())
}

#[cfg(not(unix))]
fn check_dir_security(dir: &Path) -> Result<(), StateStoreError> {
    let metadata = fs::metadata(dir)
        .map_err(|source| StateStoreError::io("inspecting state directory", dir, source))?;
    if !metadata.is_dir() {
        return Err(StateStoreError::io(
            "inspecting state directory",
            dir,
            std::io::Error::other("not a directory"),
        ));
    }
    Ok(())
}

#[cfg(unix)]
fn restrict_dir_permissions(dir: &Path) -> Result<(), StateStoreError> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(dir, fs::Permissions::from_mode(0o700))
        .map_err(|source| StateStoreError::io("restricting state directory", dir, source))
}

#[cfg(not(unix))]
fn restrict_dir_permissions(_dir: &Path) -> Result<(), StateStoreError> {
    Ok(())
}
