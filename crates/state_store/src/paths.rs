use std::path::{Component, Path};

pub const LATEST_FILE_NAME: &str = "latest.json";
pub const LOCK_FILE_NAME: &str = "state.lock";
pub const SNAPSHOT_PREFIX: &str = "state-";
pub const SNAPSHOT_SUFFIX: &str = ".json";

/// Number of leading digest hex characters embedded in a snapshot name.
pub const SNAPSHOT_HASH_LEN: usize = 8;

#[must_use]
pub fn sanitize_timestamp_for_filename(timestamp: &str) -> String {
    timestamp
        .chars()
        .filter(|c| !matches!(c, ':' | '/' | '\\' | ' '))
        .collect()
}

/// Content-addressed name for a snapshot: `state-<timestamp>-<hash8>.json`.
#[must_use]
pub fn snapshot_file_name(created_at: &str, digest_hex: &str) -> String {
    let hash8 = digest_hex.get(..SNAPSHOT_HASH_LEN).unwrap_or(digest_hex);
    format!(
        "{SNAPSHOT_PREFIX}{}-{hash8}{SNAPSHOT_SUFFIX}",
        sanitize_timestamp_for_filename(created_at)
    )
}

#[must_use]
pub fn is_snapshot_file_name(name: &str) -> bool {
    name.starts_with(SNAPSHOT_PREFIX) && name.ends_with(SNAPSHOT_SUFFIX) && is_bare_file_name(name)
}

/// Chronological sort key for a snapshot name.
///
/// Whole seconds compare first, then the fractional digits, so
/// `T000000Z` orders before `T000000.5Z` even though `.` sorts before `Z`.
pub(crate) fn snapshot_sort_key(name: &str) -> (&str, &str, &str) {
    let stamp = name
        .strip_prefix(SNAPSHOT_PREFIX)
        .and_then(|rest| rest.strip_suffix(SNAPSHOT_SUFFIX))
        .and_then(|rest| rest.rsplit_once('-'))
        .map_or(name, |(stamp, _hash)| stamp);
    let not_digit = |c: char| !c.is_ascii_digit();
    match stamp.split_once('.') {
        Some((whole, fraction)) => (whole, fraction.trim_end_matches(not_digit), name),
        None => (stamp.trim_end_matches(not_digit), "", name),
    }
}

/// True when `name` is a single normal path component with no separators.
///
/// Pointer paths are resolved against the state directory, so anything else
/// could escape it.
#[must_use]
pub fn is_bare_file_name(name: &str) -> bool {
    if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains('\0') {
        return false;
    }

    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && name != "."
        && name != ".."
}
