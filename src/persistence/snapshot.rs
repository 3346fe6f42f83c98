//! The persisted snapshot: the single shared state artifact.
//!
//! One snapshot bundles the live queue, the posted history, and the
//! rate-limiter counters. Every tick loads the latest snapshot, mutates a
//! copy, and commits it as the next revision (see `store.rs`).
//!
//! # File Format
//!
//! Snapshots are stored as `snapshot.<revision>.json`. A revision file is
//! immutable once it exists; commits create the next revision rather than
//! rewriting the current one.
//!
//! # Atomic Writes
//!
//! Two write paths, both crash-safe:
//!
//! 1. [`save_snapshot_atomic`]: write `<path>.tmp`, fsync, rename over
//!    `<path>`, fsync the directory. Used where overwriting is intended.
//! 2. [`write_snapshot_exclusive`]: write a unique temp file, fsync, then
//!    `hard_link` it to `<path>`, fsync the directory. Linking fails with
//!    `AlreadyExists` if the path is taken, which is what makes the commit
//!    protocol's compare-and-swap work: a revision file either exists in
//!    full or not at all, and only one writer can create it.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::limiter::RateLimiterState;
use crate::types::{Item, ItemId, PostedRecord};

/// Current schema version. Increment when making breaking changes.
pub const SCHEMA_VERSION: u32 = 1;

/// Errors that can occur during snapshot operations.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Schema version mismatch.
    #[error("schema version mismatch: expected {expected}, got {got}")]
    SchemaMismatch { expected: u32, got: u32 },
}

/// Result type for snapshot operations.
pub type Result<T> = std::result::Result<T, SnapshotError>;

/// The persisted state bundle.
///
/// This is the JSON structure stored at `<state_dir>/snapshot.<revision>.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    /// Schema version for forward-compatible migrations.
    pub schema_version: u32,

    /// When this snapshot was committed.
    pub snapshot_at: DateTime<Utc>,

    /// Monotonic revision counter; matches the filename suffix.
    pub revision: u64,

    /// Admitted items, live and recently terminal (terminal entries are
    /// removed by pruning at commit time).
    pub queue: Vec<Item>,

    /// Published items within the retention window, newest last.
    pub posted_history: Vec<PostedRecord>,

    /// Rolling-window publish counters.
    pub rate_limiter: RateLimiterState,
}

impl PersistedSnapshot {
    /// Creates the empty initial snapshot at revision zero.
    pub fn new() -> Self {
        PersistedSnapshot {
            schema_version: SCHEMA_VERSION,
            snapshot_at: Utc::now(),
            revision: 0,
            queue: Vec::new(),
            posted_history: Vec::new(),
            rate_limiter: RateLimiterState::default(),
        }
    }

    /// Updates the `snapshot_at` timestamp to now.
    pub fn touch(&mut self) {
        self.snapshot_at = Utc::now();
    }

    /// True if the dedup key is present in the queue or the posted history.
    pub fn contains_id(&self, id: &ItemId) -> bool {
        self.queue.iter().any(|item| &item.id == id)
            || self.posted_history.iter().any(|record| &record.id == id)
    }

    /// Looks up a queue entry by id.
    pub fn find_item(&self, id: &ItemId) -> Option<&Item> {
        self.queue.iter().find(|item| &item.id == id)
    }

    /// Looks up a queue entry by id, mutably.
    pub fn find_item_mut(&mut self, id: &ItemId) -> Option<&mut Item> {
        self.queue.iter_mut().find(|item| &item.id == id)
    }

    /// Looks up a posted record by id.
    pub fn find_posted(&self, id: &ItemId) -> Option<&PostedRecord> {
        self.posted_history.iter().find(|record| &record.id == id)
    }
}

impl Default for PersistedSnapshot {
    fn default() -> Self {
        PersistedSnapshot::new()
    }
}

pub(crate) fn fsync_file(file: &File) -> io::Result<()> {
    file.sync_all()
}

// Directory entries (creates, renames, links) need their own fsync on POSIX
// or they may not survive power loss even when the file contents did.
pub(crate) fn fsync_dir(dir_path: &Path) -> io::Result<()> {
    let dir = OpenOptions::new().read(true).open(dir_path)?;
    dir.sync_all()
}

/// Saves a snapshot atomically to disk, overwriting `path` if present.
///
/// Write-to-temp-then-rename: readers always see either the old or the new
/// file, never a partial write.
pub fn save_snapshot_atomic(path: &Path, snapshot: &PersistedSnapshot) -> Result<()> {
    use std::io::Write;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    let bytes = serde_json::to_vec_pretty(snapshot)?;

    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(&bytes)?;
        fsync_file(&file)?;
    }

    std::fs::rename(&tmp_path, path)?;

    if let Some(parent) = path.parent() {
        fsync_dir(parent)?;
    }

    Ok(())
}

/// Writes a snapshot to `path`, failing if `path` already exists.
///
/// The content is fully written and fsynced to a unique temp file before the
/// `hard_link` publishes it, so `path` can never hold a partial snapshot.
/// An `AlreadyExists` IO error means another writer claimed this revision
/// first; the commit protocol treats that as a conflict.
pub fn write_snapshot_exclusive(path: &Path, snapshot: &PersistedSnapshot) -> Result<()> {
    use std::io::Write;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = exclusive_tmp_path(path);
    let bytes = serde_json::to_vec_pretty(snapshot)?;

    {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)?;
        file.write_all(&bytes)?;
        fsync_file(&file)?;
    }

    let linked = std::fs::hard_link(&tmp_path, path);
    // The temp file is removed whether or not the link won; stray temp files
    // are invisible to the revision scan in any case.
    let _ = std::fs::remove_file(&tmp_path);
    linked?;

    if let Some(parent) = path.parent() {
        fsync_dir(parent)?;
    }

    Ok(())
}

// Temp names carry pid and a counter: overlapping invocations (and tasks
// within one process) must never collide on the temp file either.
fn exclusive_tmp_path(path: &Path) -> PathBuf {
    static TMP_SEQ: AtomicU64 = AtomicU64::new(0);
    let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
    path.with_extension(format!("json.{}.{}.tmp", std::process::id(), seq))
}

/// Loads a snapshot from disk.
///
/// # Errors
///
/// Returns an error if the file is missing or unreadable, the JSON is
/// malformed, or the schema version is incompatible.
pub fn load_snapshot(path: &Path) -> Result<PersistedSnapshot> {
    let bytes = std::fs::read(path)?;
    let snapshot: PersistedSnapshot = serde_json::from_slice(&bytes)?;

    if snapshot.schema_version != SCHEMA_VERSION {
        return Err(SnapshotError::SchemaMismatch {
            expected: SCHEMA_VERSION,
            got: snapshot.schema_version,
        });
    }

    Ok(snapshot)
}

/// Attempts to load a snapshot, returning None if the file doesn't exist.
///
/// Other errors (malformed JSON, schema mismatch) are propagated.
pub fn try_load_snapshot(path: &Path) -> Result<Option<PersistedSnapshot>> {
    match load_snapshot(path) {
        Ok(snapshot) => Ok(Some(snapshot)),
        Err(SnapshotError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{arb_snapshot, sample_item, sample_posted_record};
    use chrono::Duration;
    use proptest::prelude::*;
    use tempfile::tempdir;

    // ─── Property tests ───

    proptest! {
        /// Snapshot serialization roundtrip preserves all data.
        #[test]
        fn snapshot_serde_roundtrip(snapshot in arb_snapshot()) {
            let json = serde_json::to_string(&snapshot).unwrap();
            let parsed: PersistedSnapshot = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(snapshot, parsed);
        }

        /// Atomic save and load roundtrip preserves all data.
        #[test]
        fn atomic_save_load_roundtrip(snapshot in arb_snapshot()) {
            let dir = tempdir().unwrap();
            let path = dir.path().join("snapshot.0.json");

            save_snapshot_atomic(&path, &snapshot).unwrap();
            let loaded = load_snapshot(&path).unwrap();

            prop_assert_eq!(snapshot, loaded);
        }

        /// Exclusive write and load roundtrip preserves all data.
        #[test]
        fn exclusive_write_load_roundtrip(snapshot in arb_snapshot()) {
            let dir = tempdir().unwrap();
            let path = dir.path().join("snapshot.1.json");

            write_snapshot_exclusive(&path, &snapshot).unwrap();
            let loaded = load_snapshot(&path).unwrap();

            prop_assert_eq!(snapshot, loaded);
        }

        /// No temp files remain after either write path.
        #[test]
        fn temp_files_cleaned_up(snapshot in arb_snapshot()) {
            let dir = tempdir().unwrap();

            save_snapshot_atomic(&dir.path().join("snapshot.0.json"), &snapshot).unwrap();
            write_snapshot_exclusive(&dir.path().join("snapshot.1.json"), &snapshot).unwrap();

            let stray: Vec<String> = std::fs::read_dir(dir.path())
                .unwrap()
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .filter(|name| name.ends_with(".tmp"))
                .collect();
            prop_assert!(stray.is_empty(), "stray temp files: {:?}", stray);
        }
    }

    // ─── Unit tests ───

    #[test]
    fn new_snapshot_is_empty_at_revision_zero() {
        let snapshot = PersistedSnapshot::new();

        assert_eq!(snapshot.schema_version, SCHEMA_VERSION);
        assert_eq!(snapshot.revision, 0);
        assert!(snapshot.queue.is_empty());
        assert!(snapshot.posted_history.is_empty());
        assert!(snapshot.rate_limiter.window_events.is_empty());
    }

    #[test]
    fn contains_id_covers_queue_and_history() {
        let now = Utc::now();
        let mut snapshot = PersistedSnapshot::new();
        let queued = sample_item("queued", 5, now);
        let posted = sample_posted_record("posted", now);

        snapshot.queue.push(queued.clone());
        snapshot.posted_history.push(posted.clone());

        assert!(snapshot.contains_id(&queued.id));
        assert!(snapshot.contains_id(&posted.id));
        assert!(!snapshot.contains_id(&sample_item("absent", 1, now).id));
    }

    #[test]
    fn exclusive_write_rejects_existing_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snapshot.1.json");
        let snapshot = PersistedSnapshot::new();

        write_snapshot_exclusive(&path, &snapshot).unwrap();
        let second = write_snapshot_exclusive(&path, &snapshot);

        match second {
            Err(SnapshotError::Io(e)) => {
                assert_eq!(e.kind(), io::ErrorKind::AlreadyExists);
            }
            other => panic!("expected AlreadyExists, got {other:?}"),
        }
    }

    #[test]
    fn exclusive_write_loser_leaves_winner_intact() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snapshot.1.json");

        let mut winner = PersistedSnapshot::new();
        winner.revision = 1;
        let mut loser = winner.clone();
        loser.queue.push(sample_item("loser", 1, Utc::now()));

        write_snapshot_exclusive(&path, &winner).unwrap();
        let _ = write_snapshot_exclusive(&path, &loser);

        let on_disk = load_snapshot(&path).unwrap();
        assert_eq!(on_disk, winner);
    }

    #[test]
    fn load_nonexistent_returns_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nonexistent.json");

        let result = load_snapshot(&path);
        assert!(matches!(result, Err(SnapshotError::Io(_))));
    }

    #[test]
    fn try_load_nonexistent_returns_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nonexistent.json");

        let result = try_load_snapshot(&path).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("invalid.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = load_snapshot(&path);
        assert!(matches!(result, Err(SnapshotError::Json(_))));
    }

    #[test]
    fn load_wrong_schema_version_returns_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wrong_version.json");

        let mut snapshot = PersistedSnapshot::new();
        snapshot.schema_version = SCHEMA_VERSION + 1;

        // Write directly to avoid the schema check on save
        let json = serde_json::to_string(&snapshot).unwrap();
        std::fs::write(&path, json).unwrap();

        let result = load_snapshot(&path);
        assert!(matches!(
            result,
            Err(SnapshotError::SchemaMismatch {
                expected: SCHEMA_VERSION,
                got,
            }) if got == SCHEMA_VERSION + 1
        ));
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/dir/snapshot.0.json");

        let snapshot = PersistedSnapshot::new();
        save_snapshot_atomic(&path, &snapshot).unwrap();

        assert!(path.exists());
    }

    #[test]
    fn touch_advances_snapshot_at() {
        let mut snapshot = PersistedSnapshot::new();
        snapshot.snapshot_at = Utc::now() - Duration::hours(1);
        let before = snapshot.snapshot_at;

        snapshot.touch();

        assert!(snapshot.snapshot_at > before);
    }
}
