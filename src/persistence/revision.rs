//! Revision numbering and the revision hint file.
//!
//! Snapshot revisions are named into the files themselves
//! (`snapshot.<revision>.json`), so a directory scan always recovers the
//! latest committed state. The `revision` file is a hint written after each
//! commit: it lets readers jump straight to the right file, but it is
//! written after the snapshot and a crash can leave it stale. The scan is
//! authoritative; the hint is an optimization.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::snapshot::{fsync_dir, fsync_file};

/// Errors that can occur during revision file operations.
#[derive(Debug, Error)]
pub enum RevisionError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Failed to parse a revision number.
    #[error("invalid revision number: {0}")]
    InvalidNumber(String),
}

/// Result type for revision file operations.
pub type Result<T> = std::result::Result<T, RevisionError>;

/// Returns the path of the snapshot file for a given revision.
pub fn snapshot_path(state_dir: &Path, revision: u64) -> PathBuf {
    state_dir.join(format!("snapshot.{}.json", revision))
}

/// Extracts the revision from a `snapshot.<revision>.json` filename.
pub fn parse_snapshot_filename(name: &str) -> Option<u64> {
    name.strip_prefix("snapshot.")
        .and_then(|s| s.strip_suffix(".json"))
        .and_then(|s| s.parse().ok())
}

/// Reads the revision hint. Returns `Ok(0)` if the file doesn't exist
/// (fresh state directory) or is empty.
pub fn read_revision_hint(state_dir: &Path) -> Result<u64> {
    let path = state_dir.join("revision");

    match File::open(&path) {
        Ok(file) => {
            let reader = BufReader::new(file);
            let first_line = reader.lines().next();

            match first_line {
                Some(Ok(line)) => line
                    .trim()
                    .parse()
                    .map_err(|_| RevisionError::InvalidNumber(line)),
                Some(Err(e)) => Err(e.into()),
                None => Ok(0),
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}

/// Writes the revision hint atomically (write-to-temp-then-rename).
pub fn write_revision_hint(state_dir: &Path, revision: u64) -> Result<()> {
    let path = state_dir.join("revision");
    let tmp_path = state_dir.join("revision.tmp");

    std::fs::create_dir_all(state_dir)?;

    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        writeln!(file, "{}", revision)?;
        fsync_file(&file)?;
    }

    std::fs::rename(&tmp_path, &path)?;
    fsync_dir(state_dir)?;

    Ok(())
}

/// Lists all snapshot revisions present in the state directory, ascending.
///
/// A missing directory yields an empty list. Files that do not match the
/// snapshot naming scheme are ignored.
pub fn list_snapshot_revisions(state_dir: &Path) -> io::Result<Vec<u64>> {
    let mut revisions = Vec::new();

    if !state_dir.exists() {
        return Ok(revisions);
    }

    for entry in std::fs::read_dir(state_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if let Some(revision) = parse_snapshot_filename(&name.to_string_lossy()) {
            revisions.push(revision);
        }
    }

    revisions.sort_unstable();
    Ok(revisions)
}

/// Finds the highest snapshot revision on disk, if any.
pub fn latest_revision(state_dir: &Path) -> io::Result<Option<u64>> {
    Ok(list_snapshot_revisions(state_dir)?.last().copied())
}

/// Deletes snapshot files older than `keep_from` revisions below the latest.
///
/// Keeping a short tail of revisions lets an operator inspect recent history
/// and lets a reader that resolved the latest revision a moment ago still
/// open its file. Missing files are tolerated; other errors are propagated.
pub fn delete_old_snapshots(state_dir: &Path, latest: u64, keep: u64) -> Result<()> {
    let cutoff = latest.saturating_sub(keep);
    let mut deleted = false;

    for revision in list_snapshot_revisions(state_dir)? {
        if revision >= cutoff {
            continue;
        }
        match std::fs::remove_file(snapshot_path(state_dir, revision)) {
            Ok(()) => deleted = true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }

    if deleted {
        match fsync_dir(state_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::tempdir;

    // ─── Property tests ───

    proptest! {
        /// Write and read roundtrip preserves the hint.
        #[test]
        fn hint_write_read_roundtrip(revision in 0u64..1000000) {
            let dir = tempdir().unwrap();
            write_revision_hint(dir.path(), revision).unwrap();
            let read = read_revision_hint(dir.path()).unwrap();
            prop_assert_eq!(revision, read);
        }

        /// The hint write is atomic: no temp file remains.
        #[test]
        fn no_temp_file_remains(revision in 0u64..1000) {
            let dir = tempdir().unwrap();
            write_revision_hint(dir.path(), revision).unwrap();
            prop_assert!(!dir.path().join("revision.tmp").exists());
        }
    }

    // ─── Unit tests ───

    #[test]
    fn read_nonexistent_hint_returns_zero() {
        let dir = tempdir().unwrap();
        assert_eq!(read_revision_hint(dir.path()).unwrap(), 0);
    }

    #[test]
    fn read_empty_hint_returns_zero() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join("revision")).unwrap();
        assert_eq!(read_revision_hint(dir.path()).unwrap(), 0);
    }

    #[test]
    fn read_corrupt_hint_returns_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("revision"), "not a number\n").unwrap();

        let result = read_revision_hint(dir.path());
        assert!(matches!(result, Err(RevisionError::InvalidNumber(_))));
    }

    #[test]
    fn snapshot_path_format() {
        let dir = Path::new("/tmp/state");
        assert_eq!(
            snapshot_path(dir, 0),
            Path::new("/tmp/state/snapshot.0.json")
        );
        assert_eq!(
            snapshot_path(dir, 42),
            Path::new("/tmp/state/snapshot.42.json")
        );
    }

    #[test]
    fn parse_filename_accepts_only_the_scheme() {
        assert_eq!(parse_snapshot_filename("snapshot.7.json"), Some(7));
        assert_eq!(parse_snapshot_filename("snapshot.0.json"), Some(0));
        assert_eq!(parse_snapshot_filename("snapshot.json"), None);
        assert_eq!(parse_snapshot_filename("snapshot.7.json.tmp"), None);
        assert_eq!(parse_snapshot_filename("snapshot.x.json"), None);
        assert_eq!(parse_snapshot_filename("revision"), None);
    }

    #[test]
    fn list_revisions_sorted_and_filtered() {
        let dir = tempdir().unwrap();
        File::create(snapshot_path(dir.path(), 5)).unwrap();
        File::create(snapshot_path(dir.path(), 1)).unwrap();
        File::create(snapshot_path(dir.path(), 3)).unwrap();
        File::create(dir.path().join("revision")).unwrap();
        File::create(dir.path().join("other.txt")).unwrap();

        let revisions = list_snapshot_revisions(dir.path()).unwrap();
        assert_eq!(revisions, vec![1, 3, 5]);
    }

    #[test]
    fn list_revisions_missing_dir_is_empty() {
        let dir = tempdir().unwrap();
        let nonexistent = dir.path().join("nonexistent");
        assert!(list_snapshot_revisions(&nonexistent).unwrap().is_empty());
    }

    #[test]
    fn latest_revision_picks_the_max() {
        let dir = tempdir().unwrap();
        assert_eq!(latest_revision(dir.path()).unwrap(), None);

        File::create(snapshot_path(dir.path(), 2)).unwrap();
        File::create(snapshot_path(dir.path(), 9)).unwrap();
        assert_eq!(latest_revision(dir.path()).unwrap(), Some(9));
    }

    #[test]
    fn stale_hint_is_recoverable_by_scanning() {
        // A crash between snapshot write and hint write leaves the hint one
        // revision behind; the scan still finds the newer snapshot.
        let dir = tempdir().unwrap();
        write_revision_hint(dir.path(), 4).unwrap();
        File::create(snapshot_path(dir.path(), 4)).unwrap();
        File::create(snapshot_path(dir.path(), 5)).unwrap();

        assert_eq!(read_revision_hint(dir.path()).unwrap(), 4);
        assert_eq!(latest_revision(dir.path()).unwrap(), Some(5));
    }

    #[test]
    fn delete_old_keeps_the_tail() {
        let dir = tempdir().unwrap();
        for revision in 0..10 {
            File::create(snapshot_path(dir.path(), revision)).unwrap();
        }

        delete_old_snapshots(dir.path(), 9, 3).unwrap();

        let remaining = list_snapshot_revisions(dir.path()).unwrap();
        assert_eq!(remaining, vec![6, 7, 8, 9]);
    }

    #[test]
    fn delete_old_handles_missing_files_and_dirs() {
        let dir = tempdir().unwrap();
        delete_old_snapshots(dir.path(), 5, 2).unwrap();

        let nonexistent = dir.path().join("nonexistent");
        delete_old_snapshots(&nonexistent, 5, 2).unwrap();
    }

    #[test]
    fn delete_old_saturates_below_zero() {
        let dir = tempdir().unwrap();
        File::create(snapshot_path(dir.path(), 0)).unwrap();
        File::create(snapshot_path(dir.path(), 1)).unwrap();

        delete_old_snapshots(dir.path(), 1, 8).unwrap();

        assert_eq!(list_snapshot_revisions(dir.path()).unwrap(), vec![0, 1]);
    }
}
