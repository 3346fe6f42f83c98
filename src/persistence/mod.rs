//! Persistence layer for the news bot.
//!
//! State lives in a single directory of immutable, versioned snapshot files.
//! There is no event log and no lock file: concurrency control is the
//! exclusive creation of the next revision's file.
//!
//! # File Layout
//!
//! ```text
//! <state_dir>/
//!   revision          # latest revision hint (single integer, may be stale)
//!   snapshot.N.json   # full state at revision N, immutable once created
//! ```
//!
//! # Recovery
//!
//! On load, scan for the highest `snapshot.N.json`; the hint file is only a
//! shortcut. A fresh directory is the empty snapshot at revision zero.
//!
//! # Crash Safety
//!
//! - Snapshot files are fully written and fsynced before a hard link makes
//!   them visible under their final name; a revision file can never be seen
//!   partially written.
//! - The hint file is written atomically after the snapshot; a stale hint is
//!   tolerated by the scan.

pub mod pruning;
pub mod revision;
pub mod snapshot;
pub mod store;

pub use pruning::{PruneConfig, PruneReport, prune_snapshot};
pub use revision::{
    delete_old_snapshots, latest_revision, list_snapshot_revisions, parse_snapshot_filename,
    read_revision_hint, snapshot_path, write_revision_hint,
};
pub use snapshot::{
    PersistedSnapshot, SCHEMA_VERSION, load_snapshot, save_snapshot_atomic, try_load_snapshot,
    write_snapshot_exclusive,
};
pub use store::{CommitContext, CommitOutcome, SnapshotStore, StoreConfig, StoreError};
