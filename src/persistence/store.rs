//! The snapshot store: load-latest and the optimistic commit protocol.
//!
//! Several writers (the daemon's two loops, a cron-run one-shot, a manual
//! invocation) may share one state directory without coordination. The store
//! serializes them through the filesystem: revision `N+1` can be created by
//! exactly one writer, because [`write_snapshot_exclusive`] publishes the
//! file with a hard link that fails if the name is taken.
//!
//! # Commit protocol
//!
//! 1. Clone the loaded snapshot and finalize it: apply the tick's ops, sweep
//!    expired items, refresh limiter targets, prune.
//! 2. If nothing changed, skip the write.
//! 3. Attempt to create `snapshot.<revision+1>.json` exclusively.
//! 4. On `AlreadyExists`, another writer won the revision: reload the latest
//!    snapshot and go to 1. Ops are idempotent, so replaying them against
//!    the winner's state is safe.
//! 5. After a bounded number of conflicts, give up; the tick's work is
//!    abandoned and a later tick redoes it from current state.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use super::pruning::{PruneConfig, prune_snapshot};
use super::revision::{
    RevisionError, delete_old_snapshots, latest_revision, list_snapshot_revisions,
    read_revision_hint, snapshot_path, write_revision_hint,
};
use super::snapshot::{
    PersistedSnapshot, SnapshotError, try_load_snapshot, write_snapshot_exclusive,
};
use crate::state::queue::sweep_expired;
use crate::state::transitions::{StateOp, apply_ops};

/// Default bound on commit attempts before a tick abandons its write.
pub const DEFAULT_MAX_COMMIT_ATTEMPTS: u32 = 5;

/// Default number of trailing snapshot revisions kept on disk.
pub const DEFAULT_KEEP_REVISIONS: u64 = 8;

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Revision(#[from] RevisionError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Every commit attempt lost the revision race.
    #[error("commit abandoned after {attempts} conflicting attempts")]
    ConflictExhausted { attempts: u32 },
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Store tuning knobs.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Commit attempts before [`StoreError::ConflictExhausted`].
    pub max_commit_attempts: u32,

    /// Trailing revisions kept on disk after a commit.
    pub keep_revisions: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            max_commit_attempts: DEFAULT_MAX_COMMIT_ATTEMPTS,
            keep_revisions: DEFAULT_KEEP_REVISIONS,
        }
    }
}

/// Everything a commit needs besides the ops: the clock, the pruning policy,
/// and the configured limiter targets. Held separately from the snapshot so
/// a conflict replay can re-derive the derived parts against fresh state.
#[derive(Debug, Clone)]
pub struct CommitContext<'a> {
    pub now: DateTime<Utc>,
    pub prune: &'a PruneConfig,
    pub daily_target: u32,
    pub min_interval_secs: u32,
}

/// How a commit concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// A new revision was written.
    Committed { revision: u64, conflicts: u32 },

    /// The finalized snapshot was identical to the loaded one; no write.
    Unchanged { revision: u64 },
}

impl CommitOutcome {
    pub fn revision(&self) -> u64 {
        match self {
            CommitOutcome::Committed { revision, .. } => *revision,
            CommitOutcome::Unchanged { revision } => *revision,
        }
    }
}

/// Handle on one state directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    state_dir: PathBuf,
    config: StoreConfig,
}

impl SnapshotStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        SnapshotStore::with_config(state_dir, StoreConfig::default())
    }

    pub fn with_config(state_dir: impl Into<PathBuf>, config: StoreConfig) -> Self {
        SnapshotStore {
            state_dir: state_dir.into(),
            config,
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Loads the latest committed snapshot.
    ///
    /// The directory scan is authoritative; the revision hint only gets a
    /// staleness check. A fresh directory yields the empty snapshot at
    /// revision zero. A snapshot file that fails to parse is skipped with a
    /// warning in favor of the previous revision.
    pub fn load_latest(&self) -> Result<PersistedSnapshot> {
        match read_revision_hint(&self.state_dir) {
            Ok(hint) => {
                if let Some(latest) = latest_revision(&self.state_dir)?
                    && hint != latest
                {
                    debug!(hint, latest, "revision hint is stale");
                }
            }
            Err(RevisionError::InvalidNumber(raw)) => {
                warn!(raw, "revision hint unreadable; relying on the scan");
            }
            Err(RevisionError::Io(e)) => return Err(e.into()),
        }

        let mut revisions = list_snapshot_revisions(&self.state_dir)?;
        revisions.reverse();

        let mut last_err: Option<SnapshotError> = None;
        for revision in revisions {
            match try_load_snapshot(&snapshot_path(&self.state_dir, revision)) {
                Ok(Some(snapshot)) => return Ok(snapshot),
                // Deleted between scan and load; keep walking back.
                Ok(None) => {}
                Err(e @ SnapshotError::Json(_)) => {
                    warn!(revision, error = %e, "skipping unreadable snapshot");
                    last_err = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        match last_err {
            // Only unreadable snapshots exist: refusing is safer than
            // silently restarting from empty state.
            Some(e) => Err(e.into()),
            None => Ok(PersistedSnapshot::new()),
        }
    }

    /// Commits the tick's ops on top of `base`, retrying through conflicts.
    ///
    /// `base` is the snapshot the tick made its decisions against. On a
    /// conflict the ops are replayed against the winner's snapshot and the
    /// derived mutations (sweep, limiter targets, prune) are re-derived, so
    /// the committed state never loses another writer's work.
    pub fn commit(
        &self,
        base: PersistedSnapshot,
        ops: &[StateOp],
        ctx: &CommitContext<'_>,
    ) -> Result<CommitOutcome> {
        let mut current = base;

        for conflicts in 0..self.config.max_commit_attempts {
            let mut candidate = current.clone();
            let changed = finalize(&mut candidate, ops, ctx);

            if !changed {
                debug!(revision = current.revision, "no effective change; skipping write");
                return Ok(CommitOutcome::Unchanged {
                    revision: current.revision,
                });
            }

            let next = current.revision + 1;
            candidate.revision = next;
            candidate.touch();

            match write_snapshot_exclusive(&snapshot_path(&self.state_dir, next), &candidate) {
                Ok(()) => {
                    // The snapshot is durable; hint and cleanup failures
                    // must not fail the commit.
                    if let Err(e) = write_revision_hint(&self.state_dir, next) {
                        warn!(revision = next, error = %e, "failed to update revision hint");
                    }
                    if let Err(e) =
                        delete_old_snapshots(&self.state_dir, next, self.config.keep_revisions)
                    {
                        warn!(revision = next, error = %e, "failed to delete old snapshots");
                    }
                    return Ok(CommitOutcome::Committed {
                        revision: next,
                        conflicts,
                    });
                }
                Err(SnapshotError::Io(e)) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!(revision = next, "lost the revision race; replaying");
                    current = self.load_latest()?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(StoreError::ConflictExhausted {
            attempts: self.config.max_commit_attempts,
        })
    }
}

/// Applies the full per-commit mutation to a snapshot copy. Returns whether
/// anything actually changed.
fn finalize(snapshot: &mut PersistedSnapshot, ops: &[StateOp], ctx: &CommitContext<'_>) -> bool {
    let applied = apply_ops(snapshot, ops);
    let swept = sweep_expired(&mut snapshot.queue, ctx.now);
    let retargeted = snapshot
        .rate_limiter
        .apply_targets(ctx.daily_target, ctx.min_interval_secs);
    let pruned = prune_snapshot(snapshot, ctx.prune, ctx.now);

    applied > 0 || swept > 0 || retargeted || pruned.changed()
}
