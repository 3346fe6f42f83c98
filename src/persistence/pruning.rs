//! Snapshot pruning: bounded growth for the queue, the history, and the
//! limiter window.
//!
//! Pruning runs inside every commit, after the tick's ops have been applied.
//! It removes what no future decision can depend on:
//!
//! | Data | Retention |
//! |------|-----------|
//! | Queued items | Kept, capped at `max_queued_items` by priority |
//! | Terminal items (posted/expired/failed) | Removed; posted items live on in the history |
//! | Posted history | `posted_retention_days` (dedup horizon) |
//! | Limiter events | The trailing 24h window |

use chrono::{DateTime, Duration, Utc};

use super::snapshot::PersistedSnapshot;
use crate::state::queue::evict_over_cap;
use crate::types::ItemId;

/// Configuration for pruning.
#[derive(Debug, Clone)]
pub struct PruneConfig {
    /// Days a posted record stays in the history (and thus blocks
    /// re-admission of its URL). Default: 30.
    pub posted_retention_days: u32,

    /// Maximum number of queued items. Default: 100.
    pub max_queued_items: usize,
}

impl Default for PruneConfig {
    fn default() -> Self {
        PruneConfig {
            posted_retention_days: 30,
            max_queued_items: 100,
        }
    }
}

/// What a pruning pass removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Terminal items dropped from the queue.
    pub terminal_removed: usize,

    /// Queued items evicted over the cap, lowest priority first.
    pub evicted: Vec<ItemId>,

    /// Posted records past the retention window.
    pub history_removed: usize,

    /// Limiter events past the trailing window.
    pub window_removed: usize,
}

impl PruneReport {
    /// True if the pass mutated the snapshot at all.
    pub fn changed(&self) -> bool {
        self.terminal_removed > 0
            || !self.evicted.is_empty()
            || self.history_removed > 0
            || self.window_removed > 0
    }
}

/// Prunes stale data from a snapshot in place.
pub fn prune_snapshot(
    snapshot: &mut PersistedSnapshot,
    config: &PruneConfig,
    now: DateTime<Utc>,
) -> PruneReport {
    let mut report = PruneReport::default();

    let before = snapshot.queue.len();
    snapshot.queue.retain(|item| !item.status.is_terminal());
    report.terminal_removed = before - snapshot.queue.len();

    report.evicted = evict_over_cap(&mut snapshot.queue, config.max_queued_items);

    let retention = Duration::days(i64::from(config.posted_retention_days));
    let cutoff = now - retention;
    let before = snapshot.posted_history.len();
    snapshot.posted_history.retain(|r| r.posted_at > cutoff);
    report.history_removed = before - snapshot.posted_history.len();

    report.window_removed = snapshot.rate_limiter.prune_window(now);

    report
}
