//! State operations and their application to a snapshot.
//!
//! A tick never writes the snapshot directly. It describes its intent as a
//! list of [`StateOp`]s and hands them to the commit protocol, which applies
//! them to whichever snapshot revision it ends up committing against. Every
//! op is keyed by item id and idempotent: replaying it onto a snapshot that
//! already reflects it is a no-op. That is the property that makes
//! conflict-replay safe.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::persistence::snapshot::PersistedSnapshot;
use crate::types::{ExternalPostId, Item, ItemId, ItemStatus, PostedRecord};

/// An intended change to the persisted state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StateOp {
    /// Admit an item to the queue. Ignored if the dedup key is already
    /// present in the queue or the posted history.
    Enqueue { item: Item },

    /// Raise an item's attempt counter to `attempt`. Expressed as a target
    /// value rather than an increment so replay cannot double-count.
    RecordAttempt { id: ItemId, attempt: u32 },

    /// Record a successful publish: the item turns `Posted`, a history
    /// record is appended, and the limiter gains a window event. Ignored if
    /// a posted record for the id already exists.
    MarkPosted {
        id: ItemId,
        posted_at: DateTime<Utc>,
        external_post_id: ExternalPostId,
    },

    /// Move a queued item to `Failed`. Ignored if the item is absent or
    /// already terminal.
    MarkFailed { id: ItemId },
}

impl StateOp {
    /// The id this op targets, for logging.
    pub fn item_id(&self) -> &ItemId {
        match self {
            StateOp::Enqueue { item } => &item.id,
            StateOp::RecordAttempt { id, .. } => id,
            StateOp::MarkPosted { id, .. } => id,
            StateOp::MarkFailed { id } => id,
        }
    }
}

/// Whether applying an op changed the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The snapshot was mutated.
    Applied,

    /// The snapshot already reflected the op.
    AlreadyApplied,
}

impl ApplyOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ApplyOutcome::Applied)
    }
}

/// Applies one op to a snapshot.
pub fn apply_op(snapshot: &mut PersistedSnapshot, op: &StateOp) -> ApplyOutcome {
    match op {
        StateOp::Enqueue { item } => apply_enqueue(snapshot, item),
        StateOp::RecordAttempt { id, attempt } => apply_record_attempt(snapshot, id, *attempt),
        StateOp::MarkPosted {
            id,
            posted_at,
            external_post_id,
        } => apply_mark_posted(snapshot, id, *posted_at, external_post_id),
        StateOp::MarkFailed { id } => apply_mark_failed(snapshot, id),
    }
}

/// Applies a batch of ops in order, returning how many actually mutated the
/// snapshot.
pub fn apply_ops(snapshot: &mut PersistedSnapshot, ops: &[StateOp]) -> usize {
    ops.iter()
        .filter(|op| apply_op(snapshot, op).is_applied())
        .count()
}

fn apply_enqueue(snapshot: &mut PersistedSnapshot, item: &Item) -> ApplyOutcome {
    if snapshot.contains_id(&item.id) {
        return ApplyOutcome::AlreadyApplied;
    }
    snapshot.queue.push(item.clone());
    ApplyOutcome::Applied
}

fn apply_record_attempt(
    snapshot: &mut PersistedSnapshot,
    id: &ItemId,
    attempt: u32,
) -> ApplyOutcome {
    match snapshot.find_item_mut(id) {
        Some(item) if item.attempts < attempt => {
            item.attempts = attempt;
            ApplyOutcome::Applied
        }
        _ => ApplyOutcome::AlreadyApplied,
    }
}

fn apply_mark_posted(
    snapshot: &mut PersistedSnapshot,
    id: &ItemId,
    posted_at: DateTime<Utc>,
    external_post_id: &ExternalPostId,
) -> ApplyOutcome {
    if snapshot.find_posted(id).is_some() {
        return ApplyOutcome::AlreadyApplied;
    }

    // The item may have been evicted by a racing writer; the history record
    // and the limiter event are still owed because the publish happened.
    if let Some(item) = snapshot.find_item_mut(id) {
        item.status = ItemStatus::Posted;
    }
    snapshot.posted_history.push(PostedRecord::new(
        id.clone(),
        posted_at,
        external_post_id.clone(),
    ));
    snapshot.rate_limiter.record(posted_at);
    ApplyOutcome::Applied
}

fn apply_mark_failed(snapshot: &mut PersistedSnapshot, id: &ItemId) -> ApplyOutcome {
    match snapshot.find_item_mut(id) {
        Some(item) if item.status.is_queued() => {
            item.status = ItemStatus::Failed;
            ApplyOutcome::Applied
        }
        _ => ApplyOutcome::AlreadyApplied,
    }
}
