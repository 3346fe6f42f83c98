//! Queue discipline: deterministic ordering, the TTL sweep, and the cap.
//!
//! The live queue is the set of `Queued` items inside the snapshot. Ordering
//! is never stored; it is a total order recomputed from item fields, so two
//! writers that interleave admissions converge on the same order from the
//! same set.
//!
//! # Ordering
//!
//! Descending score, ties broken by earliest `enqueued_at`, final tie broken
//! by id. The id tiebreak makes the order total, which eviction and tests
//! rely on.

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::types::{Item, ItemId, ItemStatus};

/// The total priority order over items. `Ordering::Less` means "publishes
/// first".
pub fn priority_order(a: &Item, b: &Item) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| a.enqueued_at.cmp(&b.enqueued_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Returns the highest-priority `Queued` item, if any.
///
/// Callers wanting `Peek` semantics run [`sweep_expired`] first so expired
/// items cannot win.
pub fn next_queued(items: &[Item]) -> Option<&Item> {
    items
        .iter()
        .filter(|item| item.status.is_queued())
        .min_by(|a, b| priority_order(a, b))
}

/// Moves every `Queued` item whose TTL has elapsed to `Expired`.
///
/// Returns how many items were expired. Physical removal happens at prune
/// time; a swept item merely leaves live consideration.
pub fn sweep_expired(items: &mut [Item], now: DateTime<Utc>) -> usize {
    let mut swept = 0;
    for item in items.iter_mut() {
        if item.status.is_queued() && item.is_expired(now) {
            item.status = ItemStatus::Expired;
            swept += 1;
        }
    }
    swept
}

/// Enforces the queue cap by dropping the lowest-priority `Queued` items.
///
/// Returns the evicted ids. Evicted items are removed outright (they were
/// never published, so no history entry is owed). Idempotent: a queue at or
/// under the cap is untouched.
pub fn evict_over_cap(items: &mut Vec<Item>, cap: usize) -> Vec<ItemId> {
    let mut queued: Vec<&Item> = items.iter().filter(|i| i.status.is_queued()).collect();
    if queued.len() <= cap {
        return Vec::new();
    }

    queued.sort_by(|a, b| priority_order(a, b));
    let evicted: Vec<ItemId> = queued[cap..].iter().map(|i| i.id.clone()).collect();
    let evicted_set: HashSet<&ItemId> = evicted.iter().collect();
    items.retain(|item| !evicted_set.contains(&item.id));

    evicted
}

/// All `Queued` items in publish order, for inspection surfaces.
pub fn ordered_queue(items: &[Item]) -> Vec<&Item> {
    let mut queued: Vec<&Item> = items.iter().filter(|i| i.status.is_queued()).collect();
    queued.sort_by(|a, b| priority_order(a, b));
    queued
}
