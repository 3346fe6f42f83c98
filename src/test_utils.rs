//! Shared test utilities and arbitrary generators for property-based testing.

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

use crate::persistence::snapshot::{PersistedSnapshot, SCHEMA_VERSION};
use crate::state::limiter::RateLimiterState;
use crate::types::{Candidate, ExternalPostId, Item, ItemId, ItemStatus, PostedRecord};

/// Fixed reference instant so generated timestamps are reproducible.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
}

/// A queued item rooted at `https://example.com/<path>` with a 48h TTL.
pub fn sample_item(path: &str, score: i64, now: DateTime<Utc>) -> Item {
    Item::new(
        ItemId::parse(&format!("https://example.com/{path}")).unwrap(),
        format!("story {path}"),
        "Example Wire",
        score,
        now,
        Duration::hours(48),
    )
}

/// A posted record for `https://example.com/<path>`.
pub fn sample_posted_record(path: &str, now: DateTime<Utc>) -> PostedRecord {
    PostedRecord::new(
        ItemId::parse(&format!("https://example.com/{path}")).unwrap(),
        now,
        ExternalPostId::new(format!("ext-{path}")),
    )
}

/// A well-formed candidate rooted at `https://example.com/<path>`.
pub fn sample_candidate(path: &str, score: i64) -> Candidate {
    Candidate {
        source_id: Some(format!("feed-{path}")),
        title: format!("Hashrate and mining difficulty update {path}"),
        url: format!("https://example.com/{path}"),
        source: "Example Wire".to_string(),
        body: "Mining difficulty adjusted upward as hashrate climbed. ".repeat(8),
        score,
        published_at: Some(base_time()),
    }
}

pub fn arb_item_id() -> impl Strategy<Value = ItemId> {
    "[a-z0-9-]{1,24}"
        .prop_map(|path| ItemId::parse(&format!("https://example.com/{path}")).unwrap())
}

pub fn arb_status() -> impl Strategy<Value = ItemStatus> {
    prop_oneof![
        Just(ItemStatus::Queued),
        Just(ItemStatus::Posted),
        Just(ItemStatus::Expired),
        Just(ItemStatus::Failed),
    ]
}

pub fn arb_item() -> impl Strategy<Value = Item> {
    (
        arb_item_id(),
        "[a-zA-Z0-9 ]{1,60}",
        "[a-zA-Z ]{1,20}",
        0i64..1000,
        0i64..72,
        0u32..4,
        arb_status(),
    )
        .prop_map(|(id, title, source, score, age_hours, attempts, status)| {
            let enqueued_at = base_time() - Duration::hours(age_hours);
            let mut item = Item::new(id, title, source, score, enqueued_at, Duration::hours(48));
            item.attempts = attempts;
            item.status = status;
            item
        })
}

pub fn arb_posted_record() -> impl Strategy<Value = PostedRecord> {
    (arb_item_id(), 0i64..720, "[0-9]{1,12}").prop_map(|(id, age_hours, external)| {
        PostedRecord::new(
            id,
            base_time() - Duration::hours(age_hours),
            ExternalPostId::new(external),
        )
    })
}

pub fn arb_limiter_state() -> impl Strategy<Value = RateLimiterState> {
    (
        prop::collection::vec(0i64..48 * 60, 0..20),
        1u32..100,
        0u32..3600,
    )
        .prop_map(|(ages_mins, daily_target, min_interval_secs)| {
            let mut state = RateLimiterState::new(daily_target, min_interval_secs);
            for age in ages_mins {
                state.record(base_time() - Duration::minutes(age));
            }
            state
        })
}

/// A snapshot with a dedup-consistent queue: ids are unique across the queue
/// and the posted history, as the admission path guarantees.
pub fn arb_snapshot() -> impl Strategy<Value = PersistedSnapshot> {
    (
        any::<u32>().prop_map(u64::from),
        prop::collection::vec(arb_item(), 0..12),
        prop::collection::vec(arb_posted_record(), 0..8),
        arb_limiter_state(),
    )
        .prop_map(|(revision, items, records, rate_limiter)| {
            let mut snapshot = PersistedSnapshot {
                schema_version: SCHEMA_VERSION,
                snapshot_at: base_time(),
                revision,
                queue: Vec::new(),
                posted_history: Vec::new(),
                rate_limiter,
            };
            for record in records {
                if !snapshot.contains_id(&record.id) {
                    snapshot.posted_history.push(record);
                }
            }
            for item in items {
                if !snapshot.contains_id(&item.id) {
                    snapshot.queue.push(item);
                }
            }
            snapshot
        })
}
