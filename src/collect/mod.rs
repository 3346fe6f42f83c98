//! The collect phase: fetch candidates, validate, filter, and admit.
//!
//! Fetching is behind the [`NewsFeed`] trait; everything after it is pure.
//! Admission never mutates a snapshot directly: it emits `Enqueue` ops for
//! the commit protocol, so a conflicting writer's admissions are never
//! clobbered.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::debug;

use crate::persistence::snapshot::PersistedSnapshot;
use crate::state::transitions::StateOp;
use crate::types::{Candidate, Item, ItemId};

pub mod filter;

pub use filter::{FilterConfig, FilterVerdict, RejectReason, evaluate};

/// Errors from the candidate source. All of them are transient as far as the
/// tick is concerned: admission is skipped and the next tick retries.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The request failed (network, timeout, non-success status).
    #[error("feed request failed: {0}")]
    Request(String),

    /// The response arrived but could not be interpreted.
    #[error("feed returned a malformed payload: {0}")]
    Malformed(String),
}

/// Boundary to the external candidate source.
#[async_trait]
pub trait NewsFeed: Send + Sync {
    /// Fetches candidates published since `since`.
    async fn fetch_candidates(&self, since: DateTime<Utc>) -> Result<Vec<Candidate>, FeedError>;
}

/// Per-reason reject counters for one collect pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RejectCounts {
    pub blacklisted_source: usize,
    pub blacklisted_keyword: usize,
    pub low_score: usize,
    pub short_body: usize,
    pub off_topic: usize,
}

impl RejectCounts {
    fn bump(&mut self, reason: RejectReason) {
        match reason {
            RejectReason::BlacklistedSource => self.blacklisted_source += 1,
            RejectReason::BlacklistedKeyword => self.blacklisted_keyword += 1,
            RejectReason::LowScore => self.low_score += 1,
            RejectReason::ShortBody => self.short_body += 1,
            RejectReason::OffTopic => self.off_topic += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.blacklisted_source
            + self.blacklisted_keyword
            + self.low_score
            + self.short_body
            + self.off_topic
    }
}

/// What one collect pass did with the fetched batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectReport {
    /// Candidates delivered by the feed.
    pub fetched: usize,

    /// Candidates turned into `Enqueue` ops.
    pub admitted: usize,

    /// Candidates whose dedup key was already known (snapshot or earlier in
    /// the same batch).
    pub duplicates: usize,

    /// Candidates whose URL failed canonicalization.
    pub invalid: usize,

    /// Candidates dropped by the admission filter, by reason.
    pub rejected: RejectCounts,
}

/// Turns a fetched batch into `Enqueue` ops against the given snapshot.
///
/// Dedup runs against the snapshot's queue and history plus the batch
/// itself, so a story syndicated twice in one fetch is admitted once. The
/// snapshot is read-only here; the definitive dedup check is `apply_op`
/// re-running against whatever snapshot the commit lands on.
pub fn admit_candidates(
    snapshot: &PersistedSnapshot,
    candidates: Vec<Candidate>,
    config: &FilterConfig,
    ttl: Duration,
    now: DateTime<Utc>,
) -> (Vec<StateOp>, CollectReport) {
    let mut report = CollectReport {
        fetched: candidates.len(),
        ..CollectReport::default()
    };
    let mut ops = Vec::new();
    let mut batch_ids: Vec<ItemId> = Vec::new();

    for candidate in candidates {
        let id = match ItemId::parse(&candidate.url) {
            Ok(id) => id,
            Err(e) => {
                debug!(url = %candidate.url, error = %e, "dropping candidate with invalid url");
                report.invalid += 1;
                continue;
            }
        };

        match evaluate(&candidate, config) {
            FilterVerdict::Pass => {}
            FilterVerdict::Reject(reason) => {
                debug!(id = %id, %reason, "rejecting candidate");
                report.rejected.bump(reason);
                continue;
            }
        }

        if snapshot.contains_id(&id) || batch_ids.contains(&id) {
            report.duplicates += 1;
            continue;
        }

        let item = Item::new(
            id.clone(),
            candidate.title,
            candidate.source,
            candidate.score,
            now,
            ttl,
        );
        batch_ids.push(id);
        report.admitted += 1;
        ops.push(StateOp::Enqueue { item });
    }

    (ops, report)
}
