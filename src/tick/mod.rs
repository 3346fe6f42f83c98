//! Tick orchestration: one collect pass, one publish pass, one commit each.
//!
//! A tick is the unit of forward progress. It loads the latest snapshot,
//! makes its decisions against that frozen view, talks to the outside world
//! at most once per boundary, and commits the resulting ops. Boundary
//! failures never poison the state: a feed error skips admission, a compose
//! or publish failure leaves the item queued (or fails it), and a commit
//! that exhausts its conflict budget abandons the tick's write entirely.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::collect::{CollectReport, FeedError, FilterConfig, NewsFeed, admit_candidates};
use crate::compose::{TextComposer, compose_draft};
use crate::persistence::pruning::PruneConfig;
use crate::persistence::store::{CommitContext, CommitOutcome, SnapshotStore, StoreError};
use crate::publish::{MediaSource, SocialPublisher};
use crate::state::limiter::{DenyReason, LimiterDecision};
use crate::state::queue::{next_queued, sweep_expired};
use crate::state::transitions::StateOp;
use crate::types::{ExternalPostId, Item, ItemId};

/// Tick-level failures. Boundary errors are absorbed into the report; only
/// the store can fail a tick outright.
#[derive(Debug, Error)]
pub enum TickError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for tick operations.
pub type Result<T> = std::result::Result<T, TickError>;

/// Behavioral knobs for the pipeline, assembled from configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Queue TTL applied to admitted items.
    pub ttl_hours: u32,

    /// How far back a collect pass asks the feed to look.
    pub lookback_hours: u32,

    /// Publish attempts per item before it fails terminally.
    pub max_attempts: u32,

    /// Limiter targets, pushed into the snapshot on every commit.
    pub daily_target: u32,
    pub min_interval_secs: u32,

    /// Images requested per post; zero disables media lookup.
    pub images_per_post: usize,

    pub filter: FilterConfig,
    pub prune: PruneConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            ttl_hours: 48,
            lookback_hours: 1,
            max_attempts: 3,
            daily_target: 60,
            min_interval_secs: 1440,
            images_per_post: 1,
            filter: FilterConfig::default(),
            prune: PruneConfig::default(),
        }
    }
}

/// What the publish half of a tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// One item was published and recorded.
    Published {
        id: ItemId,
        external_post_id: ExternalPostId,
        attempt: u32,
    },

    /// The limiter denied this tick.
    RateLimited { reason: DenyReason },

    /// Nothing queued (after the expiry sweep).
    QueueEmpty,

    /// Text generation failed; the item stays queued with no attempt spent.
    ComposeFailed { id: ItemId },

    /// The publish attempt failed. `terminal` means the item moved to
    /// `Failed` (permanent rejection or attempts exhausted).
    AttemptFailed {
        id: ItemId,
        attempt: u32,
        retryable: bool,
        terminal: bool,
    },
}

/// Summary of one tick.
#[derive(Debug, Clone)]
pub struct TickReport {
    /// Admission summary; `None` when the feed failed or the pass was
    /// publish-only.
    pub collect: Option<CollectReport>,

    /// Publish summary; `None` for a collect-only pass.
    pub publish: Option<PublishOutcome>,

    /// Revision the tick's state landed at; `None` if the commit was
    /// abandoned after exhausting its conflict budget.
    pub revision: Option<u64>,
}

/// The assembled bot: one store, four boundaries, one config.
pub struct Pipeline {
    store: SnapshotStore,
    feed: Arc<dyn NewsFeed>,
    composer: Arc<dyn TextComposer>,
    media: Option<Arc<dyn MediaSource>>,
    publisher: Arc<dyn SocialPublisher>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        store: SnapshotStore,
        feed: Arc<dyn NewsFeed>,
        composer: Arc<dyn TextComposer>,
        media: Option<Arc<dyn MediaSource>>,
        publisher: Arc<dyn SocialPublisher>,
        config: PipelineConfig,
    ) -> Self {
        Pipeline {
            store,
            feed,
            composer,
            media,
            publisher,
            config,
        }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    fn commit_ctx<'a>(&'a self, now: DateTime<Utc>) -> CommitContext<'a> {
        CommitContext {
            now,
            prune: &self.config.prune,
            daily_target: self.config.daily_target,
            min_interval_secs: self.config.min_interval_secs,
        }
    }

    /// Commits the tick's ops, absorbing conflict exhaustion into `None`.
    fn commit_ops(
        &self,
        base: crate::persistence::snapshot::PersistedSnapshot,
        ops: &[StateOp],
        now: DateTime<Utc>,
    ) -> Result<Option<u64>> {
        match self.store.commit(base, ops, &self.commit_ctx(now)) {
            Ok(outcome) => {
                if let CommitOutcome::Committed { revision, conflicts } = &outcome
                    && *conflicts > 0
                {
                    debug!(revision, conflicts, "commit succeeded after replay");
                }
                Ok(Some(outcome.revision()))
            }
            Err(StoreError::ConflictExhausted { attempts }) => {
                warn!(attempts, "abandoning tick after exhausting commit conflicts");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fetches, filters, and admits candidates, then commits.
    #[instrument(skip(self), fields(now = %now))]
    pub async fn collect_tick(&self, now: DateTime<Utc>) -> Result<TickReport> {
        let base = self.store.load_latest()?;

        let since = now - Duration::hours(i64::from(self.config.lookback_hours));
        let collect = match self.feed.fetch_candidates(since).await {
            Ok(candidates) => {
                let (ops, report) = admit_candidates(
                    &base,
                    candidates,
                    &self.config.filter,
                    Duration::hours(i64::from(self.config.ttl_hours)),
                    now,
                );
                let revision = self.commit_ops(base, &ops, now)?;
                info!(
                    fetched = report.fetched,
                    admitted = report.admitted,
                    duplicates = report.duplicates,
                    invalid = report.invalid,
                    rejected = report.rejected.total(),
                    "collect pass complete"
                );
                return Ok(TickReport {
                    collect: Some(report),
                    publish: None,
                    revision,
                });
            }
            Err(e @ FeedError::Request(_)) | Err(e @ FeedError::Malformed(_)) => {
                warn!(error = %e, "feed unavailable; skipping admission this tick");
                None
            }
        };

        // The sweep and prune still deserve their commit even with no feed.
        let revision = self.commit_ops(base, &[], now)?;
        Ok(TickReport {
            collect,
            publish: None,
            revision,
        })
    }

    /// Publishes at most one item, then commits.
    #[instrument(skip(self), fields(now = %now))]
    pub async fn post_tick(&self, now: DateTime<Utc>) -> Result<TickReport> {
        let base = self.store.load_latest()?;

        // Decisions run against a scratch view with the sweep and the
        // configured targets applied; the commit re-derives both.
        let mut view = base.clone();
        sweep_expired(&mut view.queue, now);
        view.rate_limiter
            .apply_targets(self.config.daily_target, self.config.min_interval_secs);

        if let LimiterDecision::Deny(reason) = view.rate_limiter.decide(now) {
            debug!(%reason, "publish denied by rate limiter");
            let revision = self.commit_ops(base, &[], now)?;
            return Ok(TickReport {
                collect: None,
                publish: Some(PublishOutcome::RateLimited { reason }),
                revision,
            });
        }

        let Some(item) = next_queued(&view.queue).cloned() else {
            let revision = self.commit_ops(base, &[], now)?;
            return Ok(TickReport {
                collect: None,
                publish: Some(PublishOutcome::QueueEmpty),
                revision,
            });
        };

        let mut draft = match compose_draft(self.composer.as_ref(), &item).await {
            Ok(draft) => draft,
            Err(e) => {
                warn!(id = %item.id, error = %e, "composition failed; item stays queued");
                let revision = self.commit_ops(base, &[], now)?;
                return Ok(TickReport {
                    collect: None,
                    publish: Some(PublishOutcome::ComposeFailed { id: item.id }),
                    revision,
                });
            }
        };

        if let Some(media) = &self.media
            && self.config.images_per_post > 0
        {
            match media.find_media(&item.title, self.config.images_per_post).await {
                Ok(found) => draft.media = found,
                Err(e) => {
                    warn!(id = %item.id, error = %e, "media lookup failed; posting text-only");
                }
            }
        }

        let attempt = item.attempts + 1;
        let (ops, outcome) = match self.publisher.publish(&draft).await {
            Ok(receipt) => {
                info!(
                    id = %item.id,
                    external = %receipt.external_post_id,
                    attempt,
                    "published"
                );
                (
                    vec![
                        StateOp::RecordAttempt {
                            id: item.id.clone(),
                            attempt,
                        },
                        StateOp::MarkPosted {
                            id: item.id.clone(),
                            posted_at: now,
                            external_post_id: receipt.external_post_id.clone(),
                        },
                    ],
                    PublishOutcome::Published {
                        id: item.id.clone(),
                        external_post_id: receipt.external_post_id,
                        attempt,
                    },
                )
            }
            Err(e) => {
                let retryable = e.is_retryable();
                let terminal = !retryable || attempt >= self.config.max_attempts;
                warn!(
                    id = %item.id,
                    error = %e,
                    attempt,
                    terminal,
                    "publish attempt failed"
                );

                let mut ops = vec![StateOp::RecordAttempt {
                    id: item.id.clone(),
                    attempt,
                }];
                if terminal {
                    ops.push(StateOp::MarkFailed {
                        id: item.id.clone(),
                    });
                }
                (
                    ops,
                    PublishOutcome::AttemptFailed {
                        id: item.id.clone(),
                        attempt,
                        retryable,
                        terminal,
                    },
                )
            }
        };

        let published = matches!(outcome, PublishOutcome::Published { .. });
        let revision = self.commit_ops(base, &ops, now)?;
        if revision.is_none() && published {
            // The post went out but its record was abandoned; a later tick
            // may publish the item again. Loud because it breaks
            // at-most-once for this item.
            error!(id = %item.id, "publish succeeded but the commit was abandoned");
        }

        Ok(TickReport {
            collect: None,
            publish: Some(outcome),
            revision,
        })
    }

    /// A full tick: collect, then publish.
    pub async fn full_tick(&self, now: DateTime<Utc>) -> Result<TickReport> {
        let collected = self.collect_tick(now).await?;
        let posted = self.post_tick(now).await?;
        Ok(TickReport {
            collect: collected.collect,
            publish: posted.publish,
            revision: posted.revision.or(collected.revision),
        })
    }

    /// The next queued item, for inspection surfaces. Applies the expiry
    /// sweep to its view so an expired head is never reported.
    pub fn peek(&self, now: DateTime<Utc>) -> Result<Option<Item>> {
        let mut snapshot = self.store.load_latest()?;
        sweep_expired(&mut snapshot.queue, now);
        Ok(next_queued(&snapshot.queue).cloned())
    }
}
