//! Queue items and posted-history records.
//!
//! These are the rows of the two persisted collections: the live queue and
//! the posted history. An item's `id` is its canonical source URL, so the
//! link appended to a published post is `id.as_str()`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ExternalPostId, ItemId};

/// Lifecycle status of a queued item.
///
/// An item holds exactly one status at any settled point. `Queued` is the
/// only live status; the other three are terminal and are pruned from the
/// snapshot during commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Admitted and awaiting publication.
    Queued,

    /// Published; a matching [`PostedRecord`] exists.
    Posted,

    /// TTL elapsed before publication.
    Expired,

    /// Publication attempts exhausted or rejected permanently.
    Failed,
}

impl ItemStatus {
    /// Returns true if the item is still awaiting publication.
    pub fn is_queued(&self) -> bool {
        matches!(self, ItemStatus::Queued)
    }

    /// Returns true for statuses that end the item's lifecycle.
    pub fn is_terminal(&self) -> bool {
        !self.is_queued()
    }
}

/// An admitted content item awaiting publication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Canonical source URL; doubles as the dedup key.
    pub id: ItemId,

    /// Article headline, used for composition and relevance logging.
    pub title: String,

    /// Name of the originating outlet.
    pub source: String,

    /// Priority score (higher publishes first). Taken from the feed's
    /// social-engagement signal at admission time and never updated.
    pub score: i64,

    /// When the item was admitted to the queue.
    pub enqueued_at: DateTime<Utc>,

    /// When the item expires if still unpublished.
    pub expires_at: DateTime<Utc>,

    /// Number of publish attempts so far, successful attempt included.
    pub attempts: u32,

    /// Current lifecycle status.
    pub status: ItemStatus,
}

impl Item {
    /// Creates a freshly admitted item with status `Queued` and zero attempts.
    pub fn new(
        id: ItemId,
        title: impl Into<String>,
        source: impl Into<String>,
        score: i64,
        enqueued_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Item {
            id,
            title: title.into(),
            source: source.into(),
            score,
            enqueued_at,
            expires_at: enqueued_at + ttl,
            attempts: 0,
            status: ItemStatus::Queued,
        }
    }

    /// The canonical article URL.
    pub fn url(&self) -> &str {
        self.id.as_str()
    }

    /// Returns true once the TTL has elapsed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Append-only record of a successful publication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostedRecord {
    /// The published item's id (canonical URL).
    pub id: ItemId,

    /// When the publish succeeded.
    pub posted_at: DateTime<Utc>,

    /// Identifier assigned by the publishing platform.
    pub external_post_id: ExternalPostId,
}

impl PostedRecord {
    pub fn new(id: ItemId, posted_at: DateTime<Utc>, external_post_id: ExternalPostId) -> Self {
        PostedRecord {
            id,
            posted_at,
            external_post_id,
        }
    }
}
