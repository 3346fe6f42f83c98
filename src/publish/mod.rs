//! The publishing boundary: the platform trait, media lookup, and error
//! categorization.
//!
//! Publish failures split into two kinds. `Retryable` failures leave the
//! item queued; the item-level attempt counter (persisted in the snapshot)
//! decides when to give up across ticks. `Permanent` failures fail the item
//! immediately. Transport-level retry with backoff also lives here for
//! adapters that want to absorb short blips within a single attempt.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{DraftPost, ExternalPostId, MediaRef};

/// Whether a publish failure is worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishErrorKind {
    /// Timeout, network failure, rate limit, or server error.
    Retryable,

    /// The platform rejected the post; retrying the same post cannot help.
    Permanent,
}

/// Error from a publish attempt.
#[derive(Debug, Error)]
#[error("publish failed ({status}): {message}", status = self.status_label())]
pub struct PublishError {
    pub kind: PublishErrorKind,
    pub status_code: Option<u16>,
    pub message: String,
}

impl PublishError {
    pub fn retryable(message: impl Into<String>) -> Self {
        PublishError {
            kind: PublishErrorKind::Retryable,
            status_code: None,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        PublishError {
            kind: PublishErrorKind::Permanent,
            status_code: None,
            message: message.into(),
        }
    }

    /// Categorizes a non-success HTTP status.
    ///
    /// Rate limits (429) and server errors (5xx) are retryable; every other
    /// client error means the post itself was rejected.
    pub fn from_status(status_code: u16, message: impl Into<String>) -> Self {
        let kind = if status_code == 429 || status_code >= 500 {
            PublishErrorKind::Retryable
        } else {
            PublishErrorKind::Permanent
        };
        PublishError {
            kind,
            status_code: Some(status_code),
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == PublishErrorKind::Retryable
    }

    fn status_label(&self) -> String {
        match self.status_code {
            Some(code) => code.to_string(),
            None => "transport".to_string(),
        }
    }
}

/// Acknowledgement of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    /// Identifier assigned by the platform.
    pub external_post_id: ExternalPostId,
}

/// Boundary to the publishing platform.
#[async_trait]
pub trait SocialPublisher: Send + Sync {
    /// Publishes one post. Exactly one network publish per call.
    async fn publish(&self, post: &DraftPost) -> Result<PublishReceipt, PublishError>;
}

/// Error from the media provider. Always non-fatal: composition degrades to
/// a text-only post.
#[derive(Debug, Error)]
#[error("media lookup failed: {0}")]
pub struct MediaError(pub String);

/// Boundary to the image provider.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Finds up to `count` images for a search query.
    async fn find_media(&self, query: &str, count: usize) -> Result<Vec<MediaRef>, MediaError>;
}

/// Configuration for transport-level exponential backoff inside an adapter.
#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    /// Retries after the initial attempt.
    pub max_retries: u32,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Cap on the exponential growth.
    pub max_delay: Duration,

    /// Growth factor between retries.
    pub multiplier: f64,
}

impl BackoffConfig {
    /// 2 retries at 2s, 4s. Kept short: the item-level attempt counter is
    /// the real retry budget.
    pub const DEFAULT: Self = Self {
        max_retries: 2,
        initial_delay: Duration::from_secs(2),
        max_delay: Duration::from_secs(8),
        multiplier: 2.0,
    };

    /// Delay for the given retry (0-indexed), capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let grown = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        Duration::from_secs_f64(grown.min(self.max_delay.as_secs_f64()))
    }

    /// All retry delays in order.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_retries).map(|attempt| self.delay_for_attempt(attempt))
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Runs an operation, retrying errors the predicate accepts with backoff.
///
/// Errors the predicate declines return immediately. The final error is
/// returned once retries are exhausted.
pub async fn retry_with_backoff<T, E, F, Fut, P>(
    config: BackoffConfig,
    mut is_retryable: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: FnMut(&E) -> bool,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if is_retryable(&e) && attempt < config.max_retries => {
                tokio::time::sleep(config.delay_for_attempt(attempt)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
