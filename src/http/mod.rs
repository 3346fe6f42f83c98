//! HTTP adapters for the external boundaries.
//!
//! Each adapter pairs a serde config section with an implementation of the
//! corresponding boundary trait. Secrets never live in the config file: each
//! section names an environment variable and the key is resolved at startup.

use std::time::Duration;

pub mod composer;
pub mod feed;
pub mod media;
pub mod publisher;

pub use composer::{ComposerConfig, LlmComposer};
pub use feed::{FeedConfig, HttpNewsFeed};
pub use media::{ImageSearchMediaSource, MediaConfig};
pub use publisher::{DryRunPublisher, PublisherConfig, StatusApiPublisher};

/// Builds a reqwest client with explicit timeouts. Every adapter goes
/// through here so no request can hang a tick indefinitely.
pub(crate) fn build_client(timeout_secs: u64) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .build()
}
