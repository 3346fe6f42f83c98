//! Status-API publisher and the dry-run stand-in.
//!
//! The publisher is deliberately conservative about retrying: an HTTP error
//! response proves the platform did not accept the post, so 429/5xx are
//! retried with backoff, but a transport failure (timeout, reset) may have
//! landed the post and is surfaced to the tick instead. The item-level
//! attempt counter governs retries across ticks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::build_client;
use crate::publish::{BackoffConfig, PublishError, PublishReceipt, SocialPublisher};
use crate::types::{DraftPost, ExternalPostId};

/// Config section for the publisher adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    /// Status creation endpoint.
    pub api_url: String,

    /// Environment variable holding the bearer token.
    pub token_env: String,

    /// Per-request timeout.
    pub request_timeout_secs: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        PublisherConfig {
            api_url: "https://api.twitter.com/2/tweets".to_string(),
            token_env: "NEWSDESK_PUBLISHER_TOKEN".to_string(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Serialize)]
struct StatusRequest<'a> {
    text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    media_urls: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    data: StatusData,
}

#[derive(Debug, Deserialize)]
struct StatusData {
    id: String,
}

/// [`SocialPublisher`] over a status-creation HTTP API.
pub struct StatusApiPublisher {
    config: PublisherConfig,
    token: String,
    client: reqwest::Client,
    backoff: BackoffConfig,
}

impl StatusApiPublisher {
    pub fn new(config: PublisherConfig, token: String) -> Result<Self, PublishError> {
        let client = build_client(config.request_timeout_secs)
            .map_err(|e| PublishError::retryable(e.to_string()))?;
        Ok(StatusApiPublisher {
            config,
            token,
            client,
            backoff: BackoffConfig::DEFAULT,
        })
    }

    async fn attempt(&self, post: &DraftPost) -> Result<PublishReceipt, PublishError> {
        let request = StatusRequest {
            text: post.full_text(),
            media_urls: post.media.iter().map(|m| m.url.as_str()).collect(),
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await
            .map_err(|e| PublishError::retryable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::from_status(status.as_u16(), body));
        }

        let parsed: StatusResponse = response
            .json()
            .await
            .map_err(|e| PublishError::permanent(format!("unparseable response: {e}")))?;

        Ok(PublishReceipt {
            external_post_id: ExternalPostId::new(parsed.data.id),
        })
    }
}

#[async_trait]
impl SocialPublisher for StatusApiPublisher {
    async fn publish(&self, post: &DraftPost) -> Result<PublishReceipt, PublishError> {
        let mut attempt = 0;
        loop {
            match self.attempt(post).await {
                // A rejected-by-status error proves nothing was posted, so
                // an in-call retry cannot double-post. Transport errors get
                // no such proof and are returned as-is.
                Err(e)
                    if e.status_code.is_some()
                        && e.is_retryable()
                        && attempt < self.backoff.max_retries =>
                {
                    debug!(error = %e, attempt, "publish rejected; backing off");
                    tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

/// Publisher that logs instead of posting. Used by `--dry-run` and the
/// pipeline tests; external ids are synthesized from a counter.
#[derive(Debug, Default)]
pub struct DryRunPublisher {
    counter: AtomicU64,
    /// Artificial latency, for exercising timeout handling in tests.
    pub delay: Option<Duration>,
}

impl DryRunPublisher {
    pub fn new() -> Self {
        DryRunPublisher::default()
    }
}

#[async_trait]
impl SocialPublisher for DryRunPublisher {
    async fn publish(&self, post: &DraftPost) -> Result<PublishReceipt, PublishError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let seq = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            text = %post.full_text(),
            media = post.media.len(),
            "dry-run publish"
        );
        Ok(PublishReceipt {
            external_post_id: ExternalPostId::new(format!("dry-run-{seq}")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MediaRef;

    fn draft() -> DraftPost {
        DraftPost {
            text: "Hashrate hits a new high".to_string(),
            url: "https://example.com/story".to_string(),
            media: vec![MediaRef {
                url: "https://images.example.com/a.jpg".to_string(),
                alt_text: None,
            }],
        }
    }

    #[test]
    fn status_request_carries_full_text_and_media() {
        let post = draft();
        let request = StatusRequest {
            text: post.full_text(),
            media_urls: post.media.iter().map(|m| m.url.as_str()).collect(),
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value["text"],
            "Hashrate hits a new high\nhttps://example.com/story"
        );
        assert_eq!(value["media_urls"][0], "https://images.example.com/a.jpg");
    }

    #[test]
    fn text_only_request_omits_the_media_field() {
        let request = StatusRequest {
            text: "text".to_string(),
            media_urls: Vec::new(),
        };

        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("media_urls").is_none());
    }

    #[test]
    fn status_response_parses_the_external_id() {
        let parsed: StatusResponse =
            serde_json::from_str(r#"{ "data": { "id": "1859012345678901248" } }"#).unwrap();
        assert_eq!(parsed.data.id, "1859012345678901248");
    }

    #[tokio::test]
    async fn dry_run_issues_sequential_ids() {
        let publisher = DryRunPublisher::new();

        let first = publisher.publish(&draft()).await.unwrap();
        let second = publisher.publish(&draft()).await.unwrap();

        assert_eq!(first.external_post_id.as_str(), "dry-run-1");
        assert_eq!(second.external_post_id.as_str(), "dry-run-2");
    }
}
