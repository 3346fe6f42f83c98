//! News-API adapter for the candidate feed.
//!
//! Speaks the article-search dialect used by Event Registry style services:
//! a POST with the query and date range, answered by a nested envelope of
//! article results carrying a social-engagement score.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::build_client;
use crate::collect::{FeedError, NewsFeed};
use crate::types::Candidate;

/// Config section for the feed adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Article search endpoint.
    pub api_url: String,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Keyword query for the search.
    pub query: String,

    /// Maximum articles per fetch.
    pub max_articles: usize,

    /// Per-request timeout.
    pub request_timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        FeedConfig {
            api_url: "https://eventregistry.org/api/v1/article/getArticles".to_string(),
            api_key_env: "NEWSDESK_FEED_API_KEY".to_string(),
            query: "bitcoin mining".to_string(),
            max_articles: 50,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Serialize)]
struct ArticleRequest<'a> {
    action: &'static str,
    keyword: &'a str,
    #[serde(rename = "articlesSortBy")]
    sort_by: &'static str,
    #[serde(rename = "articlesCount")]
    count: usize,
    #[serde(rename = "dateStart")]
    date_start: String,
    #[serde(rename = "apiKey")]
    api_key: &'a str,
}

#[derive(Debug, Deserialize)]
struct ArticleEnvelope {
    articles: ArticleResults,
}

#[derive(Debug, Deserialize)]
struct ArticleResults {
    #[serde(default)]
    results: Vec<ArticleDto>,
}

#[derive(Debug, Deserialize)]
struct ArticleDto {
    #[serde(default)]
    uri: Option<String>,
    title: String,
    url: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    source: Option<SourceDto>,
    #[serde(default, rename = "socialScore")]
    social_score: Option<i64>,
    #[serde(default, rename = "dateTimePub")]
    published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct SourceDto {
    #[serde(default)]
    title: Option<String>,
}

impl ArticleDto {
    fn into_candidate(self) -> Candidate {
        Candidate {
            source_id: self.uri,
            title: self.title,
            url: self.url,
            source: self
                .source
                .and_then(|s| s.title)
                .unwrap_or_else(|| "unknown".to_string()),
            body: self.body,
            score: self.social_score.unwrap_or(0),
            published_at: self.published_at,
        }
    }
}

/// [`NewsFeed`] over an article-search HTTP API.
pub struct HttpNewsFeed {
    config: FeedConfig,
    api_key: String,
    client: reqwest::Client,
}

impl HttpNewsFeed {
    pub fn new(config: FeedConfig, api_key: String) -> Result<Self, FeedError> {
        let client = build_client(config.request_timeout_secs)
            .map_err(|e| FeedError::Request(e.to_string()))?;
        Ok(HttpNewsFeed {
            config,
            api_key,
            client,
        })
    }
}

#[async_trait]
impl NewsFeed for HttpNewsFeed {
    async fn fetch_candidates(&self, since: DateTime<Utc>) -> Result<Vec<Candidate>, FeedError> {
        let request = ArticleRequest {
            action: "getArticles",
            keyword: &self.config.query,
            sort_by: "socialScore",
            count: self.config.max_articles,
            date_start: since.format("%Y-%m-%d").to_string(),
            api_key: &self.api_key,
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| FeedError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Request(format!(
                "feed returned status {status}"
            )));
        }

        let envelope: ArticleEnvelope = response
            .json()
            .await
            .map_err(|e| FeedError::Malformed(e.to_string()))?;

        let candidates: Vec<Candidate> = envelope
            .articles
            .results
            .into_iter()
            .map(ArticleDto::into_candidate)
            .collect();
        debug!(count = candidates.len(), "fetched candidates");
        Ok(candidates)
    }
}
