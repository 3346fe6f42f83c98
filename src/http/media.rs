//! Image-search adapter for post media.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::build_client;
use crate::publish::{MediaError, MediaSource};
use crate::types::MediaRef;

/// Hard cap on attachments per post, regardless of configuration.
pub const MAX_IMAGES_PER_POST: usize = 4;

/// Config section for the media adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Photo search endpoint.
    pub api_url: String,

    /// Environment variable holding the access key.
    pub api_key_env: String,

    /// Images requested per post, capped at [`MAX_IMAGES_PER_POST`].
    pub images_per_post: usize,

    /// Preferred orientation passed to the search.
    pub orientation: String,

    /// Per-request timeout.
    pub request_timeout_secs: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        MediaConfig {
            api_url: "https://api.unsplash.com/search/photos".to_string(),
            api_key_env: "NEWSDESK_MEDIA_API_KEY".to_string(),
            images_per_post: 1,
            orientation: "landscape".to_string(),
            request_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<PhotoDto>,
}

#[derive(Debug, Deserialize)]
struct PhotoDto {
    urls: PhotoUrls,
    #[serde(default)]
    alt_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PhotoUrls {
    regular: String,
}

impl PhotoDto {
    fn into_media_ref(self) -> MediaRef {
        MediaRef {
            url: self.urls.regular,
            alt_text: self.alt_description,
        }
    }
}

/// [`MediaSource`] over a photo-search HTTP API.
pub struct ImageSearchMediaSource {
    config: MediaConfig,
    access_key: String,
    client: reqwest::Client,
}

impl ImageSearchMediaSource {
    pub fn new(config: MediaConfig, access_key: String) -> Result<Self, MediaError> {
        let client = build_client(config.request_timeout_secs)
            .map_err(|e| MediaError(e.to_string()))?;
        Ok(ImageSearchMediaSource {
            config,
            access_key,
            client,
        })
    }
}

#[async_trait]
impl MediaSource for ImageSearchMediaSource {
    async fn find_media(&self, query: &str, count: usize) -> Result<Vec<MediaRef>, MediaError> {
        let count = count.min(MAX_IMAGES_PER_POST);
        if count == 0 {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .get(&self.config.api_url)
            .header(
                "Authorization",
                format!("Client-ID {}", self.access_key),
            )
            .query(&[
                ("query", query),
                ("per_page", &count.to_string()),
                ("orientation", &self.config.orientation),
            ])
            .send()
            .await
            .map_err(|e| MediaError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MediaError(format!("media search returned status {status}")));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| MediaError(e.to_string()))?;

        let media: Vec<MediaRef> = parsed
            .results
            .into_iter()
            .take(count)
            .map(PhotoDto::into_media_ref)
            .collect();
        debug!(count = media.len(), "found media");
        Ok(media)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_response_maps_to_media_refs() {
        let json = r#"{
            "results": [
                {
                    "urls": { "regular": "https://images.example.com/a.jpg" },
                    "alt_description": "rows of mining rigs"
                },
                {
                    "urls": { "regular": "https://images.example.com/b.jpg" }
                }
            ]
        }"#;

        let parsed: SearchResponse = serde_json::from_str(json).unwrap();
        let media: Vec<MediaRef> = parsed
            .results
            .into_iter()
            .map(PhotoDto::into_media_ref)
            .collect();

        assert_eq!(media.len(), 2);
        assert_eq!(media[0].url, "https://images.example.com/a.jpg");
        assert_eq!(media[0].alt_text.as_deref(), Some("rows of mining rigs"));
        assert!(media[1].alt_text.is_none());
    }

    #[test]
    fn empty_results_parse() {
        let parsed: SearchResponse = serde_json::from_str(r#"{ "results": [] }"#).unwrap();
        assert!(parsed.results.is_empty());
    }

    #[test]
    fn default_config_caps_at_the_attachment_limit() {
        let config = MediaConfig::default();
        assert!(config.images_per_post <= MAX_IMAGES_PER_POST);
        assert_eq!(config.orientation, "landscape");
    }
}
