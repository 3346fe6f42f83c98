//! OpenAI-compatible chat-completions adapter for text generation.
//!
//! Generation has no side effects, so transport failures are retried with
//! backoff inside the adapter before the tick gives up on composing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::build_client;
use crate::compose::{ComposeError, TextComposer};
use crate::publish::{BackoffConfig, retry_with_backoff};
use crate::types::Item;

const DEFAULT_PROMPT_TEMPLATE: &str = "Write one engaging social post of at most {max_length} \
characters about this article. Title: {title}. Outlet: {source}. \
Plain text only; no URL, no hashtags, no quotes around the post.";

/// Config section for the composer adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    /// Chat-completions endpoint.
    pub api_url: String,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Model name passed through to the service.
    pub model: String,

    /// Prompt with `{title}`, `{source}`, and `{max_length}` placeholders.
    pub prompt_template: String,

    /// Per-request timeout.
    pub request_timeout_secs: u64,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        ComposerConfig {
            api_url: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key_env: "NEWSDESK_COMPOSER_API_KEY".to_string(),
            model: "gpt-4o-mini".to_string(),
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// [`TextComposer`] over an OpenAI-compatible chat API.
pub struct LlmComposer {
    config: ComposerConfig,
    api_key: String,
    client: reqwest::Client,
    backoff: BackoffConfig,
}

impl LlmComposer {
    pub fn new(config: ComposerConfig, api_key: String) -> Result<Self, ComposeError> {
        let client = build_client(config.request_timeout_secs)
            .map_err(|e| ComposeError::Request(e.to_string()))?;
        Ok(LlmComposer {
            config,
            api_key,
            client,
            backoff: BackoffConfig::DEFAULT,
        })
    }

    fn render_prompt(&self, item: &Item, budget: usize) -> String {
        self.config
            .prompt_template
            .replace("{title}", &item.title)
            .replace("{source}", &item.source)
            .replace("{max_length}", &budget.to_string())
    }

    async fn request_completion(&self, prompt: &str) -> Result<String, ComposeError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ComposeError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ComposeError::Request(format!(
                "composer returned status {status}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ComposeError::Malformed(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| clean_generated_text(&choice.message.content))
            .ok_or_else(|| ComposeError::Malformed("no choices in response".to_string()))
    }
}

/// Strips whitespace and one layer of surrounding quotes, which chat models
/// add despite instructions.
fn clean_generated_text(raw: &str) -> String {
    let trimmed = raw.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed);
    unquoted.trim().to_string()
}

#[async_trait]
impl TextComposer for LlmComposer {
    async fn generate_text(&self, item: &Item, budget: usize) -> Result<String, ComposeError> {
        let prompt = self.render_prompt(item, budget);
        debug!(id = %item.id, "requesting composition");
        retry_with_backoff(
            self.backoff,
            |e| matches!(e, ComposeError::Request(_)),
            || self.request_completion(&prompt),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_item;
    use chrono::Utc;

    #[test]
    fn response_parses_the_first_choice() {
        let json = r#"{
            "choices": [
                { "message": { "role": "assistant", "content": "Hashrate keeps climbing." } }
            ]
        }"#;

        let parsed: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(
            parsed.choices[0].message.content,
            "Hashrate keeps climbing."
        );
    }

    #[test]
    fn prompt_fills_every_placeholder() {
        let composer = LlmComposer::new(ComposerConfig::default(), "key".to_string()).unwrap();
        let item = sample_item("story", 8, Utc::now());

        let prompt = composer.render_prompt(&item, 254);

        assert!(prompt.contains("story story"));
        assert!(prompt.contains("Example Wire"));
        assert!(prompt.contains("254"));
        assert!(!prompt.contains("{title}"));
        assert!(!prompt.contains("{max_length}"));
    }

    #[test]
    fn generated_text_is_cleaned() {
        assert_eq!(clean_generated_text("  plain  "), "plain");
        assert_eq!(clean_generated_text("\"quoted post\""), "quoted post");
        assert_eq!(clean_generated_text("\" padded \""), "padded");
        // A lone interior quote is left alone.
        assert_eq!(clean_generated_text("it's \"fine\" here"), "it's \"fine\" here");
    }

    #[test]
    fn request_serializes_a_single_user_message() {
        let request = ChatRequest {
            model: "gpt-4o-mini",
            messages: vec![ChatMessage {
                role: "user",
                content: "prompt",
            }],
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "gpt-4o-mini");
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["messages"][0]["content"], "prompt");
    }
}
