//! Post composition: text generation behind a trait, budget fitting in pure
//! code.
//!
//! The platform limit is 280 characters. The canonical URL goes on its own
//! line after the text and is budgeted at a fixed 25 characters, the
//! platform's link-shortener width, regardless of its literal length. What
//! remains after the URL and the separating newline is the text budget.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{DraftPost, Item, MediaRef};

/// Platform character limit for one post.
pub const PLATFORM_LIMIT: usize = 280;

/// Characters reserved for the URL line (link-shortener width).
pub const URL_RESERVE: usize = 25;

/// Characters available to the generated text.
pub const fn text_budget() -> usize {
    // One more for the newline separating text from URL.
    PLATFORM_LIMIT - URL_RESERVE - 1
}

/// Errors from the text-generation boundary.
#[derive(Debug, Error)]
pub enum ComposeError {
    /// The request failed (network, timeout, non-success status).
    #[error("composer request failed: {0}")]
    Request(String),

    /// The response arrived but held no usable text.
    #[error("composer returned an unusable response: {0}")]
    Malformed(String),
}

/// Boundary to the text generator.
#[async_trait]
pub trait TextComposer: Send + Sync {
    /// Generates post text for an item, aiming at `budget` characters.
    ///
    /// The result is advisory: composition re-fits it to the budget, so a
    /// generator that overshoots still produces a valid post.
    async fn generate_text(&self, item: &Item, budget: usize) -> Result<String, ComposeError>;
}

/// Fits text into `budget` characters, truncating at a word boundary with a
/// trailing ellipsis. Counts characters, not bytes.
pub fn fit_to_budget(text: &str, budget: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= budget {
        return text.to_string();
    }
    if budget == 0 {
        return String::new();
    }

    // Leave room for the ellipsis, then back up to the last word boundary.
    let hard: String = text.chars().take(budget - 1).collect();
    let cut = match hard.rfind(char::is_whitespace) {
        Some(idx) if idx > 0 => &hard[..idx],
        _ => hard.as_str(),
    };
    format!("{}…", cut.trim_end())
}

/// Composes a draft for an item: generated text fitted to the budget, the
/// canonical URL, no media. Media attachment is the caller's concern.
pub async fn compose_draft(
    composer: &dyn TextComposer,
    item: &Item,
) -> Result<DraftPost, ComposeError> {
    let raw = composer.generate_text(item, text_budget()).await?;
    let text = fit_to_budget(&raw, text_budget());
    if text.is_empty() {
        return Err(ComposeError::Malformed("empty text".to_string()));
    }

    Ok(DraftPost {
        text,
        url: item.url().to_string(),
        media: Vec::<MediaRef>::new(),
    })
}
