//! The composed post handed to the publisher boundary.

use serde::{Deserialize, Serialize};

/// A reference to an image attachable to a post.
///
/// Media is passed through as returned by the provider; the bot performs no
/// transformation (see DESIGN.md).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    /// Direct URL of the image.
    pub url: String,

    /// Accessibility description, when the provider supplies one.
    pub alt_text: Option<String>,
}

/// A fully composed post, ready for the publisher.
///
/// `text` has already been fitted to the platform budget by composition; the
/// final wire form is [`DraftPost::full_text`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftPost {
    /// Generated post text, within budget, without the link.
    pub text: String,

    /// Canonical article URL appended after the text.
    pub url: String,

    /// Attached media, possibly empty.
    pub media: Vec<MediaRef>,
}

impl DraftPost {
    /// The string actually sent to the platform: text, newline, link.
    pub fn full_text(&self) -> String {
        format!("{}\n{}", self.text, self.url)
    }
}
