//! Raw candidates as delivered by the feed boundary, before validation,
//! filtering, and admission.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An article as returned by the candidate source.
///
/// Nothing here is trusted: the URL may be malformed, the body empty, the
/// score missing upstream (defaulted to zero). Admission turns a surviving
/// candidate into an [`Item`](super::Item).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Source-assigned identifier, when the feed provides one. Informational
    /// only; dedup runs on the canonical URL, never on this.
    pub source_id: Option<String>,

    /// Article headline.
    pub title: String,

    /// Raw article URL as given by the feed.
    pub url: String,

    /// Name of the originating outlet.
    pub source: String,

    /// Article body text, used by admission filtering.
    pub body: String,

    /// Social-engagement score; higher is more newsworthy.
    pub score: i64,

    /// Publication timestamp, when the feed provides one.
    pub published_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_json() {
        let candidate = Candidate {
            source_id: Some("feed-81723".to_string()),
            title: "Example headline".to_string(),
            url: "https://example.com/story?utm_source=rss".to_string(),
            source: "Example Wire".to_string(),
            body: "Body text".to_string(),
            score: 12,
            published_at: Some(Utc::now()),
        };
        let json = serde_json::to_string(&candidate).unwrap();
        let back: Candidate = serde_json::from_str(&json).unwrap();
        assert_eq!(back, candidate);
    }
}
