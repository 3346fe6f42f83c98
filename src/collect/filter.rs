//! Admission filtering for fetched candidates.
//!
//! Filtering is pure and per-candidate; dedup and queue admission happen in
//! the collect phase proper. Rules run cheapest-first and the first failure
//! wins, so the reject counters name one reason per candidate.

use serde::{Deserialize, Serialize};

use crate::types::Candidate;

/// Topic vocabulary used when the config does not supply its own. An article
/// must mention at least [`FilterConfig::min_topic_terms`] distinct terms to
/// count as on-topic.
pub const DEFAULT_TOPIC_TERMS: &[&str] = &[
    "mining",
    "miner",
    "miners",
    "hashrate",
    "hash rate",
    "asic",
    "difficulty",
    "proof of work",
    "proof-of-work",
    "terahash",
    "exahash",
    "th/s",
    "eh/s",
    "block reward",
    "halving",
    "mining pool",
    "energy consumption",
];

/// Admission rules applied to every fetched candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Outlets rejected outright, matched case-insensitively.
    pub blacklisted_sources: Vec<String>,

    /// Words or phrases that reject a candidate when present in the title,
    /// matched case-insensitively.
    pub blacklisted_keywords: Vec<String>,

    /// Minimum social-engagement score.
    pub min_score: i64,

    /// Minimum body length in characters; shorter articles are usually
    /// stubs or link roundups.
    pub min_body_length: usize,

    /// Topic vocabulary; empty means use [`DEFAULT_TOPIC_TERMS`].
    pub topic_terms: Vec<String>,

    /// Distinct topic terms required across title and body.
    pub min_topic_terms: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            blacklisted_sources: Vec::new(),
            blacklisted_keywords: Vec::new(),
            min_score: 5,
            min_body_length: 200,
            topic_terms: Vec::new(),
            min_topic_terms: 2,
        }
    }
}

impl FilterConfig {
    fn topic_terms(&self) -> Vec<String> {
        if self.topic_terms.is_empty() {
            DEFAULT_TOPIC_TERMS.iter().map(|t| t.to_string()).collect()
        } else {
            self.topic_terms.clone()
        }
    }
}

/// Why a candidate was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    BlacklistedSource,
    BlacklistedKeyword,
    LowScore,
    ShortBody,
    OffTopic,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RejectReason::BlacklistedSource => "blacklisted source",
            RejectReason::BlacklistedKeyword => "blacklisted keyword",
            RejectReason::LowScore => "score below minimum",
            RejectReason::ShortBody => "body too short",
            RejectReason::OffTopic => "not enough topic terms",
        };
        f.write_str(label)
    }
}

/// Outcome of filtering one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVerdict {
    Pass,
    Reject(RejectReason),
}

impl FilterVerdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, FilterVerdict::Pass)
    }
}

/// Applies the admission rules to a candidate.
pub fn evaluate(candidate: &Candidate, config: &FilterConfig) -> FilterVerdict {
    let source = candidate.source.to_lowercase();
    if config
        .blacklisted_sources
        .iter()
        .any(|s| s.to_lowercase() == source)
    {
        return FilterVerdict::Reject(RejectReason::BlacklistedSource);
    }

    let title = candidate.title.to_lowercase();
    if config
        .blacklisted_keywords
        .iter()
        .any(|k| title.contains(&k.to_lowercase()))
    {
        return FilterVerdict::Reject(RejectReason::BlacklistedKeyword);
    }

    if candidate.score < config.min_score {
        return FilterVerdict::Reject(RejectReason::LowScore);
    }

    if candidate.body.chars().count() < config.min_body_length {
        return FilterVerdict::Reject(RejectReason::ShortBody);
    }

    let haystack = format!("{} {}", title, candidate.body.to_lowercase());
    let matches = config
        .topic_terms()
        .iter()
        .filter(|term| haystack.contains(&term.to_lowercase()))
        .count();
    if matches < config.min_topic_terms {
        return FilterVerdict::Reject(RejectReason::OffTopic);
    }

    FilterVerdict::Pass
}
