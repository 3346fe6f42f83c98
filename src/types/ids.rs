//! Strongly-typed identifiers used throughout the bot.
//!
//! The central type is [`ItemId`]: the canonical, normalized form of an
//! article's source URL. The canonical form doubles as the dedup key, so two
//! syntactic variants of the same link (tracking parameters, fragments,
//! trailing slashes, case differences in host) collapse to one identifier.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Query parameters that decorate links without identifying the resource.
///
/// Keys are compared case-insensitively; any key starting with `utm_` is
/// also dropped.
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "dclid", "msclkid", "igshid", "twclid", "mc_cid", "mc_eid", "ref_src",
    "cmpid", "smid",
];

/// Errors from canonicalizing a candidate URL.
#[derive(Debug, Error)]
pub enum InvalidItemUrl {
    /// The string does not parse as a URL at all.
    #[error("not a valid URL: {0}")]
    Malformed(#[from] url::ParseError),

    /// Parsed, but the scheme is not http or https.
    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    /// Parsed, but there is no host component.
    #[error("URL has no host")]
    MissingHost,
}

/// Canonical identifier for a content item: the normalized source URL.
///
/// Construct via [`ItemId::parse`]; the inner string is always the canonical
/// form, so equality on `ItemId` is the dedup relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Canonicalizes a raw article URL into an `ItemId`.
    ///
    /// Normalization steps:
    /// - scheme and host are lowercased, default ports dropped (done by the
    ///   `url` parser)
    /// - the fragment is removed
    /// - tracking query parameters are removed; remaining parameters keep
    ///   their original order
    /// - trailing slashes are trimmed from non-root paths
    ///
    /// Only `http` and `https` URLs are accepted.
    pub fn parse(raw: &str) -> Result<ItemId, InvalidItemUrl> {
        let mut url = Url::parse(raw.trim())?;

        match url.scheme() {
            "http" | "https" => {}
            other => return Err(InvalidItemUrl::UnsupportedScheme(other.to_string())),
        }
        if url.host_str().is_none() {
            return Err(InvalidItemUrl::MissingHost);
        }

        url.set_fragment(None);
        strip_tracking_params(&mut url);
        trim_trailing_slashes(&mut url);

        Ok(ItemId(url.to_string()))
    }

    /// Returns the canonical URL string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ItemId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<ItemId> for String {
    fn from(id: ItemId) -> String {
        id.0
    }
}

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

fn strip_tracking_params(url: &mut Url) {
    if url.query().is_none() {
        return;
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
}

fn trim_trailing_slashes(url: &mut Url) {
    let path = url.path().to_string();
    if path != "/" && path.ends_with('/') {
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            url.set_path("/");
        } else {
            url.set_path(trimmed);
        }
    }
}

/// Identifier assigned by the publishing platform to a published post.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalPostId(String);

impl ExternalPostId {
    pub fn new(id: impl Into<String>) -> Self {
        ExternalPostId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExternalPostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ExternalPostId {
    fn from(s: String) -> Self {
        ExternalPostId(s)
    }
}

#[cfg(test)]
mod item_id_tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn lowercases_scheme_and_host() {
        let id = ItemId::parse("HTTPS://Example.COM/News/Story").unwrap();
        assert_eq!(id.as_str(), "https://example.com/News/Story");
    }

    #[test]
    fn strips_default_port() {
        let id = ItemId::parse("http://example.com:80/a").unwrap();
        assert_eq!(id.as_str(), "http://example.com/a");

        let id = ItemId::parse("https://example.com:443/a").unwrap();
        assert_eq!(id.as_str(), "https://example.com/a");
    }

    #[test]
    fn keeps_non_default_port() {
        let id = ItemId::parse("http://example.com:8080/a").unwrap();
        assert_eq!(id.as_str(), "http://example.com:8080/a");
    }

    #[test]
    fn strips_fragment() {
        let id = ItemId::parse("https://example.com/story#comments").unwrap();
        assert_eq!(id.as_str(), "https://example.com/story");
    }

    #[test]
    fn strips_tracking_params_keeps_others() {
        let id = ItemId::parse("https://example.com/story?id=7&utm_source=x&fbclid=abc").unwrap();
        assert_eq!(id.as_str(), "https://example.com/story?id=7");
    }

    #[test]
    fn tracking_params_match_case_insensitively() {
        let id = ItemId::parse("https://example.com/story?UTM_Source=x&FBCLID=y&page=2").unwrap();
        assert_eq!(id.as_str(), "https://example.com/story?page=2");
    }

    #[test]
    fn all_tracking_query_removes_question_mark() {
        let id = ItemId::parse("https://example.com/story?utm_medium=social").unwrap();
        assert_eq!(id.as_str(), "https://example.com/story");
    }

    #[test]
    fn trims_trailing_slash_on_non_root() {
        let id = ItemId::parse("https://example.com/news/").unwrap();
        assert_eq!(id.as_str(), "https://example.com/news");
    }

    #[test]
    fn root_path_keeps_slash() {
        let id = ItemId::parse("https://example.com").unwrap();
        assert_eq!(id.as_str(), "https://example.com/");

        let id = ItemId::parse("https://example.com/").unwrap();
        assert_eq!(id.as_str(), "https://example.com/");
    }

    #[test]
    fn equivalent_variants_collapse() {
        let variants = [
            "https://example.com/a/story?utm_source=rss",
            "HTTPS://EXAMPLE.com/a/story",
            "https://example.com:443/a/story/",
            "https://example.com/a/story#top",
        ];
        let ids: Vec<ItemId> = variants
            .iter()
            .map(|v| ItemId::parse(v).unwrap())
            .collect();
        assert!(ids.iter().all(|id| id == &ids[0]));
    }

    #[test]
    fn rejects_unsupported_scheme() {
        assert!(matches!(
            ItemId::parse("ftp://example.com/file"),
            Err(InvalidItemUrl::UnsupportedScheme(_))
        ));
        assert!(matches!(
            ItemId::parse("mailto:someone@example.com"),
            Err(InvalidItemUrl::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            ItemId::parse("not a url"),
            Err(InvalidItemUrl::Malformed(_))
        ));
        assert!(matches!(ItemId::parse(""), Err(InvalidItemUrl::Malformed(_))));
    }

    #[test]
    fn serde_is_transparent() {
        let id = ItemId::parse("https://example.com/story").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"https://example.com/story\"");
        let back: ItemId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    proptest! {
        /// Parsing the canonical form again is a fixed point.
        #[test]
        fn canonicalization_is_idempotent(
            host in "[a-z][a-z0-9]{1,10}\\.(com|org|net)",
            path in "(/[a-z0-9]{1,8}){0,4}",
        ) {
            let raw = format!("https://{}{}", host, path);
            let once = ItemId::parse(&raw).unwrap();
            let twice = ItemId::parse(once.as_str()).unwrap();
            prop_assert_eq!(once, twice);
        }

        /// Canonical ids never carry fragments or utm parameters.
        #[test]
        fn canonical_form_has_no_tracking_residue(
            host in "[a-z]{3,8}\\.com",
            path in "/[a-z]{1,8}",
            param in "utm_[a-z]{2,8}",
            frag in "[a-z]{1,6}",
        ) {
            let raw = format!("https://{}{}?{}=x#{}", host, path, param, frag);
            let id = ItemId::parse(&raw).unwrap();
            prop_assert!(!id.as_str().contains('#'));
            prop_assert!(!id.as_str().contains("utm_"));
        }

        /// Parsing is deterministic.
        #[test]
        fn parse_is_deterministic(host in "[a-z]{3,8}\\.com", path in "(/[a-z]{1,6}){0,3}") {
            let raw = format!("http://{}{}", host, path);
            let a = ItemId::parse(&raw).unwrap();
            let b = ItemId::parse(&raw).unwrap();
            prop_assert_eq!(a, b);
        }
    }
}

#[cfg(test)]
mod external_post_id_tests {
    use super::*;

    #[test]
    fn display_and_accessors() {
        let id = ExternalPostId::new("1888883456");
        assert_eq!(id.as_str(), "1888883456");
        assert_eq!(id.to_string(), "1888883456");
    }

    #[test]
    fn serde_is_transparent() {
        let id = ExternalPostId::new("42");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"42\"");
        let back: ExternalPostId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
