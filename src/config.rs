//! TOML configuration for the bot.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! runnable dry-run configuration. Secrets never appear in the file: each
//! adapter section names the environment variable its credential is read
//! from, and resolution happens at startup.

use std::fmt::Write as _;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::collect::FilterConfig;
use crate::http::composer::ComposerConfig;
use crate::http::feed::FeedConfig;
use crate::http::media::{MAX_IMAGES_PER_POST, MediaConfig};
use crate::http::publisher::PublisherConfig;
use crate::persistence::pruning::PruneConfig;
use crate::scheduler::ScheduleConfig;
use crate::tick::PipelineConfig;

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Toml(#[from] toml::de::Error),

    /// A value is out of its accepted range.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// A required credential's environment variable is unset or empty.
    #[error("missing secret: environment variable {var} is not set")]
    MissingSecret { var: String },
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Queue retention knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSection {
    /// Hours an item may wait in the queue before expiring.
    pub ttl_hours: u32,

    /// Queue size cap; lowest-priority items are evicted beyond it.
    pub max_queued_items: usize,

    /// Days a posted-history record is retained for dedup.
    pub posted_retention_days: u32,
}

impl Default for QueueSection {
    fn default() -> Self {
        QueueSection {
            ttl_hours: 48,
            max_queued_items: 100,
            posted_retention_days: 30,
        }
    }
}

/// Rate limiter targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterSection {
    /// Publishes permitted per trailing 24 hours.
    pub daily_target: u32,

    /// Minimum seconds between publishes.
    pub min_interval_secs: u32,
}

impl Default for LimiterSection {
    fn default() -> Self {
        LimiterSection {
            daily_target: 60,
            min_interval_secs: 1440,
        }
    }
}

/// Collect pass knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectSection {
    /// How many hours back each fetch asks for.
    pub lookback_hours: u32,
}

impl Default for CollectSection {
    fn default() -> Self {
        CollectSection { lookback_hours: 1 }
    }
}

/// Publish pass knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishSection {
    /// Publish attempts per item before terminal failure.
    pub max_attempts: u32,
}

impl Default for PublishSection {
    fn default() -> Self {
        PublishSection { max_attempts: 3 }
    }
}

/// Media section: the adapter config plus an enable switch, since posting
/// runs fine text-only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaSection {
    pub enabled: bool,

    #[serde(flatten)]
    pub config: MediaConfig,
}

/// Observability server knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Socket address the server binds.
    pub bind: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        ServerSection {
            bind: "0.0.0.0:3000".to_string(),
        }
    }
}

/// The whole configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding snapshot files.
    pub state_dir: PathBuf,

    /// Log publishes instead of calling the platform.
    pub dry_run: bool,

    pub queue: QueueSection,
    pub limiter: LimiterSection,
    pub collect: CollectSection,
    pub publish: PublishSection,
    pub filter: FilterConfig,
    pub feed: FeedConfig,
    pub composer: ComposerConfig,
    pub media: MediaSection,
    pub publisher: PublisherConfig,
    pub schedule: ScheduleConfig,
    pub server: ServerSection,
}

impl Config {
    /// Loads and validates a config file.
    pub fn load(path: &Path) -> Result<Config> {
        let raw = std::fs::read_to_string(path)?;
        Config::from_toml_str(&raw)
    }

    /// Loads the file if it exists, otherwise falls back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Config> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Config::from_toml_str(&raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no config file; using defaults");
                let config = Config::default_runnable();
                config.validate()?;
                Ok(config)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Parses and validates TOML content.
    pub fn from_toml_str(raw: &str) -> Result<Config> {
        let mut config: Config = toml::from_str(raw)?;
        if config.state_dir.as_os_str().is_empty() {
            config.state_dir = PathBuf::from("state");
        }
        config.validate()?;
        Ok(config)
    }

    fn default_runnable() -> Config {
        Config {
            state_dir: PathBuf::from("state"),
            ..Config::default()
        }
    }

    /// Checks ranges that would make the bot misbehave silently.
    pub fn validate(&self) -> Result<()> {
        if self.queue.ttl_hours == 0 {
            return Err(ConfigError::Invalid("queue.ttl_hours must be at least 1".into()));
        }
        if self.queue.max_queued_items == 0 {
            return Err(ConfigError::Invalid(
                "queue.max_queued_items must be at least 1".into(),
            ));
        }
        if self.publish.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "publish.max_attempts must be at least 1".into(),
            ));
        }
        if self.media.config.images_per_post > MAX_IMAGES_PER_POST {
            return Err(ConfigError::Invalid(format!(
                "media.images_per_post must be at most {MAX_IMAGES_PER_POST}"
            )));
        }
        if self.schedule.jitter_percent > 100 {
            return Err(ConfigError::Invalid(
                "schedule.jitter_percent must be at most 100".into(),
            ));
        }
        self.bind_addr()?;
        Ok(())
    }

    /// The parsed server bind address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.server
            .bind
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("server.bind is not an address: {}", self.server.bind)))
    }

    /// Assembles the tick pipeline's knobs from the relevant sections.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            ttl_hours: self.queue.ttl_hours,
            lookback_hours: self.collect.lookback_hours,
            max_attempts: self.publish.max_attempts,
            daily_target: self.limiter.daily_target,
            min_interval_secs: self.limiter.min_interval_secs,
            images_per_post: if self.media.enabled {
                self.media.config.images_per_post
            } else {
                0
            },
            filter: self.filter.clone(),
            prune: self.prune_config(),
        }
    }

    pub fn prune_config(&self) -> PruneConfig {
        PruneConfig {
            posted_retention_days: self.queue.posted_retention_days,
            max_queued_items: self.queue.max_queued_items,
        }
    }

    /// Human-readable summary with no secret material. The adapter sections
    /// only ever hold environment variable names, so everything is safe to
    /// print.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "state_dir: {}", self.state_dir.display());
        let _ = writeln!(out, "dry_run: {}", self.dry_run);
        let _ = writeln!(
            out,
            "queue: ttl {}h, cap {}, history {}d",
            self.queue.ttl_hours, self.queue.max_queued_items, self.queue.posted_retention_days
        );
        let _ = writeln!(
            out,
            "limiter: {}/24h, min interval {}s",
            self.limiter.daily_target, self.limiter.min_interval_secs
        );
        let _ = writeln!(
            out,
            "schedule: collect every {}s, publish every {}s",
            self.schedule.collect_interval_secs, self.schedule.publish_interval_secs
        );
        let _ = writeln!(out, "feed: {} (key from ${})", self.feed.api_url, self.feed.api_key_env);
        let _ = writeln!(
            out,
            "composer: {} model {} (key from ${})",
            self.composer.api_url, self.composer.model, self.composer.api_key_env
        );
        let _ = writeln!(
            out,
            "media: {} ({})",
            if self.media.enabled { "enabled" } else { "disabled" },
            self.media.config.api_url
        );
        let _ = writeln!(
            out,
            "publisher: {} (token from ${})",
            self.publisher.api_url, self.publisher.token_env
        );
        let _ = writeln!(out, "server: {}", self.server.bind);
        out
    }
}

/// Reads a credential from the environment variable named by the config.
pub fn resolve_env_secret(var: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingSecret {
            var: var.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = Config::from_toml_str("").unwrap();

        assert_eq!(config.state_dir, PathBuf::from("state"));
        assert!(!config.dry_run);
        assert_eq!(config.queue.ttl_hours, 48);
        assert_eq!(config.limiter.daily_target, 60);
        assert_eq!(config.publish.max_attempts, 3);
        assert!(!config.media.enabled);
        assert_eq!(config.server.bind, "0.0.0.0:3000");
    }

    #[test]
    fn sections_override_independently() {
        let config = Config::from_toml_str(
            r#"
            dry_run = true
            state_dir = "/var/lib/newsdesk"

            [limiter]
            daily_target = 12

            [queue]
            ttl_hours = 24

            [filter]
            min_score = 10
            blacklisted_sources = ["spamwire"]

            [media]
            enabled = true
            images_per_post = 2
            "#,
        )
        .unwrap();

        assert!(config.dry_run);
        assert_eq!(config.state_dir, PathBuf::from("/var/lib/newsdesk"));
        assert_eq!(config.limiter.daily_target, 12);
        assert_eq!(config.limiter.min_interval_secs, 1440);
        assert_eq!(config.queue.ttl_hours, 24);
        assert_eq!(config.filter.min_score, 10);
        assert!(config.media.enabled);
        assert_eq!(config.media.config.images_per_post, 2);
    }

    #[test]
    fn pipeline_config_reflects_the_sections() {
        let config = Config::from_toml_str(
            r#"
            [limiter]
            daily_target = 10
            min_interval_secs = 60

            [publish]
            max_attempts = 5

            [media]
            enabled = false
            images_per_post = 3
            "#,
        )
        .unwrap();

        let pipeline = config.pipeline_config();
        assert_eq!(pipeline.daily_target, 10);
        assert_eq!(pipeline.min_interval_secs, 60);
        assert_eq!(pipeline.max_attempts, 5);
        // Disabled media zeroes the per-post image count.
        assert_eq!(pipeline.images_per_post, 0);
    }

    #[test]
    fn rejects_zero_ttl() {
        let err = Config::from_toml_str("[queue]\nttl_hours = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_zero_attempts() {
        let err = Config::from_toml_str("[publish]\nmax_attempts = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_excessive_images_per_post() {
        let err = Config::from_toml_str("[media]\nimages_per_post = 9").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_unparseable_bind_address() {
        let err = Config::from_toml_str("[server]\nbind = \"not-an-address\"").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.state_dir, PathBuf::from("state"));
    }

    #[test]
    fn summary_names_env_vars_not_values() {
        let config = Config::from_toml_str("").unwrap();
        let summary = config.summary();

        assert!(summary.contains("$NEWSDESK_FEED_API_KEY"));
        assert!(summary.contains("$NEWSDESK_PUBLISHER_TOKEN"));
        assert!(summary.contains("dry_run: false"));
    }

    #[test]
    fn resolve_env_secret_rejects_empty() {
        // Variable names scoped to this test to avoid cross-test races.
        unsafe {
            std::env::set_var("NEWSDESK_TEST_SECRET_SET", "tok");
            std::env::set_var("NEWSDESK_TEST_SECRET_EMPTY", "");
        }

        assert_eq!(resolve_env_secret("NEWSDESK_TEST_SECRET_SET").unwrap(), "tok");
        assert!(matches!(
            resolve_env_secret("NEWSDESK_TEST_SECRET_EMPTY"),
            Err(ConfigError::MissingSecret { .. })
        ));
        assert!(matches!(
            resolve_env_secret("NEWSDESK_TEST_SECRET_UNSET"),
            Err(ConfigError::MissingSecret { .. })
        ));
    }
}
