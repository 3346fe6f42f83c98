//! The daemon's two tick loops.
//!
//! Collect and publish run on independent cadences so a slow feed fetch
//! never delays publishing and vice versa. Each loop sleeps, runs its tick,
//! and goes back to sleep; tick failures are logged and the loop continues.
//! A jitter derived from the state directory staggers instances that share
//! a deployment schedule so they do not all hit the feed API in the same
//! second after a fleet restart.

use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::tick::Pipeline;

/// Default seconds between collect passes (1 hour).
const DEFAULT_COLLECT_INTERVAL_SECS: u64 = 3600;

/// Default seconds between publish passes (24 minutes, matching the default
/// limiter spacing).
const DEFAULT_PUBLISH_INTERVAL_SECS: u64 = 1440;

/// Default jitter percentage (0-100).
const DEFAULT_JITTER_PERCENT: u8 = 10;

/// Cadence configuration for the daemon loops.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Seconds between collect passes.
    pub collect_interval_secs: u64,

    /// Seconds between publish passes.
    pub publish_interval_secs: u64,

    /// Jitter percentage added to both intervals (0-100).
    pub jitter_percent: u8,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        ScheduleConfig {
            collect_interval_secs: DEFAULT_COLLECT_INTERVAL_SECS,
            publish_interval_secs: DEFAULT_PUBLISH_INTERVAL_SECS,
            jitter_percent: DEFAULT_JITTER_PERCENT,
        }
    }
}

impl ScheduleConfig {
    /// The collect interval with deterministic jitter for `seed`.
    pub fn collect_interval(&self, seed: &str) -> Duration {
        jittered(self.collect_interval_secs, self.jitter_percent, seed)
    }

    /// The publish interval with deterministic jitter for `seed`.
    pub fn publish_interval(&self, seed: &str) -> Duration {
        jittered(self.publish_interval_secs, self.jitter_percent, seed)
    }
}

/// Stretches `base_secs` by up to `jitter_percent` percent, deterministically
/// for a given seed. The same instance always sleeps the same interval; two
/// instances with different state directories drift apart.
fn jittered(base_secs: u64, jitter_percent: u8, seed: &str) -> Duration {
    if jitter_percent == 0 {
        return Duration::from_secs(base_secs);
    }
    let mut hasher = std::hash::DefaultHasher::new();
    seed.hash(&mut hasher);
    let jitter = (hasher.finish() % u64::from(jitter_percent)) as f64 / 100.0;
    Duration::from_secs_f64(base_secs as f64 * (1.0 + jitter))
}

/// Runs both loops until the token is cancelled.
///
/// The first collect pass runs immediately so a fresh deployment has
/// something to publish; the first publish pass waits one interval.
#[instrument(skip_all)]
pub async fn run_scheduler(
    pipeline: Arc<Pipeline>,
    config: ScheduleConfig,
    shutdown: CancellationToken,
) {
    let seed = pipeline.store().state_dir().display().to_string();
    let collect_every = config.collect_interval(&seed);
    let publish_every = config.publish_interval(&seed);
    info!(
        collect_secs = collect_every.as_secs(),
        publish_secs = publish_every.as_secs(),
        "scheduler started"
    );

    let collect_loop = {
        let pipeline = Arc::clone(&pipeline);
        let shutdown = shutdown.clone();
        async move {
            loop {
                if let Err(e) = pipeline.collect_tick(Utc::now()).await {
                    error!(error = %e, "collect tick failed");
                }
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(collect_every) => {}
                }
            }
        }
    };

    let publish_loop = {
        let pipeline = Arc::clone(&pipeline);
        let shutdown = shutdown.clone();
        async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(publish_every) => {}
                }
                if shutdown.is_cancelled() {
                    break;
                }
                if let Err(e) = pipeline.post_tick(Utc::now()).await {
                    error!(error = %e, "publish tick failed");
                }
            }
        }
    };

    tokio::join!(collect_loop, publish_loop);
    info!("scheduler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cadence() {
        let config = ScheduleConfig::default();
        assert_eq!(config.collect_interval_secs, 3600);
        assert_eq!(config.publish_interval_secs, 1440);
        assert_eq!(config.jitter_percent, 10);
    }

    #[test]
    fn jitter_is_deterministic_per_seed() {
        let config = ScheduleConfig::default();

        let a1 = config.collect_interval("/var/lib/newsdesk/a");
        let a2 = config.collect_interval("/var/lib/newsdesk/a");
        assert_eq!(a1, a2);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let config = ScheduleConfig::default();
        let base = Duration::from_secs(config.collect_interval_secs);

        for seed in ["a", "b", "c", "/some/longer/path"] {
            let interval = config.collect_interval(seed);
            assert!(interval >= base);
            assert!(interval <= base.mul_f64(1.0 + f64::from(config.jitter_percent) / 100.0));
        }
    }

    #[test]
    fn zero_jitter_returns_the_exact_interval() {
        let config = ScheduleConfig {
            jitter_percent: 0,
            ..ScheduleConfig::default()
        };

        assert_eq!(
            config.publish_interval("anything"),
            Duration::from_secs(config.publish_interval_secs)
        );
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: ScheduleConfig = toml::from_str("collect_interval_secs = 900").unwrap();
        assert_eq!(config.collect_interval_secs, 900);
        assert_eq!(config.publish_interval_secs, 1440);
    }
}
