//! Rolling-window publish-rate limiter.
//!
//! The limiter is a pure decision function over `(now, persisted counters)`.
//! It owns no timer: any external trigger (the daemon scheduler, a cron-run
//! one-shot, a manual invocation) evaluates it identically.
//!
//! # Guarantees
//!
//! The hard guarantee is the trailing-24h cap: at most `daily_target`
//! publishes in any trailing window. `min_interval` spacing is best-effort;
//! tick cadence jitter may stretch it and that is acceptable.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Length of the trailing window the cap is enforced over.
pub const WINDOW: Duration = Duration::hours(24);

/// Default publishes per trailing window.
pub const DEFAULT_DAILY_TARGET: u32 = 60;

/// Default minimum spacing between publishes (24 minutes, i.e. a full day
/// divided by the default target).
pub const DEFAULT_MIN_INTERVAL_SECS: u32 = 1440;

/// Persisted limiter counters, stored inside the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimiterState {
    /// Timestamps of successful publishes, ascending. Entries at or beyond
    /// window age are pruned on commit; [`RateLimiterState::decide`] ignores
    /// them regardless.
    pub window_events: Vec<DateTime<Utc>>,

    /// Maximum publishes within any trailing window.
    pub daily_target: u32,

    /// Minimum spacing between consecutive publishes, in seconds.
    pub min_interval_secs: u32,
}

impl Default for RateLimiterState {
    fn default() -> Self {
        RateLimiterState::new(DEFAULT_DAILY_TARGET, DEFAULT_MIN_INTERVAL_SECS)
    }
}

/// Outcome of a limiter evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimiterDecision {
    /// Exactly one publish is permitted this tick.
    Permit,

    /// No publish this tick.
    Deny(DenyReason),
}

impl LimiterDecision {
    pub fn is_permit(&self) -> bool {
        matches!(self, LimiterDecision::Permit)
    }
}

/// Why a publish was denied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// The trailing window already holds `daily_target` events. A slot frees
    /// at `until`.
    WindowExhausted { until: DateTime<Utc> },

    /// The last publish is closer than `min_interval`. Spacing is satisfied
    /// at `until`.
    MinInterval { until: DateTime<Utc> },
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DenyReason::WindowExhausted { until } => {
                write!(f, "daily window exhausted until {until}")
            }
            DenyReason::MinInterval { until } => {
                write!(f, "minimum interval not elapsed until {until}")
            }
        }
    }
}

impl RateLimiterState {
    pub fn new(daily_target: u32, min_interval_secs: u32) -> Self {
        RateLimiterState {
            window_events: Vec::new(),
            daily_target,
            min_interval_secs,
        }
    }

    /// The configured spacing as a duration.
    pub fn min_interval(&self) -> Duration {
        Duration::seconds(i64::from(self.min_interval_secs))
    }

    /// Evaluates the publish decision for `now` without mutating state.
    ///
    /// Events at or beyond window age are ignored even if not yet pruned, so
    /// the decision is independent of when pruning last ran.
    pub fn decide(&self, now: DateTime<Utc>) -> LimiterDecision {
        if self.daily_target == 0 {
            return LimiterDecision::Deny(DenyReason::WindowExhausted { until: now + WINDOW });
        }

        let cutoff = now - WINDOW;
        let in_window: Vec<DateTime<Utc>> = self
            .window_events
            .iter()
            .copied()
            .filter(|t| *t > cutoff)
            .collect();

        if in_window.len() >= self.daily_target as usize {
            // Ascending order is not assumed: find the oldest surviving event.
            let oldest = in_window.iter().min().copied().unwrap_or(now);
            return LimiterDecision::Deny(DenyReason::WindowExhausted {
                until: oldest + WINDOW,
            });
        }

        if let Some(last) = self.window_events.iter().max().copied() {
            let spaced_at = last + self.min_interval();
            if now < spaced_at {
                return LimiterDecision::Deny(DenyReason::MinInterval { until: spaced_at });
            }
        }

        LimiterDecision::Permit
    }

    /// Records a successful publish, keeping events ascending.
    ///
    /// Conflict replay may deliver timestamps out of order, so insertion is
    /// positional rather than a plain push.
    pub fn record(&mut self, at: DateTime<Utc>) {
        let idx = self.window_events.partition_point(|t| *t <= at);
        self.window_events.insert(idx, at);
    }

    /// Drops events at or beyond window age. Returns how many were removed.
    pub fn prune_window(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = now - WINDOW;
        let before = self.window_events.len();
        self.window_events.retain(|t| *t > cutoff);
        before - self.window_events.len()
    }

    /// Number of events inside the trailing window at `now`.
    pub fn count_in_window(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - WINDOW;
        self.window_events.iter().filter(|t| **t > cutoff).count()
    }

    /// Overwrites the configured targets, returning true if anything changed.
    ///
    /// Configuration owns the targets; the persisted copy exists so the
    /// snapshot is self-describing. Ticks call this after load and only a
    /// real config change dirties the snapshot.
    pub fn apply_targets(&mut self, daily_target: u32, min_interval_secs: u32) -> bool {
        let changed =
            self.daily_target != daily_target || self.min_interval_secs != min_interval_secs;
        self.daily_target = daily_target;
        self.min_interval_secs = min_interval_secs;
        changed
    }
}
