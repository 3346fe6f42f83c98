//! Pure state logic for the news bot.
//!
//! This module contains the functional core: the rate-limiter decision, the
//! queue discipline, and the idempotent state operations. All I/O and
//! effects are handled elsewhere.

pub mod limiter;
pub mod queue;
pub mod transitions;

// Re-export commonly used types and functions
pub use limiter::{DenyReason, LimiterDecision, RateLimiterState, WINDOW};
pub use queue::{evict_over_cap, next_queued, ordered_queue, priority_order, sweep_expired};
pub use transitions::{ApplyOutcome, StateOp, apply_op, apply_ops};
