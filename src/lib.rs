//! Newsdesk - an automated news curation and publishing bot.
//!
//! The bot collects article candidates from a news API, filters and queues
//! them in a crash-safe snapshot store, and publishes the best candidate at a
//! rate-limited cadence with generated text and optional media. All state
//! lives in versioned snapshot files, so concurrent instances coordinate
//! through the filesystem alone.

pub mod collect;
pub mod compose;
pub mod config;
pub mod http;
pub mod persistence;
pub mod publish;
pub mod scheduler;
pub mod server;
pub mod state;
pub mod tick;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;
