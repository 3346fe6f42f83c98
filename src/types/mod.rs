//! Core domain types for the news bot.
//!
//! This module contains all the fundamental types used throughout the
//! application, designed to encode invariants via the type system.

pub mod candidate;
pub mod ids;
pub mod item;
pub mod post;

// Re-export commonly used types at the module level
pub use candidate::Candidate;
pub use ids::{ExternalPostId, InvalidItemUrl, ItemId};
pub use item::{Item, ItemStatus, PostedRecord};
pub use post::{DraftPost, MediaRef};
