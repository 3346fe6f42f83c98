//! HTTP server for observability.
//!
//! The server never mutates state; it reads whatever snapshot the tick loops
//! last committed. Because reads go through the same store as writes, the
//! endpoint always reflects the latest durable revision.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns 200 if the server is running
//! - `GET /api/v1/state` - Returns the latest snapshot as JSON

use std::path::PathBuf;
use std::sync::Arc;

use crate::persistence::store::SnapshotStore;

pub mod health;
pub mod state;

pub use health::health_handler;
pub use state::state_handler;

/// Shared application state, passed to handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Read-only handle on the state directory.
    store: SnapshotStore,
}

impl AppState {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                store: SnapshotStore::new(state_dir),
            }),
        }
    }

    /// Returns the snapshot store.
    pub fn store(&self) -> &SnapshotStore {
        &self.inner.store
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::get;

    axum::Router::new()
        .route("/api/v1/state", get(state_handler))
        .route("/health", get(health_handler))
        .with_state(app_state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn app_state_is_clone() {
        let state_dir = tempdir().unwrap();
        let state = AppState::new(state_dir.path());
        let cloned = state.clone();

        assert_eq!(state.store().state_dir(), cloned.store().state_dir());
    }
}
