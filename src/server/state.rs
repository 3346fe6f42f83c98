//! State inspection endpoint for observability.
//!
//! Provides a read-only view of the queue, history, and limiter counters for
//! debugging and monitoring.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use super::AppState;
use crate::persistence::revision::latest_revision;
use crate::persistence::snapshot::PersistedSnapshot;
use crate::persistence::store::StoreError;

/// Errors that can occur when fetching state.
#[derive(Debug, Error)]
pub enum StateError {
    /// No snapshot has been committed yet.
    #[error("no state has been committed yet")]
    NotFound,

    /// Failed to read the state directory.
    #[error("state unavailable: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for StateError {
    fn into_response(self) -> Response {
        let status = match &self {
            StateError::NotFound => StatusCode::NOT_FOUND,
            StateError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, self.to_string()).into_response()
    }
}

/// State inspection handler.
///
/// # Response
///
/// - 200 OK with the latest [`PersistedSnapshot`] as JSON
/// - 404 Not Found before the first commit
/// - 500 Internal Server Error for IO or deserialization errors
pub async fn state_handler(
    State(app_state): State<AppState>,
) -> Result<Json<PersistedSnapshot>, StateError> {
    let store = app_state.store();

    // A fresh directory would load as the empty snapshot; the endpoint
    // distinguishes "nothing committed" from "empty state" with a 404.
    if latest_revision(store.state_dir())
        .map_err(StoreError::from)?
        .is_none()
    {
        return Err(StateError::NotFound);
    }

    let snapshot = store.load_latest()?;
    Ok(Json(snapshot))
}
