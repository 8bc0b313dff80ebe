//! Refresher status HTTP endpoint.
//!
//! GET /api/v1/refresher/status — returns the current state of the
//! background weather refresher as JSON.

use axum::extract::State;
use axum::Json;

use crate::services::refresher::{RefresherState, SharedRefresherState};

/// Get the current refresher status.
///
/// Returns per-city info (name, last_result, refreshed_at) and global info
/// (next_run_at, last_run_completed_at, total_runs, active).
#[utoipa::path(
    get,
    path = "/api/v1/refresher/status",
    tag = "Refresher",
    responses(
        (status = 200, description = "Current refresher status", body = RefresherState),
    )
)]
pub async fn get_refresher_status(
    State(state): State<SharedRefresherState>,
) -> Json<RefresherState> {
    let s = state.read().await;
    Json(s.clone())
}
