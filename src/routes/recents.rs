//! Recent-selections HTTP endpoints.
//!
//! - GET    /api/v1/recents
//! - POST   /api/v1/recents
//! - DELETE /api/v1/recents/:name
//! - PUT    /api/v1/recents/reorder

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::errors::{AppError, ErrorResponse};
use crate::gazetteer::PlaceCandidate;
use crate::routes::AppState;
use crate::services::recents::RecentSelection;

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddRecentRequest {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReorderRequest {
    /// Index of the entry to move
    pub from: usize,
    /// Destination index
    pub to: usize,
}

/// List recent selections, most recent first.
#[utoipa::path(
    get,
    path = "/api/v1/recents",
    tag = "Recents",
    responses(
        (status = 200, description = "Recent selections", body = Vec<RecentSelection>),
    )
)]
pub async fn list_recents(State(state): State<AppState>) -> Json<Vec<RecentSelection>> {
    Json(state.recents.list().await)
}

/// Add a selection (idempotent by name: an existing entry moves to the front).
#[utoipa::path(
    post,
    path = "/api/v1/recents",
    tag = "Recents",
    request_body = AddRecentRequest,
    responses(
        (status = 200, description = "Updated list", body = Vec<RecentSelection>),
        (status = 400, description = "Empty place name", body = ErrorResponse),
    )
)]
pub async fn add_recent(
    State(state): State<AppState>,
    Json(request): Json<AddRecentRequest>,
) -> Result<Json<Vec<RecentSelection>>, AppError> {
    let list = state
        .recents
        .add(PlaceCandidate {
            name: request.name,
            latitude: request.latitude,
            longitude: request.longitude,
        })
        .await?;
    Ok(Json(list))
}

/// Remove a selection by name.
#[utoipa::path(
    delete,
    path = "/api/v1/recents/{name}",
    tag = "Recents",
    params(
        ("name" = String, Path, description = "Name of the selection to remove"),
    ),
    responses(
        (status = 204, description = "Removed"),
        (status = 404, description = "No selection with that name", body = ErrorResponse),
    )
)]
pub async fn remove_recent(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, AppError> {
    state.recents.remove(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Reorder the list (user drag).
#[utoipa::path(
    put,
    path = "/api/v1/recents/reorder",
    tag = "Recents",
    request_body = ReorderRequest,
    responses(
        (status = 200, description = "Updated list", body = Vec<RecentSelection>),
        (status = 400, description = "Indices out of range", body = ErrorResponse),
    )
)]
pub async fn reorder_recents(
    State(state): State<AppState>,
    Json(request): Json<ReorderRequest>,
) -> Result<Json<Vec<RecentSelection>>, AppError> {
    let list = state.recents.reorder(request.from, request.to).await?;
    Ok(Json(list))
}
