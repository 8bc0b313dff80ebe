//! City search HTTP endpoints.
//!
//! - GET /api/v1/search?q=beijing
//! - GET /api/v1/cities/hot

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use utoipa::IntoParams;

use crate::gazetteer::PlaceCandidate;
use crate::routes::AppState;

#[derive(Debug, Deserialize, IntoParams)]
pub struct SearchQuery {
    /// Free-text query; empty or missing returns the hot-city list
    #[serde(default)]
    pub q: String,
}

/// Search for cities by name, alias or romanization.
///
/// Merges curated gazetteer matches with live geocoder results. Never
/// fails: geocoder problems degrade to gazetteer-only results and an empty
/// list is a valid answer.
#[utoipa::path(
    get,
    path = "/api/v1/search",
    tag = "Search",
    params(SearchQuery),
    responses(
        (status = 200, description = "Matching places, best first (max 20)", body = Vec<PlaceCandidate>),
    )
)]
pub async fn search_places(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> Json<Vec<PlaceCandidate>> {
    Json(state.matcher.search(&params.q).await)
}

/// The curated hot-city list (first entries of the gazetteer).
#[utoipa::path(
    get,
    path = "/api/v1/cities/hot",
    tag = "Search",
    responses(
        (status = 200, description = "Curated hot cities", body = Vec<PlaceCandidate>),
    )
)]
pub async fn hot_cities(State(state): State<AppState>) -> Json<Vec<PlaceCandidate>> {
    Json(state.matcher.hot_cities())
}
