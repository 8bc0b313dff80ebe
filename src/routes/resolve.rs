//! Coordinate resolution HTTP endpoint.
//!
//! - GET /api/v1/resolve?lat=31.23&lon=121.47

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::errors::{AppError, ErrorResponse};
use crate::routes::AppState;

#[derive(Debug, Deserialize, IntoParams)]
pub struct ResolveQuery {
    /// Latitude in degrees (-90 to 90)
    pub lat: f64,
    /// Longitude in degrees (-180 to 180)
    pub lon: f64,
}

/// Resolution result.
#[derive(Debug, Serialize, ToSchema)]
pub struct ResolveResponse {
    /// Best city name for the coordinate
    pub city: String,
}

/// Resolve a coordinate to a city name.
///
/// Single-flight: a request arriving while another resolution is in flight
/// is rejected with `request_cancelled` rather than queued. Reverse-geocode
/// failures degrade to the nearest known city.
#[utoipa::path(
    get,
    path = "/api/v1/resolve",
    tag = "Resolve",
    params(ResolveQuery),
    responses(
        (status = 200, description = "Resolved city name", body = ResolveResponse),
        (status = 400, description = "Invalid coordinates", body = ErrorResponse),
        (status = 403, description = "Resolver disabled", body = ErrorResponse),
        (status = 409, description = "A resolution is already in flight", body = ErrorResponse),
        (status = 504, description = "Reverse geocoding timed out", body = ErrorResponse),
    )
)]
pub async fn resolve_coordinate(
    State(state): State<AppState>,
    Query(params): Query<ResolveQuery>,
) -> Result<Json<ResolveResponse>, AppError> {
    // is_finite() first: NaN slips through plain range comparisons.
    if !params.lat.is_finite() || !params.lon.is_finite() {
        return Err(AppError::BadRequest(
            "lat and lon must be finite numbers".to_string(),
        ));
    }
    if !(-90.0..=90.0).contains(&params.lat) || !(-180.0..=180.0).contains(&params.lon) {
        return Err(AppError::BadRequest(
            "lat must be in [-90, 90] and lon in [-180, 180]".to_string(),
        ));
    }

    let city = state.resolver.resolve(params.lat, params.lon).await?;
    Ok(Json(ResolveResponse { city }))
}
