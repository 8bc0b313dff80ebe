//! Weather HTTP endpoints.
//!
//! - GET  /api/v1/weather/:city?lat=&lon=
//! - GET  /api/v1/weather/:city/yesterday
//! - POST /api/v1/weather/refresh

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::errors::{AppError, ErrorResponse};
use crate::gazetteer::PlaceCandidate;
use crate::routes::AppState;
use crate::services::weather::WeatherSnapshot;

#[derive(Debug, Deserialize, IntoParams)]
pub struct WeatherQuery {
    /// Latitude; optional when the city is known to the gazetteer or recents
    pub lat: Option<f64>,
    /// Longitude; optional when the city is known to the gazetteer or recents
    pub lon: Option<f64>,
}

/// Weather response: the city's snapshot plus a staleness marker.
#[derive(Debug, Serialize, ToSchema)]
pub struct WeatherResponse {
    /// True when the provider was unreachable and this is cached data
    pub stale: bool,
    pub snapshot: WeatherSnapshot,
}

/// Yesterday's weather, served from local day history.
#[derive(Debug, Serialize, ToSchema)]
pub struct YesterdayResponse {
    pub city_key: String,
    /// The local calendar day (ISO 8601 date)
    pub day: String,
    pub weather_code: i64,
    pub temperature_max_c: f64,
    pub temperature_min_c: f64,
    pub precipitation_sum_mm: f64,
    /// When the record was last written (ISO 8601)
    pub recorded_at: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshCity {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub cities: Vec<RefreshCity>,
}

/// Batch refresh acknowledgement.
#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshAccepted {
    /// Number of cities accepted for refresh
    pub accepted: usize,
}

/// Get current, hourly and daily weather for a city.
///
/// Serves the cached snapshot when fresh; refreshes otherwise. If the
/// provider is unreachable, stale cached data is returned with the
/// `X-Weather-Stale: true` header instead of an error.
#[utoipa::path(
    get,
    path = "/api/v1/weather/{city}",
    tag = "Weather",
    params(
        ("city" = String, Path, description = "City name (used as the cache key)"),
        WeatherQuery,
    ),
    responses(
        (status = 200, description = "Weather snapshot for the city", body = WeatherResponse,
         headers(
             ("X-Weather-Stale" = String, description = "Set to 'true' when serving cached data because the provider is unreachable")
         )),
        (status = 400, description = "Unknown city and no coordinates given", body = ErrorResponse),
        (status = 502, description = "Provider unreachable and no cached data", body = ErrorResponse),
    )
)]
pub async fn get_city_weather(
    State(state): State<AppState>,
    Path(city): Path<String>,
    Query(params): Query<WeatherQuery>,
) -> Result<(HeaderMap, Json<WeatherResponse>), AppError> {
    let (lat, lon) = resolve_coordinates(&state, &city, params.lat, params.lon).await?;

    let (snapshot, stale) = state.weather.cached_or_refresh(&city, lat, lon).await?;

    let mut headers = HeaderMap::new();
    if stale {
        headers.insert("X-Weather-Stale", "true".parse().unwrap());
    }

    Ok((
        headers,
        Json(WeatherResponse {
            stale,
            snapshot: (*snapshot).clone(),
        }),
    ))
}

/// Get yesterday's final daily entry for a city.
///
/// Served exclusively from the local day-history table; the live provider
/// has no historical data. 404 when no record exists.
#[utoipa::path(
    get,
    path = "/api/v1/weather/{city}/yesterday",
    tag = "Weather",
    params(
        ("city" = String, Path, description = "City name"),
    ),
    responses(
        (status = 200, description = "Yesterday's weather record", body = YesterdayResponse),
        (status = 404, description = "No historical record for the city", body = ErrorResponse),
    )
)]
pub async fn get_city_yesterday(
    State(state): State<AppState>,
    Path(city): Path<String>,
) -> Result<Json<YesterdayResponse>, AppError> {
    let row = state.weather.yesterday(&city).await?;
    Ok(Json(YesterdayResponse {
        city_key: row.city_key,
        day: row.day.to_string(),
        weather_code: row.weather_code,
        temperature_max_c: row.temperature_max_c,
        temperature_min_c: row.temperature_min_c,
        precipitation_sum_mm: row.precipitation_sum_mm,
        recorded_at: row.recorded_at.to_rfc3339(),
    }))
}

/// Kick off a fire-and-forget batch refresh.
///
/// Each city is refreshed independently; one failure neither blocks nor
/// fails the others. Returns immediately with 202.
#[utoipa::path(
    post,
    path = "/api/v1/weather/refresh",
    tag = "Weather",
    request_body = RefreshRequest,
    responses(
        (status = 202, description = "Refresh accepted", body = RefreshAccepted),
        (status = 400, description = "No valid cities in the request", body = ErrorResponse),
    )
)]
pub async fn refresh_cities(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<(StatusCode, Json<RefreshAccepted>), AppError> {
    let places: Vec<PlaceCandidate> = request
        .cities
        .into_iter()
        .filter(|c| !c.name.trim().is_empty())
        .map(|c| PlaceCandidate {
            name: c.name,
            latitude: c.latitude,
            longitude: c.longitude,
        })
        .collect();

    if places.is_empty() {
        return Err(AppError::BadRequest(
            "request contains no usable cities".to_string(),
        ));
    }

    let accepted = places.len();
    state.weather.clone().refresh_many(places);

    Ok((StatusCode::ACCEPTED, Json(RefreshAccepted { accepted })))
}

/// Find coordinates for a city: explicit query params first, then the
/// gazetteer, then the recents list.
async fn resolve_coordinates(
    state: &AppState,
    city: &str,
    lat: Option<f64>,
    lon: Option<f64>,
) -> Result<(f64, f64), AppError> {
    if let (Some(lat), Some(lon)) = (lat, lon) {
        if !lat.is_finite() || !lon.is_finite() {
            return Err(AppError::BadRequest(
                "lat and lon must be finite numbers".to_string(),
            ));
        }
        return Ok((lat, lon));
    }

    if let Some(entry) = state.gazetteer.find_by_name(city) {
        return Ok((entry.latitude, entry.longitude));
    }

    let needle = city.trim();
    if let Some(recent) = state
        .recents
        .list()
        .await
        .into_iter()
        .find(|s| s.name == needle)
    {
        return Ok((recent.latitude, recent.longitude));
    }

    Err(AppError::BadRequest(format!(
        "unknown city '{}'; pass lat and lon query parameters",
        city
    )))
}
