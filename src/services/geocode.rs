//! Nominatim (OpenStreetMap) geocoding client.
//!
//! Free-text search and reverse geocoding. Nominatim requires a User-Agent
//! and returns coordinates as strings. The base URL is configurable so tests
//! can point at a mock server.

use serde::Deserialize;
use std::time::Duration;

use crate::errors::AppError;
use crate::gazetteer::PlaceCandidate;

/// Request timeout for geocoding calls.
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Maximum results requested from the search endpoint.
const SEARCH_LIMIT: u32 = 10;

/// Client for a Nominatim-compatible geocoding API.
#[derive(Debug, Clone)]
pub struct NominatimClient {
    client: reqwest::Client,
    base_url: String,
    user_agent: String,
    home_country: String,
}

// --- Nominatim JSON response types (format=jsonv2) ---

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: Option<String>,
    lon: Option<String>,
    /// Point-of-interest name (present for amenities, landmarks).
    name: Option<String>,
    address: Option<NominatimAddress>,
}

#[derive(Debug, Deserialize)]
struct NominatimAddress {
    suburb: Option<String>,
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    municipality: Option<String>,
    county: Option<String>,
    state: Option<String>,
    country: Option<String>,
    country_code: Option<String>,
}

/// Where the chosen display name came from, for suffix policy.
#[derive(Debug, Clone, Copy, PartialEq)]
enum NameLevel {
    PointOfInterest,
    SubLocality,
    Locality,
}

impl NominatimClient {
    pub fn new(base_url: &str, user_agent: &str, home_country: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            user_agent: user_agent.to_string(),
            home_country: home_country.to_lowercase(),
        }
    }

    /// Free-text place search. Results are already display-named per the
    /// naming policy; entries lacking a name or coordinates are dropped.
    pub async fn search(&self, query: &str) -> Result<Vec<PlaceCandidate>, AppError> {
        let url = format!(
            "{}/search?q={}&format=jsonv2&addressdetails=1&limit={}",
            self.base_url,
            urlencoding::encode(query),
            SEARCH_LIMIT
        );

        let places: Vec<NominatimPlace> = self.get_json(&url).await?;
        Ok(places
            .iter()
            .filter_map(|p| self.to_candidate(p))
            .collect())
    }

    /// Reverse geocode a coordinate to a display-named place.
    /// Returns `None` when Nominatim has nothing for the coordinate.
    pub async fn reverse(&self, lat: f64, lon: f64) -> Result<Option<PlaceCandidate>, AppError> {
        let url = format!(
            "{}/reverse?lat={}&lon={}&format=jsonv2&addressdetails=1&zoom=10",
            self.base_url, lat, lon
        );

        let place: NominatimPlace = self.get_json(&url).await?;
        Ok(self.to_candidate(&place))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, AppError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(|e| {
                AppError::ProviderUnavailable(format!("geocoder request failed: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(AppError::ProviderUnavailable(format!(
                "geocoder returned HTTP {}",
                response.status()
            )));
        }

        response.json().await.map_err(|e| {
            AppError::ProviderUnavailable(format!("geocoder JSON parse error: {}", e))
        })
    }

    fn to_candidate(&self, place: &NominatimPlace) -> Option<PlaceCandidate> {
        let latitude: f64 = place.lat.as_deref()?.parse().ok()?;
        let longitude: f64 = place.lon.as_deref()?.parse().ok()?;
        let name = display_name(place, &self.home_country)?;
        Some(PlaceCandidate {
            name,
            latitude,
            longitude,
        })
    }
}

/// Choose a display name for a geocoded place.
///
/// Most specific wins: point-of-interest name > sub-locality > locality.
/// Domestic names get an administrative suffix appended when they lack one;
/// foreign names get ", <Country>" appended.
fn display_name(place: &NominatimPlace, home_country: &str) -> Option<String> {
    let address = place.address.as_ref();

    let (raw, level) = if let Some(poi) = place.name.as_deref().filter(|n| !n.trim().is_empty()) {
        (poi.to_string(), NameLevel::PointOfInterest)
    } else if let Some(suburb) = address
        .and_then(|a| a.suburb.as_deref())
        .filter(|s| !s.trim().is_empty())
    {
        (suburb.to_string(), NameLevel::SubLocality)
    } else if let Some(locality) = address.and_then(|a| {
        a.city
            .as_deref()
            .or(a.town.as_deref())
            .or(a.village.as_deref())
            .or(a.municipality.as_deref())
            .or(a.county.as_deref())
            .or(a.state.as_deref())
            .filter(|s| !s.trim().is_empty())
    }) {
        (locality.to_string(), NameLevel::Locality)
    } else {
        return None;
    };

    let country_code = address
        .and_then(|a| a.country_code.as_deref())
        .unwrap_or("")
        .to_lowercase();

    if country_code.is_empty() || country_code == home_country {
        Some(apply_admin_suffix(&raw, level))
    } else {
        let country = address.and_then(|a| a.country.as_deref()).unwrap_or("");
        if country.is_empty() {
            Some(raw)
        } else {
            Some(format!("{}, {}", raw, country))
        }
    }
}

/// Administrative suffixes a domestic place name may already carry.
const ADMIN_SUFFIXES: &[char] = &['市', '区', '县', '省', '镇', '乡'];

/// Append 市 (locality) or 区 (sub-locality) when a domestic name of ≥2
/// characters lacks an administrative suffix. POI names are left alone.
fn apply_admin_suffix(name: &str, level: NameLevel) -> String {
    let chars: Vec<char> = name.chars().collect();
    if chars.len() < 2 {
        return name.to_string();
    }
    if let Some(last) = chars.last() {
        if ADMIN_SUFFIXES.contains(last) {
            return name.to_string();
        }
    }
    match level {
        NameLevel::Locality => format!("{}市", name),
        NameLevel::SubLocality => format!("{}区", name),
        NameLevel::PointOfInterest => name.to_string(),
    }
}
