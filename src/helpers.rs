//! Shared helpers for city-key normalization and coordinate math.
//!
//! The normalized city key (trimmed, lowercased) is the single cache and
//! lookup key used across the weather cache, day history and recents store.

/// Normalize a city name into a cache/lookup key: trim + lowercase.
pub(crate) fn normalize_city_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Round a coordinate to 3 decimal degrees (≈111 m).
///
/// Used by the resolver before submitting coordinates, so near-identical
/// points map to the same reverse-geocode request.
pub(crate) fn round_coord(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

/// Mean Earth radius in kilometres.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two WGS84 points, in kilometres (haversine).
pub(crate) fn great_circle_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}
