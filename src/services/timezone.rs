//! Timezone derivation for a coordinate.
//!
//! Default: the longitude heuristic (`round(lon / 15)` hours). A small set
//! of geographic override boxes is checked first for regions where the
//! heuristic is wrong (Iceland sits at −1 h by longitude but keeps UTC).
//! When an IANA zone's current UTC offset lies within half an hour of the
//! heuristic, that zone is preferred over the raw fixed offset.

use chrono::{DateTime, Duration, NaiveDate, Offset, TimeZone, Utc};
use chrono_tz::Tz;

/// Maximum distance between the heuristic offset and an IANA zone's offset
/// for the zone to be considered a match (half an hour).
const ZONE_MATCH_TOLERANCE_SECS: i32 = 1800;

/// A (lat-range, lon-range) → zone-id override, checked before the generic
/// zone search.
#[derive(Debug, Clone)]
pub struct ZoneOverride {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
    pub zone_id: String,
}

impl ZoneOverride {
    fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.lat_min && lat <= self.lat_max && lon >= self.lon_min && lon <= self.lon_max
    }
}

/// Built-in override boxes. Iceland: high-latitude, negative-longitude
/// island that observes UTC year-round.
pub fn default_overrides() -> Vec<ZoneOverride> {
    vec![ZoneOverride {
        lat_min: 63.0,
        lat_max: 67.0,
        lon_min: -25.0,
        lon_max: -13.0,
        zone_id: "Atlantic/Reykjavik".to_string(),
    }]
}

/// The timezone derived for a coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedTimezone {
    /// IANA zone id when one matched, otherwise a fixed-offset label.
    pub id: String,
    pub offset_seconds: i32,
}

/// Derive the timezone for a coordinate at a given instant.
pub fn derive_timezone(
    lat: f64,
    lon: f64,
    overrides: &[ZoneOverride],
    at: DateTime<Utc>,
) -> DerivedTimezone {
    for ov in overrides {
        if ov.contains(lat, lon) {
            if let Ok(tz) = ov.zone_id.parse::<Tz>() {
                return DerivedTimezone {
                    id: ov.zone_id.clone(),
                    offset_seconds: zone_offset_seconds(tz, at),
                };
            }
            tracing::warn!("Unknown zone id in override: {}", ov.zone_id);
        }
    }

    let heuristic = (lon / 15.0).round() as i32 * 3600;

    for tz in chrono_tz::TZ_VARIANTS {
        let offset = zone_offset_seconds(tz, at);
        if (offset - heuristic).abs() <= ZONE_MATCH_TOLERANCE_SECS {
            return DerivedTimezone {
                id: tz.name().to_string(),
                offset_seconds: offset,
            };
        }
    }

    DerivedTimezone {
        id: fixed_offset_id(heuristic),
        offset_seconds: heuristic,
    }
}

/// A zone's UTC offset in seconds at a given instant.
fn zone_offset_seconds(tz: Tz, at: DateTime<Utc>) -> i32 {
    tz.offset_from_utc_datetime(&at.naive_utc())
        .fix()
        .local_minus_utc()
}

/// Label for a raw offset, e.g. "UTC+08:00".
fn fixed_offset_id(offset_seconds: i32) -> String {
    let sign = if offset_seconds < 0 { '-' } else { '+' };
    let abs = offset_seconds.abs();
    format!("UTC{}{:02}:{:02}", sign, abs / 3600, (abs % 3600) / 60)
}

/// Calendar date at a UTC instant shifted by an offset.
pub fn local_date(at: DateTime<Utc>, offset_seconds: i32) -> NaiveDate {
    (at + Duration::seconds(offset_seconds as i64)).date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 6, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_shanghai_longitude_is_plus_eight() {
        let tz = derive_timezone(31.23, 121.47, &default_overrides(), at());
        assert_eq!(tz.offset_seconds, 8 * 3600);
    }

    #[test]
    fn test_greenwich_is_zero() {
        let tz = derive_timezone(51.48, 0.0, &default_overrides(), at());
        assert_eq!(tz.offset_seconds, 0);
    }

    #[test]
    fn test_new_york_longitude_is_minus_five() {
        // Heuristic gives -5 h; a matching zone without DST (e.g. Bogota)
        // keeps -5 even while New York itself observes -4 in August.
        let tz = derive_timezone(40.71, -74.0, &default_overrides(), at());
        assert_eq!(tz.offset_seconds, -5 * 3600);
    }

    #[test]
    fn test_iceland_override_beats_heuristic() {
        // Reykjavik: longitude says -1 h, the override pins UTC.
        let tz = derive_timezone(64.15, -21.94, &default_overrides(), at());
        assert_eq!(tz.id, "Atlantic/Reykjavik");
        assert_eq!(tz.offset_seconds, 0);
    }

    #[test]
    fn test_no_override_outside_box() {
        // South of the Iceland box; heuristic applies.
        let tz = derive_timezone(50.0, -21.94, &default_overrides(), at());
        assert_ne!(tz.id, "Atlantic/Reykjavik");
        assert_eq!(tz.offset_seconds, -3600);
    }

    #[test]
    fn test_fixed_offset_id_formatting() {
        assert_eq!(fixed_offset_id(8 * 3600), "UTC+08:00");
        assert_eq!(fixed_offset_id(-5 * 3600), "UTC-05:00");
        assert_eq!(fixed_offset_id(5 * 3600 + 1800), "UTC+05:30");
        assert_eq!(fixed_offset_id(0), "UTC+00:00");
    }

    #[test]
    fn test_local_date_crosses_midnight() {
        // 2026-08-06 22:00 UTC is already 08-07 in UTC+8.
        let late = Utc.with_ymd_and_hms(2026, 8, 6, 22, 0, 0).unwrap();
        assert_eq!(
            local_date(late, 8 * 3600),
            NaiveDate::from_ymd_opt(2026, 8, 7).unwrap()
        );
        assert_eq!(
            local_date(late, 0),
            NaiveDate::from_ymd_opt(2026, 8, 6).unwrap()
        );
    }
}
