use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;

/// A persisted recent selection. `position` is the display order
/// (0 = most recent); the full list is rewritten on every mutation.
/// `id` is a UUID stored as text (SQLite has no native UUID type).
#[derive(Debug, Clone, FromRow)]
pub struct RecentSelectionRow {
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub position: i64,
    pub added_at: DateTime<Utc>,
}

/// One city's final daily-forecast entry for one local day.
/// Serves "yesterday" queries; the live provider has no historical data.
#[derive(Debug, Clone, FromRow)]
pub struct WeatherDayRow {
    pub city_key: String,
    pub day: NaiveDate,
    pub weather_code: i64,
    pub temperature_max_c: f64,
    pub temperature_min_c: f64,
    pub precipitation_sum_mm: f64,
    pub recorded_at: DateTime<Utc>,
}
