//! Weather cache & aggregator.
//!
//! One immutable snapshot per normalized city key, replaced wholesale on
//! refresh. Cached reads are synchronous and never touch the network; a
//! failed refresh leaves the previous snapshot servable. Each successful
//! refresh also upserts the city's daily entry into the day-history table,
//! so "yesterday" queries are served locally (the live provider has no
//! historical data).

use chrono::{DateTime, Duration, NaiveDate, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::db::models::WeatherDayRow;
use crate::db::queries;
use crate::errors::AppError;
use crate::gazetteer::PlaceCandidate;
use crate::helpers::normalize_city_key;
use crate::services::meteo::{MeteoClient, ProviderForecast};
use crate::services::timezone::{derive_timezone, local_date, ZoneOverride};

/// Snapshot freshness window: older snapshots are refreshed on read.
const SNAPSHOT_FRESH_SECS: i64 = 30 * 60;

/// Hourly points kept per snapshot.
const MAX_HOURLY_POINTS: usize = 24;

/// Daily points kept per snapshot.
const MAX_DAILY_POINTS: usize = 7;

/// Cache capacity; the oldest-fetched snapshot is evicted beyond this.
const MAX_CACHE_ENTRIES: usize = 256;

/// Hourly entries older than fetched_at minus this are dropped.
const HOURLY_LOOKBACK_SECS: i64 = 3600;

/// Current conditions for one city.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CurrentConditions {
    /// Air temperature in Celsius
    pub temperature_c: f64,
    /// Feels-like temperature in Celsius
    pub apparent_temperature_c: f64,
    /// Relative humidity percentage
    pub humidity_pct: f64,
    /// WMO weather code
    pub weather_code: i64,
    /// Wind speed in km/h
    pub wind_speed_kmh: f64,
    /// Wind direction in degrees (0 = north)
    pub wind_direction_deg: f64,
}

/// One hour of forecast.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HourlyPoint {
    /// Forecast hour (UTC instant)
    pub time: DateTime<Utc>,
    pub temperature_c: f64,
    pub weather_code: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precipitation_probability_pct: Option<f64>,
    pub wind_speed_kmh: f64,
}

/// One day of forecast.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DailyPoint {
    pub date: NaiveDate,
    pub weather_code: i64,
    pub temperature_max_c: f64,
    pub temperature_min_c: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sunrise: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sunset: Option<DateTime<Utc>>,
    pub precipitation_sum_mm: f64,
}

/// Immutable per-city weather bundle. Replaced wholesale on refresh.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WeatherSnapshot {
    pub city_key: String,
    pub fetched_at: DateTime<Utc>,
    /// Derived IANA zone id (or fixed-offset label)
    pub timezone_id: String,
    pub utc_offset_seconds: i32,
    pub current: CurrentConditions,
    /// ≤24 entries, chronological, none older than fetched_at − 1 h
    pub hourly: Vec<HourlyPoint>,
    /// ≤7 entries, chronological
    pub daily: Vec<DailyPoint>,
}

/// Per-city weather cache over the forecast provider.
pub struct WeatherService {
    client: MeteoClient,
    pool: SqlitePool,
    zone_overrides: Vec<ZoneOverride>,
    fresh_window: Duration,
    cache: RwLock<HashMap<String, Arc<WeatherSnapshot>>>,
    /// Per-key mutexes so concurrent refreshes of the same city collapse
    /// into one provider call chain instead of racing.
    refresh_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl WeatherService {
    pub fn new(client: MeteoClient, pool: SqlitePool, zone_overrides: Vec<ZoneOverride>) -> Self {
        Self {
            client,
            pool,
            zone_overrides,
            fresh_window: Duration::seconds(SNAPSHOT_FRESH_SECS),
            cache: RwLock::new(HashMap::new()),
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Override the freshness window (tests).
    pub fn with_fresh_window(mut self, window: Duration) -> Self {
        self.fresh_window = window;
        self
    }

    /// Last-known snapshot for a city. Never blocks, never fetches.
    pub fn get_cached(&self, city: &str) -> Option<Arc<WeatherSnapshot>> {
        let key = normalize_city_key(city);
        self.cache.read().get(&key).cloned()
    }

    fn is_fresh(&self, snapshot: &WeatherSnapshot) -> bool {
        Utc::now() - snapshot.fetched_at < self.fresh_window
    }

    /// Fetch fresh data for a city and replace its cache entry.
    ///
    /// On provider failure the previous snapshot (if any) is left untouched
    /// and still servable via `get_cached`.
    pub async fn refresh(
        &self,
        city: &str,
        lat: f64,
        lon: f64,
    ) -> Result<Arc<WeatherSnapshot>, AppError> {
        let key = normalize_city_key(city);
        if key.is_empty() {
            return Err(AppError::BadRequest("city name must not be empty".to_string()));
        }

        let key_lock = self.lock_for(&key);
        let _serialized = key_lock.lock().await;

        let forecast = self.client.fetch(lat, lon).await?;

        let now = Utc::now();
        let tz = derive_timezone(lat, lon, &self.zone_overrides, now);
        let snapshot = Arc::new(build_snapshot(&key, forecast, &tz.id, tz.offset_seconds, now));

        self.store(snapshot.clone());
        self.record_day_history(&snapshot, now).await;

        Ok(snapshot)
    }

    /// Return a fresh snapshot, refreshing if needed. Serves the stale
    /// snapshot (flagged) when the provider is unreachable.
    pub async fn cached_or_refresh(
        &self,
        city: &str,
        lat: f64,
        lon: f64,
    ) -> Result<(Arc<WeatherSnapshot>, bool), AppError> {
        if let Some(snapshot) = self.get_cached(city) {
            if self.is_fresh(&snapshot) {
                return Ok((snapshot, false));
            }
        }

        match self.refresh(city, lat, lon).await {
            Ok(snapshot) => Ok((snapshot, false)),
            Err(e) => {
                if let Some(stale) = self.get_cached(city) {
                    tracing::warn!("Weather provider unavailable, serving stale data: {}", e);
                    Ok((stale, true))
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Fire-and-forget batch refresh. Each city runs independently; one
    /// failure neither blocks nor fails the others.
    pub fn refresh_many(self: Arc<Self>, places: Vec<PlaceCandidate>) {
        for place in places {
            let service = self.clone();
            tokio::spawn(async move {
                if let Err(e) = service
                    .refresh(&place.name, place.latitude, place.longitude)
                    .await
                {
                    tracing::warn!("Batch refresh failed for '{}': {}", place.name, e);
                }
            });
        }
    }

    /// Yesterday's final daily entry for a city, from local history only.
    /// `NotFound` when no record exists — never fabricated.
    pub async fn yesterday(&self, city: &str) -> Result<WeatherDayRow, AppError> {
        let key = normalize_city_key(city);
        let offset = self
            .get_cached(city)
            .map(|s| s.utc_offset_seconds)
            .unwrap_or(0);
        let day = local_date(Utc::now(), offset) - Duration::days(1);

        queries::get_day_history(&self.pool, &key, day)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("no weather history for '{}' on {}", key, day))
            })
    }

    fn lock_for(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.refresh_locks.lock();
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Insert a snapshot, evicting the oldest-fetched entry at capacity.
    fn store(&self, snapshot: Arc<WeatherSnapshot>) {
        let mut cache = self.cache.write();
        if !cache.contains_key(&snapshot.city_key) && cache.len() >= MAX_CACHE_ENTRIES {
            if let Some(oldest) = cache
                .values()
                .min_by_key(|s| s.fetched_at)
                .map(|s| s.city_key.clone())
            {
                tracing::debug!("Cache at capacity, evicting '{}'", oldest);
                cache.remove(&oldest);
            }
        }
        cache.insert(snapshot.city_key.clone(), snapshot);
    }

    /// Upsert today's daily entry; the last refresh of a local day leaves
    /// that day's final record. History failures are logged, not fatal.
    async fn record_day_history(&self, snapshot: &WeatherSnapshot, now: DateTime<Utc>) {
        let today = local_date(now, snapshot.utc_offset_seconds);
        let point = snapshot
            .daily
            .iter()
            .find(|d| d.date == today)
            .or_else(|| snapshot.daily.first());

        let Some(point) = point else {
            return;
        };

        let row = WeatherDayRow {
            city_key: snapshot.city_key.clone(),
            day: point.date,
            weather_code: point.weather_code,
            temperature_max_c: point.temperature_max_c,
            temperature_min_c: point.temperature_min_c,
            precipitation_sum_mm: point.precipitation_sum_mm,
            recorded_at: now,
        };

        if let Err(e) = queries::upsert_day_history(&self.pool, &row).await {
            tracing::warn!(
                "Failed to record day history for '{}': {}",
                snapshot.city_key,
                e
            );
        }
    }
}

/// Derive the bounded snapshot from a full provider forecast.
fn build_snapshot(
    city_key: &str,
    forecast: ProviderForecast,
    timezone_id: &str,
    utc_offset_seconds: i32,
    fetched_at: DateTime<Utc>,
) -> WeatherSnapshot {
    let cutoff = fetched_at - Duration::seconds(HOURLY_LOOKBACK_SECS);

    let hourly: Vec<HourlyPoint> = forecast
        .hourly
        .into_iter()
        .filter(|p| p.time >= cutoff)
        .take(MAX_HOURLY_POINTS)
        .map(|p| HourlyPoint {
            time: p.time,
            temperature_c: p.temperature_c,
            weather_code: p.weather_code,
            precipitation_probability_pct: p.precipitation_probability_pct,
            wind_speed_kmh: p.wind_speed_kmh,
        })
        .collect();

    let daily: Vec<DailyPoint> = forecast
        .daily
        .into_iter()
        .take(MAX_DAILY_POINTS)
        .map(|d| DailyPoint {
            date: d.day_start.date_naive(),
            weather_code: d.weather_code,
            temperature_max_c: d.temperature_max_c,
            temperature_min_c: d.temperature_min_c,
            sunrise: d.sunrise,
            sunset: d.sunset,
            precipitation_sum_mm: d.precipitation_sum_mm,
        })
        .collect();

    WeatherSnapshot {
        city_key: city_key.to_string(),
        fetched_at,
        timezone_id: timezone_id.to_string(),
        utc_offset_seconds,
        current: CurrentConditions {
            temperature_c: forecast.current.temperature_c,
            apparent_temperature_c: forecast.current.apparent_temperature_c,
            humidity_pct: forecast.current.humidity_pct,
            weather_code: forecast.current.weather_code,
            wind_speed_kmh: forecast.current.wind_speed_kmh,
            wind_direction_deg: forecast.current.wind_direction_deg,
        },
        hourly,
        daily,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::queries::test_support::memory_pool;
    use crate::services::meteo::test_support::forecast_body;
    use crate::services::timezone::default_overrides;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn service(server_uri: &str) -> Arc<WeatherService> {
        Arc::new(WeatherService::new(
            MeteoClient::new(server_uri, "test-agent"),
            memory_pool().await,
            default_overrides(),
        ))
    }

    /// Epoch of the current hour's start.
    fn this_hour_epoch() -> i64 {
        let now = Utc::now().timestamp();
        now - now % 3600
    }

    async fn mount_forecast(server: &MockServer, hours: usize, days: usize) {
        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(forecast_body(this_hour_epoch(), hours, days)),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_refresh_truncates_hourly_to_24() {
        let server = MockServer::start().await;
        mount_forecast(&server, 30, 7).await;

        let svc = service(&server.uri()).await;
        let snapshot = svc.refresh("上海市", 31.23, 121.47).await.unwrap();

        assert_eq!(snapshot.hourly.len(), 24);
        for pair in snapshot.hourly.windows(2) {
            assert!(pair[0].time < pair[1].time, "hourly must stay chronological");
        }
    }

    #[tokio::test]
    async fn test_refresh_truncates_daily_to_7() {
        let server = MockServer::start().await;
        mount_forecast(&server, 24, 10).await;

        let svc = service(&server.uri()).await;
        let snapshot = svc.refresh("上海市", 31.23, 121.47).await.unwrap();
        assert_eq!(snapshot.daily.len(), 7);
    }

    #[tokio::test]
    async fn test_refresh_drops_hours_before_lookback() {
        let server = MockServer::start().await;
        // Series starts 6 h in the past; only entries within the last hour
        // (and the future) survive.
        let start = this_hour_epoch() - 6 * 3600;
        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body(start, 30, 7)))
            .mount(&server)
            .await;

        let svc = service(&server.uri()).await;
        let snapshot = svc.refresh("上海市", 31.23, 121.47).await.unwrap();

        assert_eq!(snapshot.hourly.len(), 24);
        let cutoff = snapshot.fetched_at - Duration::seconds(HOURLY_LOOKBACK_SECS);
        assert!(snapshot.hourly[0].time >= cutoff);
    }

    #[tokio::test]
    async fn test_snapshot_timezone_for_shanghai() {
        let server = MockServer::start().await;
        mount_forecast(&server, 24, 7).await;

        let svc = service(&server.uri()).await;
        let snapshot = svc.refresh("上海市", 31.23, 121.47).await.unwrap();
        assert_eq!(snapshot.utc_offset_seconds, 8 * 3600);
    }

    #[tokio::test]
    async fn test_get_cached_never_fetches() {
        let server = MockServer::start().await;
        let svc = service(&server.uri()).await;
        assert!(svc.get_cached("上海市").is_none());
        assert_eq!(server.received_requests().await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_cache_key_is_normalized() {
        let server = MockServer::start().await;
        mount_forecast(&server, 24, 7).await;

        let svc = service(&server.uri()).await;
        svc.refresh("  Shanghai ", 31.23, 121.47).await.unwrap();
        assert!(svc.get_cached("shanghai").is_some());
        assert!(svc.get_cached("SHANGHAI ").is_some());
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_stale_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(forecast_body(this_hour_epoch(), 24, 7)),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let svc = service(&server.uri()).await;
        let first = svc.refresh("上海市", 31.23, 121.47).await.unwrap();

        let err = svc.refresh("上海市", 31.23, 121.47).await.unwrap_err();
        assert_eq!(err.code(), "provider_unavailable");

        let cached = svc.get_cached("上海市").unwrap();
        assert_eq!(cached.fetched_at, first.fetched_at);
    }

    #[tokio::test]
    async fn test_cached_or_refresh_serves_stale_when_provider_down() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(forecast_body(this_hour_epoch(), 24, 7)),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let svc = Arc::new(
            WeatherService::new(
                MeteoClient::new(&server.uri(), "test-agent"),
                memory_pool().await,
                default_overrides(),
            )
            // Zero freshness: every read triggers a refresh attempt.
            .with_fresh_window(Duration::seconds(0)),
        );

        svc.refresh("上海市", 31.23, 121.47).await.unwrap();
        let (snapshot, stale) = svc.cached_or_refresh("上海市", 31.23, 121.47).await.unwrap();
        assert!(stale);
        assert_eq!(snapshot.city_key, "上海市");
    }

    #[tokio::test]
    async fn test_cached_or_refresh_fresh_hit_skips_provider() {
        let server = MockServer::start().await;
        mount_forecast(&server, 24, 7).await;

        let svc = service(&server.uri()).await;
        svc.refresh("上海市", 31.23, 121.47).await.unwrap();
        let before = server.received_requests().await.unwrap().len();

        let (_, stale) = svc.cached_or_refresh("上海市", 31.23, 121.47).await.unwrap();
        assert!(!stale);
        assert_eq!(server.received_requests().await.unwrap().len(), before);
    }

    #[tokio::test]
    async fn test_refresh_records_day_history() {
        let server = MockServer::start().await;
        mount_forecast(&server, 24, 7).await;

        let svc = service(&server.uri()).await;
        let snapshot = svc.refresh("上海市", 31.23, 121.47).await.unwrap();

        let today = local_date(Utc::now(), snapshot.utc_offset_seconds);
        // The recorded row is for today or the series' first day.
        let day = snapshot
            .daily
            .iter()
            .find(|d| d.date == today)
            .map(|d| d.date)
            .unwrap_or(snapshot.daily[0].date);
        let row = queries::get_day_history(&svc.pool, "上海市", day)
            .await
            .unwrap();
        assert!(row.is_some());
    }

    #[tokio::test]
    async fn test_yesterday_absent_is_not_found() {
        let server = MockServer::start().await;
        let svc = service(&server.uri()).await;
        let err = svc.yesterday("上海市").await.unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[tokio::test]
    async fn test_yesterday_served_from_history() {
        let server = MockServer::start().await;
        let svc = service(&server.uri()).await;

        let day = local_date(Utc::now(), 0) - Duration::days(1);
        let row = WeatherDayRow {
            city_key: "上海市".to_string(),
            day,
            weather_code: 61,
            temperature_max_c: 31.0,
            temperature_min_c: 26.0,
            precipitation_sum_mm: 12.5,
            recorded_at: Utc::now(),
        };
        queries::upsert_day_history(&svc.pool, &row).await.unwrap();

        let loaded = svc.yesterday("上海市").await.unwrap();
        assert_eq!(loaded.weather_code, 61);
        assert_eq!(loaded.day, day);
    }

    #[tokio::test]
    async fn test_refresh_many_is_independent() {
        let server = MockServer::start().await;
        // One doomed coordinate; everything else succeeds.
        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .and(query_param("latitude", "99.0000"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        mount_forecast(&server, 24, 7).await;

        let svc = service(&server.uri()).await;
        svc.clone().refresh_many(vec![
            PlaceCandidate {
                name: "上海市".into(),
                latitude: 31.23,
                longitude: 121.47,
            },
            PlaceCandidate {
                name: "broken".into(),
                latitude: 99.0,
                longitude: 0.0,
            },
            PlaceCandidate {
                name: "北京市".into(),
                latitude: 39.90,
                longitude: 116.40,
            },
        ]);

        // Poll until the two good cities land (bounded wait).
        for _ in 0..100 {
            if svc.get_cached("上海市").is_some() && svc.get_cached("北京市").is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(svc.get_cached("上海市").is_some());
        assert!(svc.get_cached("北京市").is_some());
        assert!(svc.get_cached("broken").is_none());
    }

    #[tokio::test]
    async fn test_empty_city_key_is_bad_request() {
        let server = MockServer::start().await;
        let svc = service(&server.uri()).await;
        let err = svc.refresh("   ", 31.23, 121.47).await.unwrap_err();
        assert_eq!(err.code(), "bad_request");
    }
}
