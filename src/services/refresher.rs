//! Background weather refresher.
//!
//! Periodically refreshes every city in the recent-selections store so the
//! day-history table captures each day's final daily entry even when no
//! user traffic arrives. State is in-memory (`Arc<RwLock<RefresherState>>`)
//! and exposed via the status endpoint.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use utoipa::ToSchema;

use crate::services::recents::RecentStore;
use crate::services::weather::WeatherService;

/// Seconds between refresh cycles.
const REFRESH_INTERVAL_SECS: u64 = 1800;

/// Sleep when the recents list is empty (nothing to refresh).
const NO_CITIES_SLEEP_SECS: u64 = 3600;

/// Outcome of one city's refresh in the last cycle.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CityRefreshStatus {
    pub name: String,
    /// "ok" or "error: <message>"
    pub last_result: String,
    pub refreshed_at: DateTime<Utc>,
}

/// Global refresher state, exposed via the status endpoint.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RefresherState {
    pub active: bool,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_completed_at: Option<DateTime<Utc>>,
    pub last_run_duration_ms: Option<u64>,
    pub total_runs: u64,
    pub cities: Vec<CityRefreshStatus>,
}

impl RefresherState {
    pub fn new() -> Self {
        Self {
            active: true,
            next_run_at: None,
            last_run_completed_at: None,
            last_run_duration_ms: None,
            total_runs: 0,
            cities: Vec::new(),
        }
    }
}

/// Shared refresher state handle.
pub type SharedRefresherState = Arc<RwLock<RefresherState>>;

/// Run the background refresher. Never returns; spawn via `tokio::spawn`.
pub async fn run_refresher(
    weather: Arc<WeatherService>,
    recents: Arc<RecentStore>,
    state: SharedRefresherState,
) {
    tracing::info!("Background refresher started");

    loop {
        let run_start = Utc::now();
        let statuses = run_cycle(&weather, &recents).await;

        let sleep_secs = if statuses.is_empty() {
            tracing::debug!(
                "Refresher: no recent cities, sleeping {} seconds",
                NO_CITIES_SLEEP_SECS
            );
            NO_CITIES_SLEEP_SECS
        } else {
            REFRESH_INTERVAL_SECS
        };

        let run_duration_ms = (Utc::now() - run_start).num_milliseconds().max(0) as u64;
        {
            let mut s = state.write().await;
            s.cities = statuses;
            s.last_run_completed_at = Some(Utc::now());
            s.last_run_duration_ms = Some(run_duration_ms);
            s.next_run_at = Some(Utc::now() + Duration::seconds(sleep_secs as i64));
            s.total_runs += 1;
        }

        tracing::info!(
            "Refresher: cycle complete in {}ms, sleeping {}s",
            run_duration_ms,
            sleep_secs
        );

        tokio::time::sleep(std::time::Duration::from_secs(sleep_secs)).await;
    }
}

/// Refresh every recent city once, concurrently. One city's failure never
/// blocks the others.
pub async fn run_cycle(
    weather: &Arc<WeatherService>,
    recents: &Arc<RecentStore>,
) -> Vec<CityRefreshStatus> {
    let selections = recents.list().await;
    if selections.is_empty() {
        return Vec::new();
    }

    let futures: Vec<_> = selections
        .iter()
        .map(|s| {
            let weather = weather.clone();
            let name = s.name.clone();
            let (lat, lon) = (s.latitude, s.longitude);
            async move {
                let result = weather.refresh(&name, lat, lon).await;
                CityRefreshStatus {
                    name,
                    last_result: match result {
                        Ok(_) => "ok".to_string(),
                        Err(e) => format!("error: {}", e),
                    },
                    refreshed_at: Utc::now(),
                }
            }
        })
        .collect();

    futures::future::join_all(futures).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::queries::test_support::memory_pool;
    use crate::gazetteer::PlaceCandidate;
    use crate::services::meteo::test_support::forecast_body;
    use crate::services::meteo::MeteoClient;
    use crate::services::recents::RecentStore;
    use crate::services::timezone::default_overrides;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_cycle_refreshes_all_recent_cities() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(forecast_body(Utc::now().timestamp(), 24, 7)),
            )
            .mount(&server)
            .await;

        let pool = memory_pool().await;
        let weather = Arc::new(WeatherService::new(
            MeteoClient::new(&server.uri(), "test-agent"),
            pool.clone(),
            default_overrides(),
        ));
        let recents = Arc::new(RecentStore::load(pool).await);
        recents
            .add(PlaceCandidate {
                name: "上海市".into(),
                latitude: 31.23,
                longitude: 121.47,
            })
            .await
            .unwrap();
        recents
            .add(PlaceCandidate {
                name: "北京市".into(),
                latitude: 39.90,
                longitude: 116.40,
            })
            .await
            .unwrap();

        let statuses = run_cycle(&weather, &recents).await;

        assert_eq!(statuses.len(), 2);
        assert!(statuses.iter().all(|s| s.last_result == "ok"));
        assert!(weather.get_cached("上海市").is_some());
        assert!(weather.get_cached("北京市").is_some());
    }

    #[tokio::test]
    async fn test_cycle_empty_recents_is_noop() {
        let server = MockServer::start().await;
        let pool = memory_pool().await;
        let weather = Arc::new(WeatherService::new(
            MeteoClient::new(&server.uri(), "test-agent"),
            pool.clone(),
            default_overrides(),
        ));
        let recents = Arc::new(RecentStore::load(pool).await);

        let statuses = run_cycle(&weather, &recents).await;
        assert!(statuses.is_empty());
        assert_eq!(server.received_requests().await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_cycle_failure_does_not_block_others() {
        let server = MockServer::start().await;
        use wiremock::matchers::query_param;
        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .and(query_param("latitude", "99.0000"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(forecast_body(Utc::now().timestamp(), 24, 7)),
            )
            .mount(&server)
            .await;

        let pool = memory_pool().await;
        let weather = Arc::new(WeatherService::new(
            MeteoClient::new(&server.uri(), "test-agent"),
            pool.clone(),
            default_overrides(),
        ));
        let recents = Arc::new(RecentStore::load(pool).await);
        recents
            .add(PlaceCandidate {
                name: "broken".into(),
                latitude: 99.0,
                longitude: 0.0,
            })
            .await
            .unwrap();
        recents
            .add(PlaceCandidate {
                name: "上海市".into(),
                latitude: 31.23,
                longitude: 121.47,
            })
            .await
            .unwrap();

        let statuses = run_cycle(&weather, &recents).await;

        assert_eq!(statuses.len(), 2);
        let broken = statuses.iter().find(|s| s.name == "broken").unwrap();
        assert!(broken.last_result.starts_with("error"));
        assert!(weather.get_cached("上海市").is_some());
    }
}
