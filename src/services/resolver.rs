//! Coordinate-to-city resolution.
//!
//! Single-flight: one reverse-geocode request per resolver at a time; a
//! concurrent call is rejected immediately rather than queued. Every
//! `resolve()` invocation delivers exactly one terminal outcome and the
//! resolver always returns to `Idle`, including on timeout and cancellation.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

use crate::errors::AppError;
use crate::gazetteer::Gazetteer;
use crate::helpers::round_coord;
use crate::services::geocode::NominatimClient;

/// Fixed timeout for a single resolution attempt.
const RESOLVE_TIMEOUT_SECS: u64 = 10;

/// Resolver lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverState {
    Idle,
    Requesting,
}

struct Inner {
    state: ResolverState,
    cancel: Option<oneshot::Sender<()>>,
}

/// Resolves a device coordinate to a best-effort city name.
#[derive(Clone)]
pub struct LocationResolver {
    geocoder: NominatimClient,
    gazetteer: Arc<Gazetteer>,
    default_city: String,
    enabled: bool,
    timeout: Duration,
    inner: Arc<Mutex<Inner>>,
}

/// Returns the resolver to `Idle` on every exit path of `resolve()`.
struct IdleGuard(Arc<Mutex<Inner>>);

impl Drop for IdleGuard {
    fn drop(&mut self) {
        let mut inner = self.0.lock();
        inner.state = ResolverState::Idle;
        inner.cancel = None;
    }
}

impl LocationResolver {
    pub fn new(
        geocoder: NominatimClient,
        gazetteer: Arc<Gazetteer>,
        default_city: &str,
        enabled: bool,
    ) -> Self {
        Self {
            geocoder,
            gazetteer,
            default_city: default_city.to_string(),
            enabled,
            timeout: Duration::from_secs(RESOLVE_TIMEOUT_SECS),
            inner: Arc::new(Mutex::new(Inner {
                state: ResolverState::Idle,
                cancel: None,
            })),
        }
    }

    /// Override the resolution timeout (tests).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn state(&self) -> ResolverState {
        self.inner.lock().state
    }

    /// Resolve a coordinate to a city name.
    ///
    /// The coordinate is rounded to 3 decimal degrees before submission so
    /// near-identical points issue identical requests. Reverse-geocode
    /// failures degrade to the nearest known city, then to the default city.
    pub async fn resolve(&self, latitude: f64, longitude: f64) -> Result<String, AppError> {
        if !self.enabled {
            return Err(AppError::PermissionDenied(
                "location resolution is disabled".to_string(),
            ));
        }

        let cancel_rx = {
            let mut inner = self.inner.lock();
            if inner.state == ResolverState::Requesting {
                return Err(AppError::RequestCancelled(
                    "a resolution is already in flight".to_string(),
                ));
            }
            inner.state = ResolverState::Requesting;
            let (tx, rx) = oneshot::channel();
            inner.cancel = Some(tx);
            rx
        };
        let _guard = IdleGuard(self.inner.clone());

        let lat = round_coord(latitude);
        let lon = round_coord(longitude);

        tokio::select! {
            _ = tokio::time::sleep(self.timeout) => {
                tracing::warn!("Resolution for ({}, {}) timed out", lat, lon);
                Err(AppError::Timeout(format!(
                    "reverse geocoding did not answer within {:?}",
                    self.timeout
                )))
            }
            _ = cancel_rx => {
                Err(AppError::RequestCancelled("resolution cancelled".to_string()))
            }
            result = self.geocoder.reverse(lat, lon) => {
                match result {
                    Ok(Some(place)) => Ok(place.name),
                    Ok(None) => Ok(self.fallback_city(lat, lon)),
                    Err(e) => {
                        tracing::warn!(
                            "Reverse geocoding failed for ({}, {}), using nearest-city fallback: {}",
                            lat, lon, e
                        );
                        Ok(self.fallback_city(lat, lon))
                    }
                }
            }
        }
    }

    /// Cancel any in-flight resolution. The pending caller receives
    /// `RequestCancelled`. No-op when the resolver is idle.
    pub fn cleanup(&self) {
        let cancel = {
            let mut inner = self.inner.lock();
            inner.cancel.take()
        };
        if let Some(tx) = cancel {
            // Send fails if the resolve already completed; nothing to do then.
            let _ = tx.send(());
        }
    }

    /// Nearest known city by great-circle distance; hardcoded default when
    /// the gazetteer is empty.
    fn fallback_city(&self, lat: f64, lon: f64) -> String {
        self.gazetteer
            .nearest(lat, lon)
            .map(|e| e.name.clone())
            .unwrap_or_else(|| self.default_city.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn resolver(server_uri: &str, gazetteer: Gazetteer, enabled: bool) -> LocationResolver {
        LocationResolver::new(
            NominatimClient::new(server_uri, "test-agent", "cn"),
            Arc::new(gazetteer),
            "北京市",
            enabled,
        )
    }

    fn shanghai_reverse_body() -> serde_json::Value {
        serde_json::json!({
            "lat": "31.230",
            "lon": "121.474",
            "address": {"city": "上海市", "country_code": "cn"}
        })
    }

    #[tokio::test]
    async fn test_resolve_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/reverse"))
            .respond_with(ResponseTemplate::new(200).set_body_json(shanghai_reverse_body()))
            .mount(&server)
            .await;

        let r = resolver(&server.uri(), Gazetteer::builtin(), true);
        let city = r.resolve(31.23, 121.47).await.unwrap();
        assert_eq!(city, "上海市");
        assert_eq!(r.state(), ResolverState::Idle);
    }

    #[tokio::test]
    async fn test_resolve_rounds_coordinates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/reverse"))
            .and(query_param("lat", "31.235"))
            .and(query_param("lon", "121.474"))
            .respond_with(ResponseTemplate::new(200).set_body_json(shanghai_reverse_body()))
            .expect(1)
            .mount(&server)
            .await;

        let r = resolver(&server.uri(), Gazetteer::builtin(), true);
        let city = r.resolve(31.23456, 121.47389).await.unwrap();
        assert_eq!(city, "上海市");
    }

    #[tokio::test]
    async fn test_resolve_disabled_is_permission_denied() {
        let server = MockServer::start().await;
        let r = resolver(&server.uri(), Gazetteer::builtin(), false);
        let err = r.resolve(31.23, 121.47).await.unwrap_err();
        assert_eq!(err.code(), "permission_denied");
    }

    #[tokio::test]
    async fn test_concurrent_resolve_is_single_flight() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/reverse"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(shanghai_reverse_body())
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let r = resolver(&server.uri(), Gazetteer::builtin(), true);
        let r2 = r.clone();

        let first = tokio::spawn(async move { r2.resolve(31.23, 121.47).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = r.resolve(31.23, 121.47).await;

        assert_eq!(second.unwrap_err().code(), "request_cancelled");
        assert_eq!(first.await.unwrap().unwrap(), "上海市");
        assert_eq!(r.state(), ResolverState::Idle);
    }

    #[tokio::test]
    async fn test_resolve_timeout_returns_to_idle() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/reverse"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(shanghai_reverse_body())
                    .set_delay(Duration::from_secs(30)),
            )
            .mount(&server)
            .await;

        let r = resolver(&server.uri(), Gazetteer::builtin(), true)
            .with_timeout(Duration::from_millis(100));
        let err = r.resolve(31.23, 121.47).await.unwrap_err();
        assert_eq!(err.code(), "timeout");
        assert_eq!(r.state(), ResolverState::Idle);
    }

    #[tokio::test]
    async fn test_resolve_falls_back_to_nearest_city() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/reverse"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let r = resolver(&server.uri(), Gazetteer::builtin(), true);
        // Point near Shanghai; geocoder is down.
        let city = r.resolve(31.3, 121.5).await.unwrap();
        assert_eq!(city, "上海市");
    }

    #[tokio::test]
    async fn test_resolve_falls_back_to_default_city() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/reverse"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let r = resolver(&server.uri(), Gazetteer::from_entries(vec![]), true);
        let city = r.resolve(31.3, 121.5).await.unwrap();
        assert_eq!(city, "北京市");
    }

    #[tokio::test]
    async fn test_cleanup_cancels_in_flight() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/reverse"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(shanghai_reverse_body())
                    .set_delay(Duration::from_secs(30)),
            )
            .mount(&server)
            .await;

        let r = resolver(&server.uri(), Gazetteer::builtin(), true);
        let r2 = r.clone();
        let pending = tokio::spawn(async move { r2.resolve(31.23, 121.47).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        r.cleanup();

        let err = pending.await.unwrap().unwrap_err();
        assert_eq!(err.code(), "request_cancelled");
        assert_eq!(r.state(), ResolverState::Idle);
    }

    #[tokio::test]
    async fn test_cleanup_when_idle_is_noop() {
        let server = MockServer::start().await;
        let r = resolver(&server.uri(), Gazetteer::builtin(), true);
        r.cleanup();
        assert_eq!(r.state(), ResolverState::Idle);
    }

    #[tokio::test]
    async fn test_resolve_usable_again_after_timeout() {
        let server = MockServer::start().await;
        // Slow endpoint on a dedicated path is not possible here; instead the
        // second attempt hits a fresh mock after the first one is consumed.
        Mock::given(method("GET"))
            .and(path("/reverse"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(shanghai_reverse_body())
                    .set_delay(Duration::from_millis(300)),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/reverse"))
            .respond_with(ResponseTemplate::new(200).set_body_json(shanghai_reverse_body()))
            .mount(&server)
            .await;

        let r = resolver(&server.uri(), Gazetteer::builtin(), true)
            .with_timeout(Duration::from_millis(100));

        assert_eq!(
            r.resolve(31.23, 121.47).await.unwrap_err().code(),
            "timeout"
        );
        let city = r.resolve(31.23, 121.47).await.unwrap();
        assert_eq!(city, "上海市");
    }
}
