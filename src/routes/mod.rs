use std::sync::Arc;

use crate::gazetteer::Gazetteer;
use crate::services::matcher::PlaceMatcher;
use crate::services::recents::RecentStore;
use crate::services::resolver::LocationResolver;
use crate::services::weather::WeatherService;

pub mod health;
pub mod recents;
pub mod refresher;
pub mod resolve;
pub mod search;
pub mod weather;

/// Shared application state. Every service is an explicitly constructed
/// object injected here; none of them is a global.
#[derive(Clone)]
pub struct AppState {
    pub gazetteer: Arc<Gazetteer>,
    pub matcher: PlaceMatcher,
    pub resolver: LocationResolver,
    pub weather: Arc<WeatherService>,
    pub recents: Arc<RecentStore>,
}
