// City Weather API v0.1
use axum::routing::{delete, get, post, put};
use axum::Router;
use sqlx::sqlite::SqlitePoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod config;
mod db;
mod errors;
mod gazetteer;
mod helpers;
mod routes;
mod services;

use config::AppConfig;
use gazetteer::Gazetteer;
use routes::AppState;
use services::geocode::NominatimClient;
use services::matcher::PlaceMatcher;
use services::meteo::MeteoClient;
use services::recents::RecentStore;
use services::refresher::{RefresherState, SharedRefresherState};
use services::resolver::LocationResolver;
use services::timezone::default_overrides;
use services::weather::WeatherService;

/// Maximum number of connections in the database pool.
const DB_POOL_MAX_CONNECTIONS: u32 = 5;

/// City Weather API — OpenAPI specification.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "City Weather API",
        version = "0.1.0",
        description = "City search, location resolution and weather aggregation. \
            Matches free-text queries against a curated gazetteer merged with live \
            geocoder results, resolves coordinates to city names with graceful \
            fallbacks, and serves cached per-city weather snapshots with local \
            day history for yesterday queries.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Health", description = "Service health check"),
        (name = "Search", description = "City search and hot cities"),
        (name = "Resolve", description = "Coordinate-to-city resolution"),
        (name = "Weather", description = "Weather snapshots and history"),
        (name = "Recents", description = "Recent-selections management"),
        (name = "Refresher", description = "Background refresher status"),
    ),
    paths(
        routes::health::health_check,
        routes::search::search_places,
        routes::search::hot_cities,
        routes::resolve::resolve_coordinate,
        routes::weather::get_city_weather,
        routes::weather::get_city_yesterday,
        routes::weather::refresh_cities,
        routes::recents::list_recents,
        routes::recents::add_recent,
        routes::recents::remove_recent,
        routes::recents::reorder_recents,
        routes::refresher::get_refresher_status,
    ),
    components(
        schemas(
            routes::health::HealthResponse,
            gazetteer::PlaceCandidate,
            routes::resolve::ResolveResponse,
            routes::weather::WeatherResponse,
            routes::weather::YesterdayResponse,
            routes::weather::RefreshCity,
            routes::weather::RefreshRequest,
            routes::weather::RefreshAccepted,
            services::weather::WeatherSnapshot,
            services::weather::CurrentConditions,
            services::weather::HourlyPoint,
            services::weather::DailyPoint,
            routes::recents::AddRecentRequest,
            routes::recents::ReorderRequest,
            services::recents::RecentSelection,
            services::refresher::RefresherState,
            services::refresher::CityRefreshStatus,
            errors::ErrorResponse,
        )
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "city_weather_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();

    // The data dir holds the SQLite file and the supplementary gazetteer.
    if let Err(e) = std::fs::create_dir_all(&config.data_dir) {
        tracing::warn!("Failed to create data dir {}: {}", config.data_dir, e);
    }

    // Set up database connection pool
    let pool = SqlitePoolOptions::new()
        .max_connections(DB_POOL_MAX_CONNECTIONS)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Database migrations completed");

    // Gazetteer: built-in list plus optional cities.json from the data dir
    let mut gazetteer = Gazetteer::builtin();
    match gazetteer.load_supplementary(std::path::Path::new(&config.data_dir)) {
        Ok(0) => {}
        Ok(added) => tracing::info!("Loaded {} supplementary gazetteer entries", added),
        Err(e) => tracing::error!(
            "Failed to load supplementary gazetteer from {}: {}",
            config.data_dir,
            e
        ),
    }
    let gazetteer = Arc::new(gazetteer);

    // Provider clients
    let geocoder = NominatimClient::new(
        &config.geocoder_base_url,
        &config.user_agent,
        &config.home_country,
    );
    let meteo = MeteoClient::new(&config.weather_base_url, &config.user_agent);

    // Services — explicitly constructed, injected through AppState
    let matcher = PlaceMatcher::new(gazetteer.clone(), geocoder.clone());
    let resolver = LocationResolver::new(
        geocoder,
        gazetteer.clone(),
        &config.default_city,
        config.resolver_enabled,
    );
    let weather = Arc::new(WeatherService::new(
        meteo,
        pool.clone(),
        default_overrides(),
    ));
    let recents = Arc::new(RecentStore::load(pool.clone()).await);

    let app_state = AppState {
        gazetteer,
        matcher,
        resolver,
        weather: weather.clone(),
        recents: recents.clone(),
    };

    // Create shared refresher state and spawn the background refresher
    let refresher_state: SharedRefresherState = Arc::new(RwLock::new(RefresherState::new()));
    tokio::spawn(services::refresher::run_refresher(
        weather,
        recents,
        refresher_state.clone(),
    ));

    // CORS — expose X-Weather-Stale so browsers can read the staleness marker
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
        ])
        .allow_headers(Any)
        .expose_headers(["X-Weather-Stale"
            .parse::<axum::http::HeaderName>()
            .unwrap()]);

    // Build router
    // API routes use AppState; health uses the pool; refresher status uses
    // its shared state.
    let api_routes = Router::new()
        .route("/api/v1/search", get(routes::search::search_places))
        .route("/api/v1/cities/hot", get(routes::search::hot_cities))
        .route("/api/v1/resolve", get(routes::resolve::resolve_coordinate))
        .route(
            "/api/v1/weather/refresh",
            post(routes::weather::refresh_cities),
        )
        .route(
            "/api/v1/weather/:city/yesterday",
            get(routes::weather::get_city_yesterday),
        )
        .route("/api/v1/weather/:city", get(routes::weather::get_city_weather))
        .route(
            "/api/v1/recents",
            get(routes::recents::list_recents).post(routes::recents::add_recent),
        )
        .route(
            "/api/v1/recents/reorder",
            put(routes::recents::reorder_recents),
        )
        .route(
            "/api/v1/recents/:name",
            delete(routes::recents::remove_recent),
        )
        .with_state(app_state);

    // Health check uses the pool to verify DB connectivity
    let health_routes = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .with_state(pool);

    // Refresher status uses SharedRefresherState
    let refresher_routes = Router::new()
        .route(
            "/api/v1/refresher/status",
            get(routes::refresher::get_refresher_status),
        )
        .with_state(refresher_state);

    let app = Router::new()
        .merge(api_routes)
        .merge(health_routes)
        .merge(refresher_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("API server listening on {}", addr);
    tracing::info!(
        "Swagger UI available at http://localhost:{}/swagger-ui/",
        config.port
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind TCP listener");
    axum::serve(listener, app)
        .await
        .expect("Server terminated unexpectedly");
}
