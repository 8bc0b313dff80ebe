/// Application configuration, parsed from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    /// Base URL of the Nominatim-compatible geocoding service.
    pub geocoder_base_url: String,
    /// Base URL of the Open-Meteo-compatible weather service.
    pub weather_base_url: String,
    /// User-Agent sent to both providers (Nominatim requires one).
    pub user_agent: String,
    pub port: u16,
    /// Directory containing an optional supplementary gazetteer (cities.json).
    pub data_dir: String,
    /// ISO 3166-1 alpha-2 code of the home country for geocoder naming.
    pub home_country: String,
    /// City name returned when every resolution fallback is exhausted.
    pub default_city: String,
    /// Whether the location resolver may run at all.
    pub resolver_enabled: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://data/weather.db?mode=rwc".to_string()),
            geocoder_base_url: std::env::var("GEOCODER_BASE_URL")
                .unwrap_or_else(|_| "https://nominatim.openstreetmap.org".to_string()),
            weather_base_url: std::env::var("WEATHER_BASE_URL")
                .unwrap_or_else(|_| "https://api.open-meteo.com".to_string()),
            user_agent: std::env::var("PROVIDER_USER_AGENT")
                .unwrap_or_else(|_| "CityWeather/0.1 city-weather-api".to_string()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .expect("PORT must be a valid u16"),
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
            home_country: std::env::var("HOME_COUNTRY")
                .unwrap_or_else(|_| "cn".to_string())
                .to_lowercase(),
            default_city: std::env::var("DEFAULT_CITY").unwrap_or_else(|_| "北京市".to_string()),
            resolver_enabled: std::env::var("RESOLVER_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
        }
    }
}
