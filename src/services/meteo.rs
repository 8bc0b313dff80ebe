//! Open-Meteo forecast client.
//!
//! Fetches current, hourly and daily weather in one call. Times are
//! requested as unix epochs (`timeformat=unixtime`, `timezone=UTC`) so
//! parsing needs no local-time string handling.
//! See: https://open-meteo.com/en/docs

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

use crate::errors::AppError;

const FORECAST_PATH: &str = "/v1/forecast";

const CURRENT_FIELDS: &str =
    "temperature_2m,relative_humidity_2m,apparent_temperature,weather_code,wind_speed_10m,wind_direction_10m";
const HOURLY_FIELDS: &str = "temperature_2m,weather_code,precipitation_probability,wind_speed_10m";
const DAILY_FIELDS: &str =
    "weather_code,temperature_2m_max,temperature_2m_min,sunrise,sunset,precipitation_sum";

/// Request timeout for forecast calls.
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Client for an Open-Meteo-compatible forecast API.
#[derive(Debug, Clone)]
pub struct MeteoClient {
    client: reqwest::Client,
    base_url: String,
    user_agent: String,
}

/// Current conditions as reported by the provider.
#[derive(Debug, Clone)]
pub struct ProviderCurrent {
    pub time: DateTime<Utc>,
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub apparent_temperature_c: f64,
    pub weather_code: i64,
    pub wind_speed_kmh: f64,
    pub wind_direction_deg: f64,
}

/// One hourly forecast point from the provider's full series.
#[derive(Debug, Clone)]
pub struct ProviderHourlyPoint {
    pub time: DateTime<Utc>,
    pub temperature_c: f64,
    pub weather_code: i64,
    pub precipitation_probability_pct: Option<f64>,
    pub wind_speed_kmh: f64,
}

/// One daily forecast point from the provider's full series.
#[derive(Debug, Clone)]
pub struct ProviderDailyPoint {
    /// Midnight (UTC) of the forecast day.
    pub day_start: DateTime<Utc>,
    pub weather_code: i64,
    pub temperature_max_c: f64,
    pub temperature_min_c: f64,
    pub sunrise: Option<DateTime<Utc>>,
    pub sunset: Option<DateTime<Utc>>,
    pub precipitation_sum_mm: f64,
}

/// A full provider fetch: current conditions plus untruncated series.
#[derive(Debug, Clone)]
pub struct ProviderForecast {
    pub current: ProviderCurrent,
    pub hourly: Vec<ProviderHourlyPoint>,
    pub daily: Vec<ProviderDailyPoint>,
}

// --- Open-Meteo JSON response types ---

#[derive(Debug, Deserialize)]
struct MeteoResponse {
    current: MeteoCurrent,
    hourly: MeteoHourly,
    daily: MeteoDaily,
}

#[derive(Debug, Deserialize)]
struct MeteoCurrent {
    time: i64,
    temperature_2m: Option<f64>,
    relative_humidity_2m: Option<f64>,
    apparent_temperature: Option<f64>,
    weather_code: Option<i64>,
    wind_speed_10m: Option<f64>,
    wind_direction_10m: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct MeteoHourly {
    time: Vec<i64>,
    temperature_2m: Vec<Option<f64>>,
    weather_code: Vec<Option<i64>>,
    #[serde(default)]
    precipitation_probability: Vec<Option<f64>>,
    wind_speed_10m: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct MeteoDaily {
    time: Vec<i64>,
    weather_code: Vec<Option<i64>>,
    temperature_2m_max: Vec<Option<f64>>,
    temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    sunrise: Vec<Option<i64>>,
    #[serde(default)]
    sunset: Vec<Option<i64>>,
    precipitation_sum: Vec<Option<f64>>,
}

fn epoch_to_utc(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

impl MeteoClient {
    pub fn new(base_url: &str, user_agent: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            user_agent: user_agent.to_string(),
        }
    }

    /// Fetch the full forecast for a coordinate. A single failed attempt
    /// surfaces immediately; there is no retry.
    pub async fn fetch(&self, lat: f64, lon: f64) -> Result<ProviderForecast, AppError> {
        let url = format!(
            "{}{}?latitude={:.4}&longitude={:.4}&current={}&hourly={}&daily={}&timeformat=unixtime&timezone=UTC&wind_speed_unit=kmh",
            self.base_url, FORECAST_PATH, lat, lon, CURRENT_FIELDS, HOURLY_FIELDS, DAILY_FIELDS
        );

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(|e| {
                AppError::ProviderUnavailable(format!("weather request failed: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(AppError::ProviderUnavailable(format!(
                "weather provider returned HTTP {}",
                response.status()
            )));
        }

        let body: MeteoResponse = response.json().await.map_err(|e| {
            AppError::ProviderUnavailable(format!("weather JSON parse error: {}", e))
        })?;

        Ok(parse_forecast(body))
    }
}

/// Convert the column-oriented Open-Meteo payload into row-oriented points.
/// Missing optional values default rather than dropping the whole entry.
fn parse_forecast(body: MeteoResponse) -> ProviderForecast {
    let current = ProviderCurrent {
        time: epoch_to_utc(body.current.time),
        temperature_c: body.current.temperature_2m.unwrap_or(0.0),
        humidity_pct: body.current.relative_humidity_2m.unwrap_or(0.0),
        apparent_temperature_c: body
            .current
            .apparent_temperature
            .or(body.current.temperature_2m)
            .unwrap_or(0.0),
        weather_code: body.current.weather_code.unwrap_or(0),
        wind_speed_kmh: body.current.wind_speed_10m.unwrap_or(0.0),
        wind_direction_deg: body.current.wind_direction_10m.unwrap_or(0.0),
    };

    let h = &body.hourly;
    let mut hourly = Vec::with_capacity(h.time.len());
    for (i, &t) in h.time.iter().enumerate() {
        hourly.push(ProviderHourlyPoint {
            time: epoch_to_utc(t),
            temperature_c: h.temperature_2m.get(i).copied().flatten().unwrap_or(0.0),
            weather_code: h.weather_code.get(i).copied().flatten().unwrap_or(0),
            precipitation_probability_pct: h.precipitation_probability.get(i).copied().flatten(),
            wind_speed_kmh: h.wind_speed_10m.get(i).copied().flatten().unwrap_or(0.0),
        });
    }

    let d = &body.daily;
    let mut daily = Vec::with_capacity(d.time.len());
    for (i, &t) in d.time.iter().enumerate() {
        daily.push(ProviderDailyPoint {
            day_start: epoch_to_utc(t),
            weather_code: d.weather_code.get(i).copied().flatten().unwrap_or(0),
            temperature_max_c: d.temperature_2m_max.get(i).copied().flatten().unwrap_or(0.0),
            temperature_min_c: d.temperature_2m_min.get(i).copied().flatten().unwrap_or(0.0),
            sunrise: d.sunrise.get(i).copied().flatten().map(epoch_to_utc),
            sunset: d.sunset.get(i).copied().flatten().map(epoch_to_utc),
            precipitation_sum_mm: d
                .precipitation_sum
                .get(i)
                .copied()
                .flatten()
                .unwrap_or(0.0),
        });
    }

    ProviderForecast {
        current,
        hourly,
        daily,
    }
}
