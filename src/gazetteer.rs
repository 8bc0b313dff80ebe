//! Curated gazetteer of place names, coordinates and romanized aliases.
//!
//! The built-in list covers the preset cities the matcher and resolver fall
//! back on. A supplementary `cities.json` in the data directory is merged in
//! at startup when present:
//!
//! ```json
//! [{"name": "北京市", "latitude": 39.904, "longitude": 116.407,
//!   "aliases": ["beijing", "bj"]}]
//! ```

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// A place the service can name: gazetteer entry or ad-hoc geocoder result.
#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct PlaceCandidate {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl PartialEq for PlaceCandidate {
    // Equality by name only; coordinates from different sources drift.
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for PlaceCandidate {}

/// A curated gazetteer entry: a place plus its lowercase alias set.
#[derive(Debug, Clone, Deserialize)]
pub struct GazetteerEntry {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl GazetteerEntry {
    pub fn candidate(&self) -> PlaceCandidate {
        PlaceCandidate {
            name: self.name.clone(),
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// Errors that can occur while loading a supplementary gazetteer file.
#[derive(Debug, Error)]
pub enum GazetteerError {
    #[error("IO error reading gazetteer file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Gazetteer JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Number of entries returned by `hot_cities`.
const HOT_CITY_COUNT: usize = 10;

/// Static, read-only place list. Loaded once at startup; shared via `Arc`.
#[derive(Debug)]
pub struct Gazetteer {
    entries: Vec<GazetteerEntry>,
}

impl Gazetteer {
    /// Built-in curated list: major cities first (these become the hot list).
    pub fn builtin() -> Self {
        let mut entries = Vec::new();
        for (name, lat, lon, aliases) in BUILTIN_CITIES {
            entries.push(GazetteerEntry {
                name: (*name).to_string(),
                latitude: *lat,
                longitude: *lon,
                aliases: aliases.iter().map(|a| (*a).to_string()).collect(),
            });
        }
        Self { entries }
    }

    /// Construct from explicit entries (tests, custom deployments).
    pub fn from_entries(entries: Vec<GazetteerEntry>) -> Self {
        Self { entries }
    }

    /// Load `cities.json` from the data directory and merge it after the
    /// built-in list. Entries with empty names are skipped.
    pub fn load_supplementary(&mut self, data_dir: &Path) -> Result<usize, GazetteerError> {
        let path = data_dir.join("cities.json");
        if !path.exists() {
            return Ok(0);
        }
        let raw = std::fs::read_to_string(&path)?;
        let extra: Vec<GazetteerEntry> = serde_json::from_str(&raw)?;
        let mut added = 0;
        for entry in extra {
            if entry.name.trim().is_empty() {
                tracing::warn!("Skipping gazetteer entry with empty name");
                continue;
            }
            if self.entries.iter().any(|e| e.name == entry.name) {
                continue;
            }
            self.entries.push(entry);
            added += 1;
        }
        Ok(added)
    }

    pub fn entries(&self) -> &[GazetteerEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First N curated entries, served for the empty search query.
    pub fn hot_cities(&self) -> Vec<PlaceCandidate> {
        self.entries
            .iter()
            .take(HOT_CITY_COUNT)
            .map(GazetteerEntry::candidate)
            .collect()
    }

    /// Exact-name lookup (after trimming).
    pub fn find_by_name(&self, name: &str) -> Option<&GazetteerEntry> {
        let needle = name.trim();
        self.entries.iter().find(|e| e.name == needle)
    }

    /// Closest known city to a coordinate by great-circle distance.
    pub fn nearest(&self, latitude: f64, longitude: f64) -> Option<&GazetteerEntry> {
        self.entries.iter().min_by(|a, b| {
            let da = crate::helpers::great_circle_km(latitude, longitude, a.latitude, a.longitude);
            let db = crate::helpers::great_circle_km(latitude, longitude, b.latitude, b.longitude);
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        })
    }
}

/// (name, latitude, longitude, aliases)
const BUILTIN_CITIES: &[(&str, f64, f64, &[&str])] = &[
    ("北京市", 39.904, 116.407, &["beijing", "bj", "peking"]),
    ("上海市", 31.230, 121.474, &["shanghai", "sh"]),
    ("广州市", 23.129, 113.264, &["guangzhou", "gz", "canton"]),
    ("深圳市", 22.543, 114.058, &["shenzhen", "sz"]),
    ("杭州市", 30.274, 120.155, &["hangzhou", "hz"]),
    ("南京市", 32.060, 118.797, &["nanjing", "nj"]),
    ("成都市", 30.573, 104.067, &["chengdu", "cd"]),
    ("重庆市", 29.563, 106.551, &["chongqing", "cq"]),
    ("武汉市", 30.593, 114.306, &["wuhan", "wh"]),
    ("西安市", 34.342, 108.940, &["xian", "xi'an", "xa"]),
    ("天津市", 39.085, 117.199, &["tianjin", "tj"]),
    ("苏州市", 31.299, 120.585, &["suzhou"]),
    ("长沙市", 28.228, 112.939, &["changsha", "cs"]),
    ("青岛市", 36.067, 120.383, &["qingdao", "qd", "tsingtao"]),
    ("大连市", 38.914, 121.615, &["dalian", "dl"]),
    ("厦门市", 24.480, 118.089, &["xiamen", "xm", "amoy"]),
    ("昆明市", 24.880, 102.833, &["kunming", "km"]),
    ("哈尔滨市", 45.803, 126.535, &["haerbin", "harbin", "hrb"]),
    ("香港", 22.319, 114.169, &["xianggang", "hongkong", "hong kong", "hk"]),
    ("台北市", 25.033, 121.565, &["taibei", "taipei", "tp"]),
];
