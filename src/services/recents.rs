//! Recent-selections store.
//!
//! Bounded, ordered, unique-by-name list of user-selected places. The
//! in-memory copy is loaded once at startup; every mutation rewrites the
//! full list to SQLite (write-through). Missing or malformed storage yields
//! an empty list, never an error.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::models::RecentSelectionRow;
use crate::db::queries;
use crate::errors::AppError;
use crate::gazetteer::PlaceCandidate;

/// Maximum retained selections; the tail is evicted beyond this.
const MAX_RECENTS: usize = 50;

/// One remembered selection, most-recent-first in the list.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RecentSelection {
    pub id: Uuid,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub added_at: DateTime<Utc>,
}

/// Serialized-access store; all mutations go through one async mutex.
pub struct RecentStore {
    pool: SqlitePool,
    list: Mutex<Vec<RecentSelection>>,
}

impl RecentStore {
    /// Load the persisted list. Storage problems log a warning and start
    /// from an empty list.
    pub async fn load(pool: SqlitePool) -> Self {
        let list = match queries::load_recents(&pool).await {
            Ok(rows) => rows
                .into_iter()
                .map(|row| RecentSelection {
                    id: Uuid::parse_str(&row.id).unwrap_or_else(|_| Uuid::new_v4()),
                    name: row.name,
                    latitude: row.latitude,
                    longitude: row.longitude,
                    added_at: row.added_at,
                })
                .collect(),
            Err(e) => {
                tracing::warn!("Failed to load recent selections, starting empty: {}", e);
                Vec::new()
            }
        };

        Self {
            pool,
            list: Mutex::new(list),
        }
    }

    /// Current list, most recent first.
    pub async fn list(&self) -> Vec<RecentSelection> {
        self.list.lock().await.clone()
    }

    /// Add a place to the front. Idempotent by name: an existing entry is
    /// moved to the front instead of duplicated.
    pub async fn add(&self, place: PlaceCandidate) -> Result<Vec<RecentSelection>, AppError> {
        let name = place.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::BadRequest("place name must not be empty".to_string()));
        }

        let mut list = self.list.lock().await;

        if let Some(pos) = list.iter().position(|s| s.name == name) {
            let mut existing = list.remove(pos);
            existing.added_at = Utc::now();
            list.insert(0, existing);
        } else {
            list.insert(
                0,
                RecentSelection {
                    id: Uuid::new_v4(),
                    name,
                    latitude: place.latitude,
                    longitude: place.longitude,
                    added_at: Utc::now(),
                },
            );
            list.truncate(MAX_RECENTS);
        }

        self.persist(&list).await?;
        Ok(list.clone())
    }

    /// Remove a selection by name.
    pub async fn remove(&self, name: &str) -> Result<(), AppError> {
        let needle = name.trim();
        let mut list = self.list.lock().await;

        let before = list.len();
        list.retain(|s| s.name != needle);
        if list.len() == before {
            return Err(AppError::NotFound(format!(
                "no recent selection named '{}'",
                needle
            )));
        }

        self.persist(&list).await
    }

    /// Move the entry at `from` to `to` (indices into the current list).
    pub async fn reorder(&self, from: usize, to: usize) -> Result<Vec<RecentSelection>, AppError> {
        let mut list = self.list.lock().await;

        if from >= list.len() || to >= list.len() {
            return Err(AppError::BadRequest(format!(
                "reorder indices out of range (len = {})",
                list.len()
            )));
        }

        let entry = list.remove(from);
        list.insert(to, entry);

        self.persist(&list).await?;
        Ok(list.clone())
    }

    async fn persist(&self, list: &[RecentSelection]) -> Result<(), AppError> {
        let rows: Vec<RecentSelectionRow> = list
            .iter()
            .enumerate()
            .map(|(position, s)| RecentSelectionRow {
                id: s.id.to_string(),
                name: s.name.clone(),
                latitude: s.latitude,
                longitude: s.longitude,
                position: position as i64,
                added_at: s.added_at,
            })
            .collect();

        queries::replace_recents(&self.pool, &rows).await?;
        Ok(())
    }
}
