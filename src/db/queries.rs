use chrono::NaiveDate;
use sqlx::SqlitePool;

use super::models::{RecentSelectionRow, WeatherDayRow};

/// Load the full recents list, most recent first.
pub async fn load_recents(pool: &SqlitePool) -> Result<Vec<RecentSelectionRow>, sqlx::Error> {
    sqlx::query_as::<_, RecentSelectionRow>(
        "SELECT id, name, latitude, longitude, position, added_at
         FROM recent_selections
         ORDER BY position",
    )
    .fetch_all(pool)
    .await
}

/// Rewrite the full recents list in one transaction (write-through).
pub async fn replace_recents(
    pool: &SqlitePool,
    rows: &[RecentSelectionRow],
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM recent_selections")
        .execute(&mut *tx)
        .await?;

    for row in rows {
        sqlx::query(
            "INSERT INTO recent_selections (id, name, latitude, longitude, position, added_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&row.id)
        .bind(&row.name)
        .bind(row.latitude)
        .bind(row.longitude)
        .bind(row.position)
        .bind(row.added_at)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await
}

/// Upsert a city's daily-forecast record for one local day. The last write
/// of the day wins, leaving the day's final entry in place.
pub async fn upsert_day_history(
    pool: &SqlitePool,
    row: &WeatherDayRow,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO weather_day_history
             (city_key, day, weather_code, temperature_max_c, temperature_min_c,
              precipitation_sum_mm, recorded_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (city_key, day) DO UPDATE SET
             weather_code = excluded.weather_code,
             temperature_max_c = excluded.temperature_max_c,
             temperature_min_c = excluded.temperature_min_c,
             precipitation_sum_mm = excluded.precipitation_sum_mm,
             recorded_at = excluded.recorded_at",
    )
    .bind(&row.city_key)
    .bind(row.day)
    .bind(row.weather_code)
    .bind(row.temperature_max_c)
    .bind(row.temperature_min_c)
    .bind(row.precipitation_sum_mm)
    .bind(row.recorded_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch one city's record for one local day, if any.
pub async fn get_day_history(
    pool: &SqlitePool,
    city_key: &str,
    day: NaiveDate,
) -> Result<Option<WeatherDayRow>, sqlx::Error> {
    sqlx::query_as::<_, WeatherDayRow>(
        "SELECT city_key, day, weather_code, temperature_max_c, temperature_min_c,
                precipitation_sum_mm, recorded_at
         FROM weather_day_history
         WHERE city_key = ? AND day = ?",
    )
    .bind(city_key)
    .bind(day)
    .fetch_optional(pool)
    .await
}
