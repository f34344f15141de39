//! Swing repository — all SQL touching the `swings` table lives here.

use chrono::Utc;
use golf_coach_core::images::create_thumbnail;
use golf_coach_core::models::{HistoryContext, NewSwing, SwingHistoryItem, SwingRecord};
use sqlx::types::Json;
use sqlx::SqlitePool;

const SWING_COLUMNS: &str = "id, created_at, images, analysis, summary, rating, positions_analyzed, \
                             club, shot_outcome, focus_area, notes";

pub async fn create_swing(pool: &SqlitePool, swing: &NewSwing) -> Result<SwingRecord, sqlx::Error> {
    let created_at = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO swings
            (created_at, images, analysis, summary, rating, positions_analyzed,
             club, shot_outcome, focus_area, notes)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(created_at)
    .bind(Json(&swing.images))
    .bind(&swing.analysis)
    .bind(&swing.summary)
    .bind(swing.rating)
    .bind(swing.positions_analyzed())
    .bind(&swing.annotations.club)
    .bind(&swing.annotations.shot_outcome)
    .bind(&swing.annotations.focus_area)
    .bind(&swing.annotations.notes)
    .execute(pool)
    .await?;

    let id = result.last_insert_rowid();
    tracing::info!(swing_id = id, "Created swing record");

    get_swing(pool, id).await?.ok_or(sqlx::Error::RowNotFound)
}

pub async fn get_swing(pool: &SqlitePool, id: i64) -> Result<Option<SwingRecord>, sqlx::Error> {
    sqlx::query_as::<_, SwingRecord>(&format!("SELECT {} FROM swings WHERE id = ?", SWING_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Newest first.
pub async fn list_swings(
    pool: &SqlitePool,
    limit: i64,
    offset: i64,
) -> Result<Vec<SwingRecord>, sqlx::Error> {
    sqlx::query_as::<_, SwingRecord>(&format!(
        "SELECT {} FROM swings ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        SWING_COLUMNS
    ))
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn count_swings(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM swings")
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}

/// Returns false when no row had that id.
pub async fn delete_swing(pool: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM swings WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// The `n` most recent swings, summarised for the analysis prompt.
pub async fn recent_history(pool: &SqlitePool, n: i64) -> Result<Vec<HistoryContext>, sqlx::Error> {
    if n <= 0 {
        return Ok(Vec::new());
    }
    sqlx::query_as::<_, HistoryContext>(
        "SELECT created_at, rating, club, shot_outcome, summary FROM swings \
         ORDER BY created_at DESC, id DESC LIMIT ?",
    )
    .bind(n)
    .fetch_all(pool)
    .await
}

/// History projection with a thumbnail of the first analyzed position.
pub fn to_history_item(swing: &SwingRecord, thumbnail_size: u32) -> SwingHistoryItem {
    let thumbnail = swing
        .positions()
        .first()
        .and_then(|p| swing.images.get(p))
        .or_else(|| swing.images.values().next())
        .map(|data| create_thumbnail(data, thumbnail_size, thumbnail_size));

    SwingHistoryItem {
        id: swing.id,
        created_at: swing.created_at,
        summary: swing.summary.clone(),
        rating: swing.rating,
        positions_analyzed: swing.positions_analyzed.clone(),
        thumbnail,
        club: swing.club.clone(),
        shot_outcome: swing.shot_outcome.clone(),
    }
}
