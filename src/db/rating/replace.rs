use chrono::NaiveDateTime;
use sqlx::SqlitePool;

use crate::errors::AppError;

/// One fully aggregated standing, ready for bulk insert.
#[derive(Debug, Clone)]
pub struct RatingUpsert {
    pub name: String,
    pub name_hash: String,
    pub version_code: String,
    pub matchup: String,
    pub rating: i64,
    pub wins: i64,
    pub total: i64,
    pub streak: i64,
    pub streak_max: i64,
    pub highest: i64,
    pub lowest: i64,
    pub first_played: NaiveDateTime,
    pub last_played: NaiveDateTime,
}

/// Flush buffered per-player rating deltas back onto the `players` rows.
pub async fn update_rating_changes(
    pool: &SqlitePool,
    changes: &[(i64, i64)],
) -> Result<(), AppError> {
    if changes.is_empty() {
        return Ok(());
    }
    let mut tx = pool.begin().await?;
    for (player_id, delta) in changes {
        sqlx::query("UPDATE players SET rating_change = ? WHERE id = ?")
            .bind(delta)
            .bind(player_id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Throw away the whole ratings table and insert the fresh aggregation.
///
/// The identity sequence is reset so ladder ids stay small; a database
/// without the sqlite_sequence bookkeeping table is fine.
pub async fn replace_all(pool: &SqlitePool, rows: &[RatingUpsert]) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM ratings").execute(&mut *tx).await?;
    if let Err(e) = sqlx::query("UPDATE sqlite_sequence SET seq = 0 WHERE name = 'ratings'")
        .execute(&mut *tx)
        .await
    {
        tracing::debug!("sqlite_sequence reset skipped: {}", e);
    }

    for row in rows {
        sqlx::query(
            "INSERT INTO ratings (
                name, name_hash, version_code, matchup, rating, wins, total,
                streak, streak_max, highest, lowest, first_played, last_played
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&row.name)
        .bind(&row.name_hash)
        .bind(&row.version_code)
        .bind(&row.matchup)
        .bind(row.rating)
        .bind(row.wins)
        .bind(row.total)
        .bind(row.streak)
        .bind(row.streak_max)
        .bind(row.highest)
        .bind(row.lowest)
        .bind(row.first_played)
        .bind(row.last_played)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    tracing::info!("Ratings table replaced with {} rows", rows.len());
    Ok(())
}
