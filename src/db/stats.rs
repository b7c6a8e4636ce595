use serde::Serialize;
use sqlx::SqlitePool;

use crate::db::game::read::latest_games;
use crate::db::player::read::active_players;
use crate::errors::AppError;
use crate::models::normalize::generated_at;

/// Cache key of the aggregate every homepage visitor hits.
pub fn homepage_cache_key(glimit: i64, plimit: i64, pdays: i64) -> String {
    format!("homepage_data_{glimit}_{plimit}_{pdays}")
}

pub const DEFAULT_HOMEPAGE_GLIMIT: i64 = 5;
pub const DEFAULT_HOMEPAGE_PLIMIT: i64 = 30;
pub const DEFAULT_HOMEPAGE_PDAYS: i64 = 30;

/// Build the homepage aggregate: latest games, active players, totals.
pub async fn gen_homepage_data(
    pool: &SqlitePool,
    glimit: i64,
    plimit: i64,
    pdays: i64,
) -> Result<String, AppError> {
    let (latest, active, totals) = tokio::join!(
        latest_games(pool, glimit),
        active_players(pool, plimit, pdays),
        total_stats(pool),
    );
    let body = serde_json::json!({
        "latest_games": latest?.games,
        "active_players": active?.players,
        "total_stats": totals?,
        "generated_at": generated_at(),
    });
    Ok(body.to_string())
}

#[derive(Debug, Serialize)]
pub struct TotalStats {
    pub unique_games: i64,
    pub unique_players: i64,
    pub monthly_games: i64,
    pub generated_at: String,
}

/// Corpus-wide counters for the homepage: distinct games, distinct player
/// names, and games touched in the last 30 days.
pub async fn total_stats(pool: &SqlitePool) -> Result<TotalStats, AppError> {
    let unique_games =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(DISTINCT game_guid) FROM games")
            .fetch_one(pool)
            .await?;
    let unique_players =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(DISTINCT name_hash) FROM players")
            .fetch_one(pool)
            .await?;
    let monthly_games = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(id) FROM games WHERE modified >= datetime('now', '-30 day')",
    )
    .fetch_one(pool)
    .await?;

    Ok(TotalStats {
        unique_games,
        unique_players,
        monthly_games,
        generated_at: generated_at(),
    })
}
