use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::SqlitePool;
use sqlx::prelude::FromRow;

use crate::errors::AppError;
use crate::models::normalize::generated_at;

/// A display name with how often it was seen.
#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PlayerCount {
    pub name: Option<String>,
    pub name_hash: Option<String>,
    pub game_count: i64,
}

#[derive(Debug, Serialize)]
pub struct PlayerList {
    pub players: Vec<PlayerCount>,
    pub generated_at: String,
}

/// Random players having at least `threshold` games.
pub async fn random_players(
    pool: &SqlitePool,
    threshold: i64,
    limit: i64,
) -> Result<PlayerList, AppError> {
    let players = sqlx::query_as::<_, PlayerCount>(
        "SELECT name, name_hash, COUNT(*) AS game_count
         FROM players GROUP BY name_hash
         HAVING COUNT(*) >= ? ORDER BY RANDOM() LIMIT ?",
    )
    .bind(threshold)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(PlayerList { players, generated_at: generated_at() })
}

/// Names seen for the first time most recently.
pub async fn latest_players(pool: &SqlitePool, limit: i64) -> Result<PlayerList, AppError> {
    let players = sqlx::query_as::<_, PlayerCount>(
        "SELECT name, name_hash, COUNT(*) AS game_count
         FROM players GROUP BY name_hash
         ORDER BY MIN(id) DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(PlayerList { players, generated_at: generated_at() })
}

/// Most active names over the trailing `days` window.
pub async fn active_players(
    pool: &SqlitePool,
    limit: i64,
    days: i64,
) -> Result<PlayerList, AppError> {
    let players = sqlx::query_as::<_, PlayerCount>(
        "SELECT p.name, p.name_hash, COUNT(*) AS game_count
         FROM players p JOIN games g ON p.game_guid = g.game_guid
         WHERE g.game_time >= datetime('now', '-' || ? || ' day')
         GROUP BY p.name_hash
         ORDER BY game_count DESC LIMIT ?",
    )
    .bind(days)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(PlayerList { players, generated_at: generated_at() })
}

/// Names sharing the most lobbies with the given player.
pub async fn close_friends(
    pool: &SqlitePool,
    name_hash: &str,
    limit: i64,
) -> Result<PlayerList, AppError> {
    let players = sqlx::query_as::<_, PlayerCount>(
        "SELECT o.name, o.name_hash, COUNT(*) AS game_count
         FROM players p JOIN players o
           ON p.game_guid = o.game_guid AND o.name_hash != p.name_hash
         WHERE p.name_hash = ?
         GROUP BY o.name_hash
         ORDER BY game_count DESC LIMIT ?",
    )
    .bind(name_hash)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(PlayerList { players, generated_at: generated_at() })
}

/// Substring search over player names.
pub async fn search_name(
    pool: &SqlitePool,
    needle: &str,
    limit: i64,
) -> Result<PlayerList, AppError> {
    let players = sqlx::query_as::<_, PlayerCount>(
        "SELECT name, name_hash, COUNT(*) AS game_count
         FROM players WHERE name LIKE ?
         GROUP BY name_hash ORDER BY game_count DESC LIMIT ?",
    )
    .bind(format!("%{needle}%"))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(PlayerList { players, generated_at: generated_at() })
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PlayerGame {
    pub game_guid: String,
    pub map_name: Option<String>,
    pub matchup: Option<String>,
    pub duration: Option<i64>,
    pub game_time: Option<NaiveDateTime>,
    pub is_winner: Option<bool>,
    pub rating_change: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct PlayerGames {
    pub games: Vec<PlayerGame>,
    pub generated_at: String,
}

/// Latest public games of one player.
pub async fn recent_games(
    pool: &SqlitePool,
    name_hash: &str,
    limit: i64,
) -> Result<PlayerGames, AppError> {
    let games = sqlx::query_as::<_, PlayerGame>(
        "SELECT g.game_guid, g.map_name, g.matchup, g.duration, g.game_time,
                p.is_winner, p.rating_change
         FROM players p JOIN games g ON p.game_guid = g.game_guid
         WHERE p.name_hash = ? AND g.visibility = 0
         ORDER BY g.game_time DESC LIMIT ?",
    )
    .bind(name_hash)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(PlayerGames { games, generated_at: generated_at() })
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PlayerTotals {
    pub total: i64,
    pub wins: i64,
    pub first_seen: Option<NaiveDateTime>,
    pub last_seen: Option<NaiveDateTime>,
}

/// Lifetime counters of one player.
pub async fn totals(pool: &SqlitePool, name_hash: &str) -> Result<PlayerTotals, AppError> {
    let row = sqlx::query_as::<_, PlayerTotals>(
        "SELECT COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN p.is_winner THEN 1 ELSE 0 END), 0) AS wins,
                MIN(g.game_time) AS first_seen,
                MAX(g.game_time) AS last_seen
         FROM players p JOIN games g ON p.game_guid = g.game_guid
         WHERE p.name_hash = ?",
    )
    .bind(name_hash)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seed(pool: &SqlitePool) {
        for (guid, days_ago) in [
            ("00000000000000000000000000000001", 1),
            ("00000000000000000000000000000002", 2),
            ("00000000000000000000000000000003", 60),
        ] {
            sqlx::query(
                "INSERT INTO games (game_guid, duration, game_time)
                 VALUES (?, 1800000, datetime('now', '-' || ? || ' day'))",
            )
            .bind(guid)
            .bind(days_ago)
            .execute(pool)
            .await
            .unwrap();
            for (slot, name, winner) in [(1, "Alpha", true), (2, "Bravo", false)] {
                sqlx::query(
                    "INSERT INTO players (game_guid, slot, name, name_hash, is_winner, is_main_operator)
                     VALUES (?, ?, ?, ?, ?, 1)",
                )
                .bind(guid)
                .bind(slot)
                .bind(name)
                .bind(crate::models::normalize::name_hash(name))
                .bind(winner)
                .execute(pool)
                .await
                .unwrap();
            }
        }
    }

    #[tokio::test]
    async fn totals_and_recent_games() {
        let pool = crate::db::test_pool().await;
        seed(&pool).await;
        let hash = crate::models::normalize::name_hash("Alpha");

        let t = totals(&pool, &hash).await.unwrap();
        assert_eq!(t.total, 3);
        assert_eq!(t.wins, 3);

        let recent = recent_games(&pool, &hash, 2).await.unwrap();
        assert_eq!(recent.games.len(), 2);
        assert_eq!(recent.games[0].game_guid, "00000000000000000000000000000001");
    }

    #[tokio::test]
    async fn active_window_excludes_old_games() {
        let pool = crate::db::test_pool().await;
        seed(&pool).await;
        let list = active_players(&pool, 10, 30).await.unwrap();
        let alpha = list
            .players
            .iter()
            .find(|p| p.name.as_deref() == Some("Alpha"))
            .unwrap();
        assert_eq!(alpha.game_count, 2);
    }

    #[tokio::test]
    async fn friends_are_co_players() {
        let pool = crate::db::test_pool().await;
        seed(&pool).await;
        let hash = crate::models::normalize::name_hash("Alpha");
        let friends = close_friends(&pool, &hash, 10).await.unwrap();
        assert_eq!(friends.players.len(), 1);
        assert_eq!(friends.players[0].name.as_deref(), Some("Bravo"));
        assert_eq!(friends.players[0].game_count, 3);
    }

    #[tokio::test]
    async fn name_search_matches_substring() {
        let pool = crate::db::test_pool().await;
        seed(&pool).await;
        let found = search_name(&pool, "rav", 10).await.unwrap();
        assert_eq!(found.players.len(), 1);
        assert_eq!(found.players[0].name.as_deref(), Some("Bravo"));
    }
}
