use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::SqlitePool;
use sqlx::prelude::FromRow;

use crate::errors::AppError;
use crate::models::db::{Chat, Game, Player, RecordFile};
use crate::models::normalize::generated_at;

/// Full aggregate of one game for `/game/detail`.
#[derive(Debug, Serialize)]
pub struct GameDetail {
    pub game: Game,
    pub players: Vec<Player>,
    pub files: Vec<RecordFile>,
    pub chats: Vec<Chat>,
    pub generated_at: String,
}

/// Load a game with its players, files and chats. `include_hidden` lets
/// admin lookups see private/unlisted games.
pub async fn game_detail(
    pool: &SqlitePool,
    guid: &str,
    include_hidden: bool,
) -> Result<Option<GameDetail>, AppError> {
    let mut query = String::from("SELECT * FROM games WHERE game_guid = ?");
    if !include_hidden {
        query.push_str(" AND visibility = 0");
    }
    let game = sqlx::query_as::<_, Game>(&query)
        .bind(guid)
        .fetch_optional(pool)
        .await?;
    let Some(game) = game else {
        return Ok(None);
    };

    let players = sqlx::query_as::<_, Player>(
        "SELECT * FROM players WHERE game_guid = ? ORDER BY slot",
    )
    .bind(guid)
    .fetch_all(pool)
    .await?;

    let files = sqlx::query_as::<_, RecordFile>(
        "SELECT * FROM files WHERE game_guid = ? ORDER BY id",
    )
    .bind(guid)
    .fetch_all(pool)
    .await?;

    let chats = sqlx::query_as::<_, Chat>(
        "SELECT * FROM chats WHERE game_guid = ? ORDER BY chat_time",
    )
    .bind(guid)
    .fetch_all(pool)
    .await?;

    Ok(Some(GameDetail { game, players, files, chats, generated_at: generated_at() }))
}

/// Condensed row for game listings.
#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct GameSummary {
    pub game_guid: String,
    pub version_code: Option<String>,
    pub created: NaiveDateTime,
    pub game_time: Option<NaiveDateTime>,
    pub map_name: Option<String>,
    pub matchup: Option<String>,
    pub speed: Option<String>,
    pub duration: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct GameList {
    pub games: Vec<GameSummary>,
    pub generated_at: String,
}

const SUMMARY_COLUMNS: &str =
    "game_guid, version_code, created, game_time, map_name, matchup, speed, duration";

/// Most recently uploaded public games.
pub async fn latest_games(pool: &SqlitePool, limit: i64) -> Result<GameList, AppError> {
    let games = sqlx::query_as::<_, GameSummary>(&format!(
        "SELECT {SUMMARY_COLUMNS} FROM games WHERE visibility = 0
         ORDER BY id DESC LIMIT ?",
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(GameList { games, generated_at: generated_at() })
}

/// Random public games longer than `threshold_minutes`.
pub async fn random_games(
    pool: &SqlitePool,
    threshold_minutes: i64,
    limit: i64,
) -> Result<GameList, AppError> {
    let games = sqlx::query_as::<_, GameSummary>(&format!(
        "SELECT {SUMMARY_COLUMNS} FROM games
         WHERE visibility = 0 AND duration > ?
         ORDER BY RANDOM() LIMIT ?",
    ))
    .bind(threshold_minutes * 60 * 1000)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(GameList { games, generated_at: generated_at() })
}

#[derive(Debug, Serialize, FromRow)]
pub struct OptionCount {
    pub value: Option<String>,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct OptionStats {
    pub speed: Vec<OptionCount>,
    pub victory_type: Vec<OptionCount>,
    pub version_code: Vec<OptionCount>,
    pub matchup: Vec<OptionCount>,
    pub map_size: Vec<OptionCount>,
    pub generated_at: String,
}

async fn count_column(pool: &SqlitePool, column: &str) -> Result<Vec<OptionCount>, AppError> {
    // `column` is one of the fixed names below, never caller input.
    let rows = sqlx::query_as::<_, OptionCount>(&format!(
        "SELECT {column} AS value, COUNT(*) AS count FROM games
         WHERE {column} IS NOT NULL GROUP BY {column} ORDER BY count DESC",
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Distinct values and their frequencies for the search filter dropdowns.
pub async fn option_stats(pool: &SqlitePool) -> Result<OptionStats, AppError> {
    Ok(OptionStats {
        speed: count_column(pool, "speed").await?,
        victory_type: count_column(pool, "victory_type").await?,
        version_code: count_column(pool, "version_code").await?,
        matchup: count_column(pool, "matchup").await?,
        map_size: count_column(pool, "map_size").await?,
        generated_at: generated_at(),
    })
}

/// All md5 digests on file for a game, newest first. Used by reparse.
pub async fn file_md5s(pool: &SqlitePool, guid: &str) -> Result<Vec<String>, AppError> {
    let rows = sqlx::query_scalar::<_, String>(
        "SELECT md5 FROM files WHERE game_guid = ? ORDER BY id DESC",
    )
    .bind(guid)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
