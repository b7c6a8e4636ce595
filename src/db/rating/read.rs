use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::SqlitePool;
use sqlx::prelude::FromRow;

use crate::errors::AppError;
use crate::models::dto::Pagination;
use crate::models::normalize::generated_at;

/// Coarsen a matchup label into the rating partitions: "1v1" or "team".
pub fn partition_of(matchup: &str) -> &'static str {
    if matchup.eq_ignore_ascii_case("1v1") { "1v1" } else { "team" }
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RatingRow {
    pub rownum: i64,
    pub name: Option<String>,
    pub name_hash: Option<String>,
    pub rating: Option<i64>,
    pub total: Option<i64>,
    pub wins: Option<i64>,
    pub streak: Option<i64>,
    pub streak_max: Option<i64>,
    pub highest: Option<i64>,
    pub lowest: Option<i64>,
    pub first_played: Option<NaiveDateTime>,
    pub last_played: Option<NaiveDateTime>,
}

#[derive(Debug, Serialize)]
pub struct RatingTable {
    pub ratings: Vec<RatingRow>,
    pub version_code: String,
    pub matchup: String,
    pub page: i64,
    pub page_size: i64,
    pub generated_at: String,
}

/// One page of the ladder for a (version, partition) pair.
pub async fn rating_table(
    pool: &SqlitePool,
    version_code: &str,
    matchup: &str,
    desc: bool,
    pagination: Pagination,
) -> Result<RatingTable, AppError> {
    let partition = partition_of(matchup);
    let page = pagination.page.max(1);
    let page_size = pagination.page_size.max(1);
    let direction = if desc { "DESC" } else { "ASC" };

    let ratings = sqlx::query_as::<_, RatingRow>(&format!(
        "SELECT ROW_NUMBER() OVER (ORDER BY rating {direction}) AS rownum,
                name, name_hash, rating, total, wins, streak, streak_max,
                highest, lowest, first_played, last_played
         FROM ratings
         WHERE version_code = ? AND matchup = ?
         ORDER BY rating {direction}
         LIMIT ? OFFSET ?",
    ))
    .bind(version_code)
    .bind(partition)
    .bind(page_size)
    .bind((page - 1) * page_size)
    .fetch_all(pool)
    .await?;

    Ok(RatingTable {
        ratings,
        version_code: version_code.to_string(),
        matchup: partition.to_string(),
        page,
        page_size,
        generated_at: generated_at(),
    })
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PartitionCount {
    pub version_code: Option<String>,
    pub matchup: Option<String>,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct RatingStats {
    pub partitions: Vec<PartitionCount>,
    pub generated_at: String,
}

/// Player counts per (version, partition): the rating metadata endpoint.
pub async fn rating_stats(pool: &SqlitePool) -> Result<RatingStats, AppError> {
    let partitions = sqlx::query_as::<_, PartitionCount>(
        "SELECT version_code, matchup, COUNT(*) AS count
         FROM ratings GROUP BY version_code, matchup
         ORDER BY count DESC",
    )
    .fetch_all(pool)
    .await?;
    Ok(RatingStats { partitions, generated_at: generated_at() })
}

#[derive(Debug, Serialize)]
pub struct PlayerPage {
    pub page: i64,
    pub rank: i64,
    pub page_size: i64,
    pub generated_at: String,
}

/// Which ladder page a player lands on, by rating rank within the partition.
pub async fn player_page(
    pool: &SqlitePool,
    name_hash: &str,
    version_code: &str,
    matchup: &str,
    page_size: i64,
) -> Result<Option<PlayerPage>, AppError> {
    let partition = partition_of(matchup);
    let page_size = page_size.max(1);

    let own: Option<i64> = sqlx::query_scalar(
        "SELECT rating FROM ratings
         WHERE name_hash = ? AND version_code = ? AND matchup = ?",
    )
    .bind(name_hash)
    .bind(version_code)
    .bind(partition)
    .fetch_optional(pool)
    .await?;
    let Some(own) = own else {
        return Ok(None);
    };

    let above: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM ratings
         WHERE version_code = ? AND matchup = ? AND rating > ?",
    )
    .bind(version_code)
    .bind(partition)
    .bind(own)
    .fetch_one(pool)
    .await?;

    let rank = above + 1;
    Ok(Some(PlayerPage {
        page: (rank - 1) / page_size + 1,
        rank,
        page_size,
        generated_at: generated_at(),
    }))
}

/// A player's standing in every partition they appear in.
pub async fn player_ratings(
    pool: &SqlitePool,
    name_hash: &str,
) -> Result<Vec<crate::models::db::Rating>, AppError> {
    let rows = sqlx::query_as::<_, crate::models::db::Rating>(
        "SELECT * FROM ratings WHERE name_hash = ? ORDER BY version_code, matchup",
    )
    .bind(name_hash)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Substring search over rated names within one partition.
pub async fn search_name(
    pool: &SqlitePool,
    needle: &str,
    version_code: &str,
    matchup: &str,
    limit: i64,
) -> Result<Vec<crate::models::db::Rating>, AppError> {
    let rows = sqlx::query_as::<_, crate::models::db::Rating>(
        "SELECT * FROM ratings
         WHERE name LIKE ? AND version_code = ? AND matchup = ?
         ORDER BY rating DESC LIMIT ?",
    )
    .bind(format!("%{needle}%"))
    .bind(version_code)
    .bind(partition_of(matchup))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
