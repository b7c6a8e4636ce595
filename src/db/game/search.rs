use sqlx::SqlitePool;

use crate::errors::AppError;
use crate::models::db::Game;
use crate::models::dto::SearchCriteria;
use crate::models::normalize::{generated_at, is_guid};

use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct SearchResult {
    pub games: Vec<Game>,
    pub page: i64,
    pub page_size: i64,
    pub generated_at: String,
}

enum Bind {
    Int(i64),
    Bool(bool),
    Text(String),
    Time(chrono::NaiveDateTime),
}

/// Accept both `2023-06-01T10:00:00` and `2023-06-01 10:00:00`; a bare date
/// means midnight.
fn parse_time_bound(s: &str) -> Option<chrono::NaiveDateTime> {
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .ok()
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Translate criteria into a WHERE clause plus its binds, in order.
///
/// A 32-hex `game_guid` is authoritative: every other criterion is dropped.
/// Non-guid searches only ever see public games.
fn build_where(criteria: &SearchCriteria) -> (String, Vec<Bind>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut binds: Vec<Bind> = Vec::new();

    if let Some(guid) = criteria.game_guid.as_deref().filter(|g| is_guid(g)) {
        clauses.push("game_guid = ?".into());
        binds.push(Bind::Text(guid.to_string()));
    } else {
        clauses.push("visibility = 0".into());
        if let Some(v) = criteria.duration_min.filter(|v| *v > 0) {
            clauses.push("duration >= ?".into());
            binds.push(Bind::Int(v));
        }
        if let Some(v) = criteria.duration_max.filter(|v| *v > 0) {
            clauses.push("duration <= ?".into());
            binds.push(Bind::Int(v));
        }
        if let Some(v) = criteria.include_ai {
            clauses.push("include_ai = ?".into());
            binds.push(Bind::Bool(v));
        }
        if let Some(v) = criteria.is_multiplayer {
            clauses.push("is_multiplayer = ?".into());
            binds.push(Bind::Bool(v));
        }
        if let Some(v) = criteria.population_min.filter(|v| *v > 0) {
            clauses.push("population >= ?".into());
            binds.push(Bind::Int(v));
        }
        if let Some(v) = criteria.population_max.filter(|v| *v > 0) {
            clauses.push("population <= ?".into());
            binds.push(Bind::Int(v));
        }
        if let Some(v) = criteria.instruction.as_deref().filter(|v| !v.is_empty()) {
            clauses.push("instruction LIKE ?".into());
            binds.push(Bind::Text(format!("%{v}%")));
        }
        if let Some(t) = criteria.gametime_min.as_deref().and_then(parse_time_bound) {
            clauses.push("game_time >= ?".into());
            binds.push(Bind::Time(t));
        }
        if let Some(t) = criteria.gametime_max.as_deref().and_then(parse_time_bound) {
            clauses.push("game_time <= ?".into());
            binds.push(Bind::Time(t));
        }
        if let Some(v) = criteria.map_name.as_deref().filter(|v| !v.is_empty()) {
            clauses.push("map_name LIKE ?".into());
            binds.push(Bind::Text(format!("%{v}%")));
        }

        let mut in_list = |column: &str, values: &Option<Vec<String>>| {
            if let Some(values) = values.as_ref().filter(|v| !v.is_empty()) {
                let marks = vec!["?"; values.len()].join(", ");
                clauses.push(format!("{column} IN ({marks})"));
                for v in values {
                    binds.push(Bind::Text(v.clone()));
                }
            }
        };
        in_list("speed", &criteria.speed);
        in_list("victory_type", &criteria.victory_type);
        in_list(
            "version_code",
            &criteria
                .version_code
                .as_ref()
                .map(|vs| vs.iter().map(|v| v.to_uppercase()).collect()),
        );
        in_list("matchup", &criteria.matchup);
        in_list("map_size", &criteria.map_size);
    }

    let clause = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    (clause, binds)
}

fn order_clause(criteria: &SearchCriteria) -> String {
    let column = match criteria.order_by.as_deref() {
        Some("created") => "created",
        Some("duration") => "duration",
        _ => "game_time",
    };
    // game_time searches default to newest-first.
    let desc = criteria.order_desc.unwrap_or(criteria.order_by.is_none());
    format!("ORDER BY {column} {}", if desc { "DESC" } else { "ASC" })
}

/// Multi-criteria paginated game search.
pub async fn search_games(
    pool: &SqlitePool,
    criteria: &SearchCriteria,
) -> Result<SearchResult, AppError> {
    let page = criteria.page.max(1);
    let page_size = criteria.page_size.max(1);

    let (where_clause, binds) = build_where(criteria);
    let sql = format!(
        "SELECT * FROM games {where_clause} {} LIMIT ? OFFSET ?",
        order_clause(criteria)
    );

    let mut query = sqlx::query_as::<_, Game>(&sql);
    for bind in binds {
        query = match bind {
            Bind::Int(v) => query.bind(v),
            Bind::Bool(v) => query.bind(v),
            Bind::Text(v) => query.bind(v),
            Bind::Time(v) => query.bind(v),
        };
    }
    let games = query
        .bind(page_size)
        .bind((page - 1) * page_size)
        .fetch_all(pool)
        .await?;

    Ok(SearchResult { games, page, page_size, generated_at: generated_at() })
}
