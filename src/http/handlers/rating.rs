use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::Response,
};
use serde::Deserialize;

use crate::auth::AdminAuth;
use crate::db::cache::Cacher;
use crate::db::rating::read as ratings;
use crate::http::handlers::cached_json_response;
use crate::models::dto::Pagination;
use crate::models::normalize::generated_at;
use crate::rating::RatingLock;
use crate::state::AppState;

fn default_version() -> String {
    "AOC10".to_string()
}

fn default_matchup() -> String {
    "1v1".to_string()
}

fn default_order() -> String {
    "desc".to_string()
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    100
}

#[derive(Debug, Deserialize)]
pub struct RatingTableQuery {
    #[serde(default = "default_version")]
    pub version_code: String,
    #[serde(default = "default_matchup")]
    pub matchup: String,
    #[serde(default = "default_order")]
    pub order: String,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

/// `GET /rating/table` — one ladder page.
pub async fn get_rating_table(
    State(state): State<AppState>,
    Query(query): Query<RatingTableQuery>,
) -> Result<Json<ratings::RatingTable>, (StatusCode, String)> {
    let table = ratings::rating_table(
        &state.sqlite,
        &query.version_code,
        &query.matchup,
        query.order.eq_ignore_ascii_case("desc"),
        Pagination { page: query.page, page_size: query.page_size.clamp(1, 1000) },
    )
    .await
    .map_err(|e| e.to_response())?;
    Ok(Json(table))
}

const RATING_STATS_CACHE_KEY: &str = "rating_stats";

/// `GET /rating/stats` — cached per-partition player counts.
pub async fn get_rating_stats(
    State(state): State<AppState>,
) -> Result<Response, (StatusCode, String)> {
    let cacher = Cacher::new(state.sqlite.clone());
    if let Some(cached) = cacher
        .get(RATING_STATS_CACHE_KEY)
        .await
        .map_err(|e| e.to_response())?
    {
        return Ok(cached_json_response(cached, true));
    }

    let stats = ratings::rating_stats(&state.sqlite).await.map_err(|e| e.to_response())?;
    let body = serde_json::to_string(&stats)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    cacher
        .set(RATING_STATS_CACHE_KEY, &body)
        .await
        .map_err(|e| e.to_response())?;
    Ok(cached_json_response(body, false))
}

/// `GET /rating/status` — lock inspection.
pub async fn get_rating_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let lock = RatingLock::new(&state.config);
    Json(serde_json::json!({
        "running": lock.rating_running(),
        "pid": lock.pid(),
        "started": lock.started_time(),
        "elapsed": lock.elapsed(),
        "scheduled": lock.scheduled(),
        "generated_at": generated_at(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct PlayerPageQuery {
    pub player_hash: String,
    #[serde(default = "default_version")]
    pub version_code: String,
    #[serde(default = "default_matchup")]
    pub matchup: String,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

/// `GET /rating/playerpage` — which ladder page a player is on.
pub async fn get_player_page(
    State(state): State<AppState>,
    Query(query): Query<PlayerPageQuery>,
) -> Result<Json<ratings::PlayerPage>, (StatusCode, String)> {
    let hash = query.player_hash.to_lowercase();
    let page = ratings::player_page(
        &state.sqlite,
        &hash,
        &query.version_code,
        &query.matchup,
        query.page_size.clamp(1, 1000),
    )
    .await
    .map_err(|e| e.to_response())?;
    match page {
        Some(page) => Ok(Json(page)),
        None => Err((StatusCode::NOT_FOUND, format!("Player [{hash}] is unrated"))),
    }
}

#[derive(Debug, Deserialize)]
pub struct RatingSearchQuery {
    pub name: String,
    #[serde(default = "default_version")]
    pub version_code: String,
    #[serde(default = "default_matchup")]
    pub matchup: String,
    #[serde(default = "default_search_limit")]
    pub limit: i64,
}

fn default_search_limit() -> i64 {
    50
}

#[derive(Debug, serde::Serialize)]
pub struct RatingSearchResult {
    pub ratings: Vec<crate::models::db::Rating>,
    pub generated_at: String,
}

pub async fn search_rating_name(
    State(state): State<AppState>,
    Query(query): Query<RatingSearchQuery>,
) -> Result<Json<RatingSearchResult>, (StatusCode, String)> {
    let rows = ratings::search_name(
        &state.sqlite,
        &query.name,
        &query.version_code,
        &query.matchup,
        query.limit.clamp(1, 500),
    )
    .await
    .map_err(|e| e.to_response())?;
    Ok(Json(RatingSearchResult { ratings: rows, generated_at: generated_at() }))
}

#[derive(Debug, Deserialize)]
pub struct StartQuery {
    #[serde(default)]
    pub schedule: bool,
}

/// Admin: `GET /rating/start` — spawn the rating subprocess, or leave the
/// schedule sentinel when one is already running.
pub async fn start_rating(
    State(state): State<AppState>,
    AdminAuth(_admin): AdminAuth,
    Query(query): Query<StartQuery>,
) -> Result<(StatusCode, Json<serde_json::Value>), (StatusCode, String)> {
    let lock = RatingLock::new(&state.config);
    if lock.rating_running() {
        if query.schedule {
            lock.schedule().map_err(|e| e.to_response())?;
            return Ok((
                StatusCode::ACCEPTED,
                Json(serde_json::json!({
                    "status": "scheduled",
                    "detail": "Rating calculation is already running, scheduled the next run"
                })),
            ));
        }
        return Err(
            crate::errors::AppError::Busy("Rating calculation is already running".into())
                .to_response(),
        );
    }

    lock.start_calc(query.schedule).map_err(|e| e.to_response())?;
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({"status": "started"})),
    ))
}

#[derive(Debug, Deserialize)]
pub struct UnlockQuery {
    #[serde(default)]
    pub force: bool,
}

/// Admin: `GET /rating/unlock` — clear the lock, optionally killing the
/// running process first.
pub async fn unlock_rating(
    State(state): State<AppState>,
    AdminAuth(_admin): AdminAuth,
    Query(query): Query<UnlockQuery>,
) -> Result<(StatusCode, Json<serde_json::Value>), (StatusCode, String)> {
    let lock = RatingLock::new(&state.config);
    lock.unlock(query.force).map_err(|e| e.to_response())?;
    if lock.lock_file_exists() && lock.rating_running() {
        return Err((StatusCode::CONFLICT, "Failed to unlock".into()));
    }
    Ok((StatusCode::ACCEPTED, Json(serde_json::json!({"status": "unlocked"}))))
}
