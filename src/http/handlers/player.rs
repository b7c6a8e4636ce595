use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use serde::Deserialize;

use crate::db::player::read as players;
use crate::db::rating::read as ratings;
use crate::models::normalize::generated_at;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RandomPlayersQuery {
    #[serde(default = "default_threshold")]
    pub threshold: i64,
    #[serde(default = "default_random_limit")]
    pub limit: i64,
}

fn default_threshold() -> i64 {
    10
}

fn default_random_limit() -> i64 {
    300
}

pub async fn get_random_players(
    State(state): State<AppState>,
    Query(query): Query<RandomPlayersQuery>,
) -> Result<Json<players::PlayerList>, (StatusCode, String)> {
    let list = players::random_players(&state.sqlite, query.threshold, query.limit.clamp(1, 1000))
        .await
        .map_err(|e| e.to_response())?;
    Ok(Json(list))
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    20
}

pub async fn get_latest_players(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<players::PlayerList>, (StatusCode, String)> {
    let list = players::latest_players(&state.sqlite, query.limit.clamp(1, 1000))
        .await
        .map_err(|e| e.to_response())?;
    Ok(Json(list))
}

#[derive(Debug, Deserialize)]
pub struct ActiveQuery {
    #[serde(default = "default_active_limit")]
    pub limit: i64,
    #[serde(default = "default_days")]
    pub days: i64,
}

fn default_active_limit() -> i64 {
    30
}

fn default_days() -> i64 {
    30
}

pub async fn get_active_players(
    State(state): State<AppState>,
    Query(query): Query<ActiveQuery>,
) -> Result<Json<players::PlayerList>, (StatusCode, String)> {
    let list = players::active_players(&state.sqlite, query.limit.clamp(1, 1000), query.days)
        .await
        .map_err(|e| e.to_response())?;
    Ok(Json(list))
}

#[derive(Debug, Deserialize)]
pub struct PlayerHashQuery {
    pub player_hash: String,
    #[serde(default = "default_friends_limit")]
    pub limit: i64,
}

fn default_friends_limit() -> i64 {
    100
}

pub async fn get_player_friends(
    State(state): State<AppState>,
    Query(query): Query<PlayerHashQuery>,
) -> Result<Json<players::PlayerList>, (StatusCode, String)> {
    let hash = query.player_hash.to_lowercase();
    let list = players::close_friends(&state.sqlite, &hash, query.limit.clamp(1, 1000))
        .await
        .map_err(|e| e.to_response())?;
    Ok(Json(list))
}

pub async fn get_player_recent_games(
    State(state): State<AppState>,
    Query(query): Query<PlayerHashQuery>,
) -> Result<Json<players::PlayerGames>, (StatusCode, String)> {
    let hash = query.player_hash.to_lowercase();
    let list = players::recent_games(&state.sqlite, &hash, query.limit.clamp(1, 1000))
        .await
        .map_err(|e| e.to_response())?;
    Ok(Json(list))
}

#[derive(Debug, Deserialize)]
pub struct ProfileQuery {
    pub player_hash: String,
}

#[derive(Debug, serde::Serialize)]
pub struct PlayerProfile {
    pub totals: players::PlayerTotals,
    pub ratings: Vec<crate::models::db::Rating>,
    pub recent_games: Vec<players::PlayerGame>,
    pub close_friends: Vec<players::PlayerCount>,
    pub generated_at: String,
}

/// `GET /player/profile` — totals, ratings, recent games and friends in one
/// round trip.
pub async fn get_player_profile(
    State(state): State<AppState>,
    Query(query): Query<ProfileQuery>,
) -> Result<Json<PlayerProfile>, (StatusCode, String)> {
    let hash = query.player_hash.to_lowercase();

    let (totals, rating_rows, recent, friends) = tokio::join!(
        players::totals(&state.sqlite, &hash),
        ratings::player_ratings(&state.sqlite, &hash),
        players::recent_games(&state.sqlite, &hash, 20),
        players::close_friends(&state.sqlite, &hash, 50),
    );

    let totals = totals.map_err(|e| e.to_response())?;
    if totals.total == 0 {
        return Err((StatusCode::NOT_FOUND, format!("Player [{hash}] not found")));
    }

    Ok(Json(PlayerProfile {
        totals,
        ratings: rating_rows.map_err(|e| e.to_response())?,
        recent_games: recent.map_err(|e| e.to_response())?.games,
        close_friends: friends.map_err(|e| e.to_response())?.players,
        generated_at: generated_at(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct NameSearchQuery {
    pub name: String,
    #[serde(default = "default_search_limit")]
    pub limit: i64,
}

fn default_search_limit() -> i64 {
    50
}

pub async fn search_player_name(
    State(state): State<AppState>,
    Query(query): Query<NameSearchQuery>,
) -> Result<Json<players::PlayerList>, (StatusCode, String)> {
    let list = players::search_name(&state.sqlite, &query.name, query.limit.clamp(1, 500))
        .await
        .map_err(|e| e.to_response())?;
    Ok(Json(list))
}
