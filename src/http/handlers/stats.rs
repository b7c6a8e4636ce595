use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Response,
};
use serde::Deserialize;

use crate::db::cache::Cacher;
use crate::db::stats;
use crate::http::handlers::cached_json_response;
use crate::state::AppState;

const TOTAL_STATS_CACHE_KEY: &str = "total_stats";

/// `GET /stats/total` — cached corpus-wide counters.
pub async fn get_total_stats(
    State(state): State<AppState>,
) -> Result<Response, (StatusCode, String)> {
    let cacher = Cacher::new(state.sqlite.clone());
    if let Some(cached) = cacher
        .get(TOTAL_STATS_CACHE_KEY)
        .await
        .map_err(|e| e.to_response())?
    {
        return Ok(cached_json_response(cached, true));
    }

    let totals = stats::total_stats(&state.sqlite).await.map_err(|e| e.to_response())?;
    let body = serde_json::to_string(&totals)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    cacher
        .set(TOTAL_STATS_CACHE_KEY, &body)
        .await
        .map_err(|e| e.to_response())?;
    Ok(cached_json_response(body, false))
}

#[derive(Debug, Deserialize)]
pub struct HomepageQuery {
    #[serde(default = "default_glimit")]
    pub glimit: i64,
    #[serde(default = "default_plimit")]
    pub plimit: i64,
    #[serde(default = "default_pdays")]
    pub pdays: i64,
}

fn default_glimit() -> i64 {
    stats::DEFAULT_HOMEPAGE_GLIMIT
}

fn default_plimit() -> i64 {
    stats::DEFAULT_HOMEPAGE_PLIMIT
}

fn default_pdays() -> i64 {
    stats::DEFAULT_HOMEPAGE_PDAYS
}

/// `GET /shortcut/homepage` — everything the landing page needs in one
/// cached blob.
pub async fn get_homepage(
    State(state): State<AppState>,
    Query(query): Query<HomepageQuery>,
) -> Result<Response, (StatusCode, String)> {
    let glimit = query.glimit.clamp(1, 100);
    let plimit = query.plimit.clamp(1, 500);
    let pdays = query.pdays.clamp(1, 365);

    let cacher = Cacher::new(state.sqlite.clone());
    let key = stats::homepage_cache_key(glimit, plimit, pdays);
    if let Some(cached) = cacher.get(&key).await.map_err(|e| e.to_response())? {
        return Ok(cached_json_response(cached, true));
    }

    let body = stats::gen_homepage_data(&state.sqlite, glimit, plimit, pdays)
        .await
        .map_err(|e| e.to_response())?;
    cacher.set(&key, &body).await.map_err(|e| e.to_response())?;
    Ok(cached_json_response(body, false))
}
