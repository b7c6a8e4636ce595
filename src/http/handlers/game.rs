use axum::{
    Json,
    extract::{Multipart, Query, State},
    http::StatusCode,
    response::Response,
};
use serde::Deserialize;

use crate::auth::{AdminAuth, MaybeBasic};
use crate::db::cache::Cacher;
use crate::db::game::read::{GameDetail, GameList, game_detail, latest_games, option_stats, random_games};
use crate::db::game::search::{SearchResult, search_games};
use crate::db::game::{delete, read};
use crate::http::handlers::cached_json_response;
use crate::ingest::ProcessOptions;
use crate::ingest::processor::process_upload;
use crate::models::dto::SearchCriteria;
use crate::state::AppState;
use crate::storage::object_key;

#[derive(Debug, Deserialize)]
pub struct DetailQuery {
    pub guid: String,
}

/// `GET /game/detail?guid=` — the whole aggregate of one game.
pub async fn get_game_detail(
    State(state): State<AppState>,
    MaybeBasic(creds): MaybeBasic,
    Query(query): Query<DetailQuery>,
) -> Result<Json<GameDetail>, (StatusCode, String)> {
    let detail = game_detail(&state.sqlite, &query.guid, false)
        .await
        .map_err(|e| e.to_response())?;
    if let Some(detail) = detail {
        return Ok(Json(detail));
    }

    // Private and unlisted games stay reachable for administrators.
    if let Some((username, password)) = creds {
        if state.user_service.check_admin(&username, &password).await.is_ok() {
            if let Some(detail) = game_detail(&state.sqlite, &query.guid, true)
                .await
                .map_err(|e| e.to_response())?
            {
                return Ok(Json(detail));
            }
        }
    }

    Err((StatusCode::NOT_FOUND, format!("Game profile [{}] not found", query.guid)))
}

#[derive(Debug, Deserialize)]
pub struct RandomQuery {
    #[serde(default = "default_threshold")]
    pub threshold: i64,
    #[serde(default = "default_random_limit")]
    pub limit: i64,
}

fn default_threshold() -> i64 {
    10
}

fn default_random_limit() -> i64 {
    50
}

pub async fn get_random_games(
    State(state): State<AppState>,
    Query(query): Query<RandomQuery>,
) -> Result<Json<GameList>, (StatusCode, String)> {
    let list = random_games(&state.sqlite, query.threshold, query.limit.clamp(1, 1000))
        .await
        .map_err(|e| e.to_response())?;
    Ok(Json(list))
}

#[derive(Debug, Deserialize)]
pub struct LatestQuery {
    #[serde(default = "default_latest_limit")]
    pub limit: i64,
}

fn default_latest_limit() -> i64 {
    100
}

pub async fn get_latest_games(
    State(state): State<AppState>,
    Query(query): Query<LatestQuery>,
) -> Result<Json<GameList>, (StatusCode, String)> {
    let list = latest_games(&state.sqlite, query.limit.clamp(1, 1000))
        .await
        .map_err(|e| e.to_response())?;
    Ok(Json(list))
}

const OPTION_STATS_CACHE_KEY: &str = "option_stats";

/// `GET /game/optionstats` — read-through cached filter statistics.
pub async fn get_option_stats(
    State(state): State<AppState>,
) -> Result<Response, (StatusCode, String)> {
    let cacher = Cacher::new(state.sqlite.clone());
    if let Some(cached) = cacher
        .get(OPTION_STATS_CACHE_KEY)
        .await
        .map_err(|e| e.to_response())?
    {
        return Ok(cached_json_response(cached, true));
    }

    let stats = option_stats(&state.sqlite).await.map_err(|e| e.to_response())?;
    let body = serde_json::to_string(&stats)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    cacher
        .set(OPTION_STATS_CACHE_KEY, &body)
        .await
        .map_err(|e| e.to_response())?;
    Ok(cached_json_response(body, false))
}

/// `POST /game/search`.
pub async fn post_search_games(
    State(state): State<AppState>,
    Json(criteria): Json<SearchCriteria>,
) -> Result<Json<SearchResult>, (StatusCode, String)> {
    let result = search_games(&state.sqlite, &criteria)
        .await
        .map_err(|e| e.to_response())?;
    Ok(Json(result))
}

/// `POST /game/upload` — multipart record or archive upload.
///
/// Fields: `recfile` (the binary), `lastmod` (ISO time of the file),
/// optional `s3replace` and `cleanup` flags. Overwriting stored objects is
/// only honored for administrators.
pub async fn upload_record(
    State(state): State<AppState>,
    MaybeBasic(creds): MaybeBasic,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let mut recfile: Option<(String, Vec<u8>)> = None;
    let mut lastmod = String::new();
    let mut s3replace = false;
    let mut cleanup = true;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?
    {
        match field.name().unwrap_or_default() {
            "recfile" => {
                let filename = field.file_name().unwrap_or("upload.bin").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
                recfile = Some((filename, bytes.to_vec()));
            }
            "lastmod" => {
                lastmod = field.text().await.unwrap_or_default();
            }
            "s3replace" => {
                let value = field.text().await.unwrap_or_default();
                s3replace = matches!(value.as_str(), "true" | "1" | "on");
            }
            "cleanup" => {
                let value = field.text().await.unwrap_or_default();
                cleanup = !matches!(value.as_str(), "false" | "0" | "off");
            }
            other => {
                tracing::debug!("Ignoring unknown upload field {}", other);
            }
        }
    }

    let Some((filename, bytes)) = recfile else {
        return Err((StatusCode::BAD_REQUEST, "missing recfile field".to_string()));
    };

    if s3replace {
        let is_admin = match &creds {
            Some((username, password)) => {
                state.user_service.check_admin(username, password).await.is_ok()
            }
            None => false,
        };
        if !is_admin {
            s3replace = false;
        }
    }

    let ctx = state.ingest_context();
    let result = process_upload(
        &ctx,
        &bytes,
        &filename,
        &lastmod,
        ProcessOptions { syncproc: true, s3replace, cleanup },
    )
    .await;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct GuidBody {
    pub guid: String,
}

/// Admin: `POST /game/delete` — cascade-remove a game aggregate.
pub async fn delete_game(
    State(state): State<AppState>,
    AdminAuth(_admin): AdminAuth,
    Json(body): Json<GuidBody>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    delete::delete_game(&state.sqlite, &body.guid)
        .await
        .map_err(|e| e.to_response())?;
    Ok(Json(serde_json::json!({"status": "deleted", "guid": body.guid})))
}

#[derive(Debug, Deserialize)]
pub struct VisibilityBody {
    pub guid: String,
    pub level: i64,
}

/// Admin: `POST /game/setvisibility`.
pub async fn set_visibility(
    State(state): State<AppState>,
    AdminAuth(_admin): AdminAuth,
    Json(body): Json<VisibilityBody>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    delete::set_visibility(&state.sqlite, &body.guid, body.level)
        .await
        .map_err(|e| e.to_response())?;
    Ok(Json(serde_json::json!({"status": "updated", "guid": body.guid, "level": body.level})))
}

/// Admin: `POST /game/reparse` — pull the stored record back out of the
/// object store and run it through the pipeline again.
pub async fn reparse_game(
    State(state): State<AppState>,
    AdminAuth(_admin): AdminAuth,
    Json(body): Json<GuidBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), (StatusCode, String)> {
    let Some(store) = state.store.clone() else {
        return Err(crate::errors::AppError::ObjectStoreUnconfigured.to_response());
    };

    let md5s = read::file_md5s(&state.sqlite, &body.guid)
        .await
        .map_err(|e| e.to_response())?;
    if md5s.is_empty() {
        return Err((StatusCode::NOT_FOUND, format!("Game [{}] has no files", body.guid)));
    }

    let mut fetched = 0usize;
    for md5 in md5s {
        let key = object_key(&state.config.s3.recorddir, &format!("{md5}.zip"));
        let Some(zipped) = store.get(&key).await.map_err(|e| e.to_response())? else {
            tracing::warn!("Reparse: object {} is missing", key);
            continue;
        };

        // Unpack the single-entry envelope into the upload dir and enqueue.
        let uploaddir = state.config.uploaddir.clone();
        let extracted = tokio::task::spawn_blocking(move || -> Result<Vec<std::path::PathBuf>, crate::errors::AppError> {
            let mut archive = zip::ZipArchive::new(std::io::Cursor::new(zipped))?;
            let outdir = uploaddir.join(format!("reparse_{}", uuid::Uuid::new_v4().simple()));
            std::fs::create_dir_all(&outdir)?;
            archive.extract(&outdir)?;
            let files = std::fs::read_dir(&outdir)?
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.is_file())
                .collect();
            Ok(files)
        })
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(|e| e.to_response())?;

        for file in extracted {
            state.queue.enqueue(file).await;
            fetched += 1;
        }
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({"status": "queued", "guid": body.guid, "files": fetched})),
    ))
}
