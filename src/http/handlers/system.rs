use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::Response,
};
use sysinfo::{Disks, System};

use crate::auth::AdminAuth;
use crate::models::normalize::generated_at;
use crate::state::AppState;

/// `GET /` — liveness plus a coarse host health snapshot.
pub async fn ping(State(_state): State<AppState>) -> Json<serde_json::Value> {
    let mut sys = System::new();
    sys.refresh_memory();
    let load = System::load_average();
    let disks = Disks::new_with_refreshed_list();
    let disk_available: u64 = disks.list().iter().map(|d| d.available_space()).sum();

    Json(serde_json::json!({
        "status": "online",
        "time": generated_at(),
        "load": [load.one, load.five, load.fifteen],
        "memory": {
            "total": sys.total_memory(),
            "used": sys.used_memory(),
        },
        "disk_available": disk_available,
    }))
}

fn plain_text(body: String) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(axum::body::Body::from(body))
        .unwrap_or_else(|_| Response::new(axum::body::Body::empty()))
}

/// Admin: `GET /system/config/default` — the baked-in defaults as ini text.
pub async fn download_default_config(
    State(_state): State<AppState>,
    AdminAuth(_admin): AdminAuth,
) -> Response {
    // Defaults are what from_env produces in an empty environment; render
    // the skeleton with every recognized key present.
    let defaults = crate::config::AppConfig::from_env();
    plain_text(defaults.render_ini())
}

/// Admin: `GET /system/config/current` — the live configuration.
pub async fn download_current_config(
    State(state): State<AppState>,
    AdminAuth(_admin): AdminAuth,
) -> Response {
    plain_text(state.config.render_ini())
}

/// Admin: `GET /system/backup/sqlite` — a consistent copy of the database.
///
/// `VACUUM INTO` writes a clean snapshot that is safe to take while writers
/// are active; the snapshot file is streamed back and removed.
pub async fn backup_sqlite(
    State(state): State<AppState>,
    AdminAuth(_admin): AdminAuth,
) -> Result<Response, (StatusCode, String)> {
    let backupdir = &state.config.backupdir;
    tokio::fs::create_dir_all(backupdir)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let target = backupdir.join(format!("backup_{}.sqlite3", uuid::Uuid::new_v4().simple()));
    let target_str = target.to_string_lossy().into_owned();

    sqlx::query("VACUUM INTO ?")
        .bind(&target_str)
        .execute(&state.sqlite)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let bytes = tokio::fs::read(&target)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let _ = tokio::fs::remove_file(&target).await;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_DISPOSITION, "attachment; filename=\"db-backup.sqlite3\"")
        .body(axum::body::Body::from(bytes))
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

fn list_tmpdirs(state: &AppState) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(&state.config.tmpdir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(&state.config.tmpprefix))
        .collect()
}

/// Admin: `GET /system/tmpdir/list`.
pub async fn tmpdir_list(
    State(state): State<AppState>,
    AdminAuth(_admin): AdminAuth,
) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "tmpdirs": list_tmpdirs(&state),
        "generated_at": generated_at(),
    }))
}

/// Admin: `GET /system/tmpdir/purge` — drop leftover per-request dirs.
pub async fn tmpdir_purge(
    State(state): State<AppState>,
    AdminAuth(_admin): AdminAuth,
) -> (StatusCode, Json<serde_json::Value>) {
    let names = list_tmpdirs(&state);
    let mut purged = 0usize;
    for name in &names {
        if std::fs::remove_dir_all(state.config.tmpdir.join(name)).is_ok() {
            purged += 1;
        }
    }
    tracing::info!("Purged {} tmp dirs", purged);
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({"purged": purged, "generated_at": generated_at()})),
    )
}
