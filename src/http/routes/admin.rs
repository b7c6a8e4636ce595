use axum::{
    Router,
    middleware::from_fn,
    routing::{get, post},
};

use crate::{
    http::handlers::{
        auth::{logout_all, online_users},
        game::{delete_game, reparse_game, set_visibility},
        rating::{start_rating, unlock_rating},
        system::{
            backup_sqlite, download_current_config, download_default_config, tmpdir_list,
            tmpdir_purge,
        },
    },
    middleware::{StrictRateLimit, rate_limit_middleware},
    state::AppState,
};

/// Admin routes; every handler requires administrator credentials.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/game/delete", post(delete_game))
        .route("/game/reparse", post(reparse_game))
        .route("/game/setvisibility", post(set_visibility))
        .route("/rating/start", get(start_rating))
        .route("/rating/unlock", get(unlock_rating))
        .route("/system/config/default", get(download_default_config))
        .route("/system/config/current", get(download_current_config))
        .route("/system/backup/sqlite", get(backup_sqlite))
        .route("/system/tmpdir/list", get(tmpdir_list))
        .route("/system/tmpdir/purge", get(tmpdir_purge))
        .route("/auth/onlineusers", get(online_users))
        .route("/auth/logoutall", get(logout_all))
        .layer(from_fn(rate_limit_middleware::<StrictRateLimit>))
}
