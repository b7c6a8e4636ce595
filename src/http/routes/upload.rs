use axum::{Router, extract::DefaultBodyLimit, middleware::from_fn, routing::post};

use crate::http::handlers::game::upload_record;
use crate::middleware::{UploadRateLimit, rate_limit_middleware};
use crate::state::AppState;

/// Record files stay well under this, archives occasionally do not.
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/game/upload", post(upload_record))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(from_fn(rate_limit_middleware::<UploadRateLimit>))
}
