// Main HTTP routing: compose the public, read, upload and admin routers.
use axum::Router;

use crate::state::AppState;

pub mod admin;
pub mod api;
pub mod public;
pub mod upload;

/// Build the top-level router. Paths are flat (no version prefix); the
/// admin surface is auth-gated per handler and strictly rate limited.
pub fn create_http_routes(state: AppState) -> Router {
    Router::new()
        .merge(public::routes())
        .merge(api::routes())
        .merge(upload::routes())
        .merge(admin::routes())
        .with_state(state)
}
