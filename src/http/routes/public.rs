use axum::{Router, routing::get};

use crate::http::handlers::system::ping;
use crate::state::AppState;

/// Unthrottled liveness probe.
pub fn routes() -> Router<AppState> {
    Router::new().route("/", get(ping))
}
