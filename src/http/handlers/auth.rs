use axum::{Json, extract::State};

use crate::auth::AdminAuth;
use crate::models::normalize::generated_at;
use crate::state::AppState;

/// Admin: `GET /auth/onlineusers` — hashed keys of live cached logins.
pub async fn online_users(
    State(state): State<AppState>,
    AdminAuth(_admin): AdminAuth,
) -> Json<serde_json::Value> {
    let users = state.user_service.online_users().await;
    Json(serde_json::json!({
        "online": users,
        "generated_at": generated_at(),
    }))
}

/// Admin: `GET /auth/logoutall` — clear the login cache.
pub async fn logout_all(
    State(state): State<AppState>,
    AdminAuth(_admin): AdminAuth,
) -> Json<serde_json::Value> {
    state.user_service.logout_all().await;
    Json(serde_json::json!({"status": "All users logged out"}))
}
