use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
};
use axum_extra::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Basic};

use crate::state::AppState;

async fn basic_credentials(
    parts: &mut Parts,
    state: &AppState,
) -> Option<(String, String)> {
    let header = TypedHeader::<Authorization<Basic>>::from_request_parts(parts, state)
        .await
        .ok()?;
    let TypedHeader(Authorization(basic)) = header;
    Some((basic.username().to_string(), basic.password().to_string()))
}

/// Extractor for endpoints any valid user may call.
pub struct UserAuth(pub String);

impl FromRequestParts<AppState> for UserAuth {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some((username, password)) = basic_credentials(parts, state).await else {
            return Err((StatusCode::UNAUTHORIZED, "Need user authentication".to_string()));
        };
        state
            .user_service
            .check_user(&username, &password)
            .await
            .map_err(|e| e.to_response())?;
        Ok(UserAuth(username))
    }
}

/// Extractor gating admin endpoints on the administrator role.
pub struct AdminAuth(pub String);

impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some((username, password)) = basic_credentials(parts, state).await else {
            return Err((StatusCode::UNAUTHORIZED, "Need admin authentication".to_string()));
        };
        state
            .user_service
            .check_admin(&username, &password)
            .await
            .map_err(|e| e.to_response())?;
        Ok(AdminAuth(username))
    }
}

/// Optional credentials: endpoints that merely upgrade behavior for admins
/// (e.g. upload force-replace) never fail on absent or bad auth.
pub struct MaybeBasic(pub Option<(String, String)>);

impl FromRequestParts<AppState> for MaybeBasic {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(MaybeBasic(basic_credentials(parts, state).await))
    }
}
