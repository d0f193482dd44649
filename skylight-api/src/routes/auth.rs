//! Login, logout, and session introspection.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use skylight_core::{AuthError, Role, Timestamp, ViewAccess};

use crate::error::ApiResult;
use crate::extract::CurrentSession;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub remember: bool,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub username: String,
    pub role: Role,
    pub expires_at: Timestamp,
}

/// `POST /auth/login`
///
/// Authenticates and issues a session token. A failed login reveals nothing
/// about which field was wrong.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let record = state
        .users
        .authenticate(&req.username, &req.password)
        .await
        .ok_or(AuthError::InvalidCredentials)?;

    let session = state
        .sessions
        .create(&record.username, record.role, req.remember)
        .await?;

    Ok(Json(LoginResponse {
        token: session.token,
        username: session.username,
        role: session.role,
        expires_at: session.expires_at,
    }))
}

/// `POST /auth/logout`
///
/// Revokes the bearer session. Idempotent; logging out twice is fine.
pub async fn logout(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
) -> ApiResult<StatusCode> {
    state.sessions.revoke(&session.token).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub username: String,
    pub role: Role,
    pub expires_at: Timestamp,
    pub remembered: bool,
    pub views: ViewAccess,
}

/// `GET /auth/me`
///
/// The session snapshots the role at login; view access is read live from
/// the user store so admin edits apply without re-login. A user deleted
/// since login keeps a valid session but sees no views.
pub async fn me(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
) -> Json<MeResponse> {
    let views = match state.users.get(&session.username).await {
        Some(record) => record.views,
        None => ViewAccess::Selected(Vec::new()),
    };

    Json(MeResponse {
        username: session.username,
        role: session.role,
        expires_at: session.expires_at,
        remembered: session.remembered,
        views,
    })
}
