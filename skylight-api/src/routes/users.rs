//! Admin user management.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use skylight_core::{Role, UserRecord, ViewAccess};

use crate::error::ApiResult;
use crate::extract::AdminSession;
use crate::state::AppState;

/// A user record with the credential field stripped. Passwords (or their
/// digests) never leave the server, even to admins.
#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub username: String,
    pub role: Role,
    pub display_name: String,
    pub views: ViewAccess,
}

impl From<UserRecord> for UserSummary {
    fn from(record: UserRecord) -> Self {
        Self {
            username: record.username,
            role: record.role,
            display_name: record.display_name,
            views: record.views,
        }
    }
}

/// `GET /admin/users`
pub async fn list_users(
    State(state): State<AppState>,
    AdminSession(_session): AdminSession,
) -> Json<Vec<UserSummary>> {
    let records = state.users.list().await;
    Json(records.into_iter().map(UserSummary::from).collect())
}

#[derive(Debug, Deserialize)]
pub struct UpsertUserRequest {
    pub username: String,
    pub password: String,
    pub role: Role,
    pub display_name: String,
    #[serde(default)]
    pub views: ViewAccess,
}

/// `PUT /admin/users`
///
/// Creates or replaces a user. The whole persisted table is rewritten;
/// concurrent edits from other instances are last-write-wins.
pub async fn upsert_user(
    State(state): State<AppState>,
    AdminSession(_session): AdminSession,
    Json(req): Json<UpsertUserRequest>,
) -> ApiResult<StatusCode> {
    state
        .users
        .upsert(UserRecord {
            username: req.username,
            password: req.password,
            role: req.role,
            display_name: req.display_name,
            views: req.views,
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /admin/users/{username}`
pub async fn delete_user(
    State(state): State<AppState>,
    AdminSession(_session): AdminSession,
    Path(username): Path<String>,
) -> ApiResult<StatusCode> {
    state.users.delete(&username).await?;
    Ok(StatusCode::NO_CONTENT)
}
