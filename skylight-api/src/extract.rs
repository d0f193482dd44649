//! Request extractors.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use skylight_core::{AuthError, SessionRecord};

use crate::error::ApiError;
use crate::state::AppState;

/// The validated session for the request's bearer token.
///
/// Rejects with 401 when the header is missing or malformed, or when the
/// token is unknown, revoked, or expired. Those cases are indistinguishable
/// to the client; all of them mean "authenticate again".
pub struct CurrentSession(pub SessionRecord);

/// Like [`CurrentSession`], but additionally requires the admin role.
pub struct AdminSession(pub SessionRecord);

fn bearer_token(parts: &Parts) -> Result<&str, ApiError> {
    let header = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::unauthorized("Authorization header must use Bearer scheme"))
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        match state.sessions.validate(token).await {
            Some(record) => Ok(CurrentSession(record)),
            // Expired and never-issued tokens are indistinguishable here by
            // design; both force re-authentication.
            None => Err(AuthError::SessionNotFound.into()),
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminSession {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentSession(record) = CurrentSession::from_request_parts(parts, state).await?;
        if !record.role.is_admin() {
            return Err(AuthError::AdminRequired.into());
        }
        Ok(AdminSession(record))
    }
}
