//! Error types for the Skylight API
//!
//! Defines the structured error response returned by every endpoint: an
//! [`ErrorCode`] category, a user-safe message, and the matching HTTP
//! status via axum's `IntoResponse`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use skylight_core::{AuthError, DataError, SkylightError};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Missing, invalid, expired, or revoked credentials. Expired and
    /// unknown sessions are deliberately indistinguishable.
    Unauthorized,

    /// Authenticated but not allowed (admin-only surface).
    Forbidden,

    /// Malformed request input.
    InvalidInput,

    /// No dataset registered under the requested id.
    UnknownDataset,

    /// Requested user does not exist.
    UserNotFound,

    /// Mutation conflicts with store invariants (e.g. deleting the last
    /// admin).
    Conflict,

    /// The warehouse could not answer; the request has no further fallback.
    DataUnavailable,

    /// A correctness-critical write to the object store failed.
    PersistenceFailure,

    /// A gateway was unreachable for a non-degradable operation.
    ServiceUnavailable,

    /// Internal server error.
    InternalError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorCode::UnknownDataset | ErrorCode::UserNotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::DataUnavailable | ErrorCode::ServiceUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ErrorCode::PersistenceFailure | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR
// ============================================================================

/// Structured error returned by every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.code.status_code();
        (status, Json(self)).into_response()
    }
}

impl From<SkylightError> for ApiError {
    fn from(err: SkylightError) -> Self {
        match err {
            SkylightError::Data(DataError::Unavailable { dataset, .. }) => Self::new(
                ErrorCode::DataUnavailable,
                format!("Dataset '{}' is temporarily unavailable", dataset),
            ),
            SkylightError::Data(DataError::UnknownDataset { dataset }) => Self::new(
                ErrorCode::UnknownDataset,
                format!("Unknown dataset '{}'", dataset),
            ),
            // Bad credentials and dead sessions share one response shape:
            // no detail about which part was wrong.
            SkylightError::Auth(AuthError::InvalidCredentials) => {
                Self::unauthorized("Invalid username or password")
            }
            SkylightError::Auth(AuthError::SessionExpired)
            | SkylightError::Auth(AuthError::SessionNotFound) => {
                Self::unauthorized("Authentication required")
            }
            SkylightError::Auth(AuthError::AdminRequired) => {
                Self::forbidden("This operation requires the admin role")
            }
            SkylightError::Auth(AuthError::UserNotFound { username }) => Self::new(
                ErrorCode::UserNotFound,
                format!("User '{}' not found", username),
            ),
            SkylightError::Auth(AuthError::LastAdmin) => Self::new(
                ErrorCode::Conflict,
                "Cannot delete the last admin account",
            ),
            SkylightError::Auth(AuthError::Persistence { operation, .. }) => Self::new(
                ErrorCode::PersistenceFailure,
                format!("Failed to persist {}", operation),
            ),
            SkylightError::Gateway(e) => {
                Self::new(ErrorCode::ServiceUnavailable, e.to_string())
            }
            SkylightError::Config(e) => Self::internal_error(e.to_string()),
        }
    }
}

impl From<DataError> for ApiError {
    fn from(err: DataError) -> Self {
        SkylightError::from(err).into()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        SkylightError::from(err).into()
    }
}

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// TESTS
// ============================================================================
