//! Error types for Skylight operations

use thiserror::Error;

/// Gateway layer errors (object store and warehouse I/O).
///
/// `Timeout` and `Transport` are the retryable kinds; everything else is a
/// logical outcome that must surface immediately.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Missing credentials: {detail}")]
    MissingCredentials { detail: String },

    #[error("{operation} timed out after {elapsed_ms}ms")]
    Timeout { operation: String, elapsed_ms: u64 },

    #[error("Transport error: {reason}")]
    Transport { reason: String },

    #[error("Unexpected response (status {status}): {reason}")]
    UnexpectedResponse { status: u16, reason: String },

    #[error("Decode error: {reason}")]
    Decode { reason: String },
}

impl GatewayError {
    /// Whether a bounded retry at the gateway boundary is warranted.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Timeout { .. } | GatewayError::Transport { .. }
        )
    }
}

/// Data layer errors surfaced by the tiered cache.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DataError {
    /// The warehouse was unreachable or the query failed. Fatal to the
    /// triggering request; there is no further fallback tier.
    #[error("Dataset {dataset} unavailable: {reason}")]
    Unavailable { dataset: String, reason: String },

    #[error("Unknown dataset: {dataset}")]
    UnknownDataset { dataset: String },
}

/// Authentication and session errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Deliberately silent about which field was wrong.
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Session has expired")]
    SessionExpired,

    #[error("Session not found")]
    SessionNotFound,

    /// A correctness-critical write (session or user mutation) failed.
    #[error("Persistence failure during {operation}: {reason}")]
    Persistence { operation: String, reason: String },

    #[error("Operation requires the admin role")]
    AdminRequired,

    #[error("User not found: {username}")]
    UserNotFound { username: String },

    #[error("Cannot delete the last admin account")]
    LastAdmin,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all Skylight errors.
#[derive(Debug, Clone, Error)]
pub enum SkylightError {
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for Skylight operations.
pub type SkylightResult<T> = Result<T, SkylightError>;

// =============================================================================
// TESTS
// =============================================================================
