//! Gateway configuration, loaded from environment variables.

use secrecy::{ExposeSecret, SecretString};
use skylight_core::ConfigError;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;

/// Object store gateway configuration.
///
/// # Environment Variables
/// - `SKYLIGHT_CACHE_BUCKET`: GCS bucket holding cache, session, and user
///   objects (required for the GCS store; empty means in-memory fallback)
/// - `SKYLIGHT_GCP_ACCESS_TOKEN`: OAuth2 bearer token for GCS and BigQuery
/// - `SKYLIGHT_GATEWAY_TIMEOUT_SECS`: per-call deadline (default: 30)
/// - `SKYLIGHT_GATEWAY_RETRY_ATTEMPTS`: bounded attempts for transient
///   errors (default: 3)
/// - `SKYLIGHT_GATEWAY_RETRY_BACKOFF_MS`: fixed backoff between attempts
///   (default: 500)
#[derive(Clone)]
pub struct StoreConfig {
    /// Bucket name. Empty means no object store is configured.
    pub bucket: String,

    /// Bearer token for the GCS JSON API.
    pub access_token: Option<SecretString>,

    /// Per-call deadline for every object store operation.
    pub timeout: Duration,

    /// Bounded attempts for retryable errors.
    pub retry_attempts: u32,

    /// Fixed backoff between attempts.
    pub retry_backoff: Duration,
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("bucket", &self.bucket)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("timeout", &self.timeout)
            .field("retry_attempts", &self.retry_attempts)
            .field("retry_backoff", &self.retry_backoff)
            .finish()
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            access_token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> Self {
        Self {
            bucket: std::env::var("SKYLIGHT_CACHE_BUCKET").unwrap_or_default(),
            access_token: std::env::var("SKYLIGHT_GCP_ACCESS_TOKEN")
                .ok()
                .filter(|t| !t.trim().is_empty())
                .map(|t| SecretString::new(t.into())),
            timeout: Duration::from_secs(env_parse(
                "SKYLIGHT_GATEWAY_TIMEOUT_SECS",
                DEFAULT_TIMEOUT_SECS,
            )),
            retry_attempts: env_parse("SKYLIGHT_GATEWAY_RETRY_ATTEMPTS", DEFAULT_RETRY_ATTEMPTS),
            retry_backoff: Duration::from_millis(env_parse(
                "SKYLIGHT_GATEWAY_RETRY_BACKOFF_MS",
                DEFAULT_RETRY_BACKOFF_MS,
            )),
        }
    }

    /// Whether a bucket is configured at all.
    pub fn has_bucket(&self) -> bool {
        !self.bucket.trim().is_empty()
    }

    /// The configured token, validated non-empty.
    pub fn require_token(&self) -> Result<&SecretString, ConfigError> {
        match &self.access_token {
            Some(token) if !token.expose_secret().trim().is_empty() => Ok(token),
            _ => Err(ConfigError::MissingRequired {
                field: "SKYLIGHT_GCP_ACCESS_TOKEN".to_string(),
            }),
        }
    }
}

/// Warehouse gateway configuration.
///
/// # Environment Variables
/// - `SKYLIGHT_BQ_PROJECT`: BigQuery billing project id (required)
/// - `SKYLIGHT_GCP_ACCESS_TOKEN`: shared OAuth2 bearer token
/// - `SKYLIGHT_WAREHOUSE_TIMEOUT_SECS`: per-query deadline (default: 30)
#[derive(Clone)]
pub struct WarehouseConfig {
    /// BigQuery project id.
    pub project: String,

    /// Bearer token for the BigQuery REST API.
    pub access_token: Option<SecretString>,

    /// Per-query deadline.
    pub timeout: Duration,

    /// Bounded attempts for retryable errors.
    pub retry_attempts: u32,

    /// Fixed backoff between attempts.
    pub retry_backoff: Duration,
}

impl std::fmt::Debug for WarehouseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WarehouseConfig")
            .field("project", &self.project)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("timeout", &self.timeout)
            .field("retry_attempts", &self.retry_attempts)
            .field("retry_backoff", &self.retry_backoff)
            .finish()
    }
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            project: String::new(),
            access_token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
        }
    }
}

impl WarehouseConfig {
    pub fn from_env() -> Self {
        Self {
            project: std::env::var("SKYLIGHT_BQ_PROJECT").unwrap_or_default(),
            access_token: std::env::var("SKYLIGHT_GCP_ACCESS_TOKEN")
                .ok()
                .filter(|t| !t.trim().is_empty())
                .map(|t| SecretString::new(t.into())),
            timeout: Duration::from_secs(env_parse(
                "SKYLIGHT_WAREHOUSE_TIMEOUT_SECS",
                DEFAULT_TIMEOUT_SECS,
            )),
            retry_attempts: env_parse("SKYLIGHT_GATEWAY_RETRY_ATTEMPTS", DEFAULT_RETRY_ATTEMPTS),
            retry_backoff: Duration::from_millis(env_parse(
                "SKYLIGHT_GATEWAY_RETRY_BACKOFF_MS",
                DEFAULT_RETRY_BACKOFF_MS,
            )),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_config_defaults() {
        let config = StoreConfig::default();
        assert!(!config.has_bucket());
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.retry_attempts, 3);
        assert!(config.require_token().is_err());
    }

    #[test]
    fn test_store_config_debug_redacts_token() {
        let config = StoreConfig {
            bucket: "analytics-cache".to_string(),
            access_token: Some(SecretString::new("ya29.secret".to_string().into())),
            ..Default::default()
        };
        let debug = format!("{:?}", config);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("ya29.secret"));
    }

    #[test]
    fn test_require_token_rejects_blank() {
        let config = StoreConfig {
            access_token: Some(SecretString::new("   ".to_string().into())),
            ..Default::default()
        };
        assert!(config.require_token().is_err());
    }
}
