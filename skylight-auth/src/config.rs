//! Authentication configuration.

use secrecy::{ExposeSecret, SecretString};
use skylight_core::ConfigError;
use std::str::FromStr;
use std::time::Duration;

const INSECURE_DEFAULT_SECRET: &str = "INSECURE_DEFAULT_SECRET_CHANGE_IN_PRODUCTION";

const DEFAULT_SESSION_TTL_SECS: u64 = 86_400; // 1 day
const DEFAULT_SESSION_TTL_REMEMBER_SECS: u64 = 2_592_000; // 30 days
const DEFAULT_SESSION_READ_CACHE_SECS: u64 = 60;
const DEFAULT_USERS_REFRESH_SECS: u64 = 300;

/// How credentials are stored in the user table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PasswordScheme {
    /// Credentials stored as-is. The bootstrap defaults use this; it is a
    /// documented weak default, not an oversight.
    #[default]
    Plain,

    /// Credentials stored as sha-256 hex digests.
    Sha256,
}

impl PasswordScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            PasswordScheme::Plain => "plain",
            PasswordScheme::Sha256 => "sha256",
        }
    }
}

impl FromStr for PasswordScheme {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plain" => Ok(PasswordScheme::Plain),
            "sha256" => Ok(PasswordScheme::Sha256),
            other => Err(ConfigError::InvalidValue {
                field: "SKYLIGHT_PASSWORD_SCHEME".to_string(),
                value: other.to_string(),
                reason: "expected 'plain' or 'sha256'".to_string(),
            }),
        }
    }
}

/// Session and user store configuration.
///
/// # Environment Variables
/// - `SKYLIGHT_SESSION_TTL_SECS`: default session lifetime (default: 86400)
/// - `SKYLIGHT_SESSION_TTL_REMEMBER_SECS`: remember-me lifetime
///   (default: 2592000)
/// - `SKYLIGHT_SESSION_READ_CACHE_SECS`: in-process session read-cache TTL
///   (default: 60)
/// - `SKYLIGHT_USERS_REFRESH_SECS`: user-table cache refresh interval
///   (default: 300)
/// - `SKYLIGHT_PASSWORD_SCHEME`: "plain" or "sha256" (default: plain)
/// - `SKYLIGHT_TOKEN_SECRET`: secret mixed into session token generation;
///   rotating it changes the token namespace for new sessions
/// - `SKYLIGHT_SESSIONS_PREFIX`: object prefix for session records
///   (default: `cache/sessions/`)
/// - `SKYLIGHT_USERS_PATH`: object path of the user table
///   (default: `cache/users.json`)
#[derive(Clone)]
pub struct AuthConfig {
    pub session_ttl: Duration,
    pub session_ttl_remembered: Duration,
    pub session_read_cache_ttl: Duration,
    pub users_refresh_interval: Duration,
    pub password_scheme: PasswordScheme,
    pub token_secret: SecretString,
    pub sessions_prefix: String,
    pub users_path: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("session_ttl", &self.session_ttl)
            .field("session_ttl_remembered", &self.session_ttl_remembered)
            .field("session_read_cache_ttl", &self.session_read_cache_ttl)
            .field("users_refresh_interval", &self.users_refresh_interval)
            .field("password_scheme", &self.password_scheme)
            .field("token_secret", &"[REDACTED]")
            .field("sessions_prefix", &self.sessions_prefix)
            .field("users_path", &self.users_path)
            .finish()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            session_ttl_remembered: Duration::from_secs(DEFAULT_SESSION_TTL_REMEMBER_SECS),
            session_read_cache_ttl: Duration::from_secs(DEFAULT_SESSION_READ_CACHE_SECS),
            users_refresh_interval: Duration::from_secs(DEFAULT_USERS_REFRESH_SECS),
            password_scheme: PasswordScheme::default(),
            token_secret: SecretString::new(INSECURE_DEFAULT_SECRET.to_string().into()),
            sessions_prefix: "cache/sessions/".to_string(),
            users_path: "cache/users.json".to_string(),
        }
    }
}

impl AuthConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            session_ttl: Duration::from_secs(env_parse(
                "SKYLIGHT_SESSION_TTL_SECS",
                DEFAULT_SESSION_TTL_SECS,
            )),
            session_ttl_remembered: Duration::from_secs(env_parse(
                "SKYLIGHT_SESSION_TTL_REMEMBER_SECS",
                DEFAULT_SESSION_TTL_REMEMBER_SECS,
            )),
            session_read_cache_ttl: Duration::from_secs(env_parse(
                "SKYLIGHT_SESSION_READ_CACHE_SECS",
                DEFAULT_SESSION_READ_CACHE_SECS,
            )),
            users_refresh_interval: Duration::from_secs(env_parse(
                "SKYLIGHT_USERS_REFRESH_SECS",
                DEFAULT_USERS_REFRESH_SECS,
            )),
            password_scheme: std::env::var("SKYLIGHT_PASSWORD_SCHEME")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            token_secret: std::env::var("SKYLIGHT_TOKEN_SECRET")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(|s| SecretString::new(s.into()))
                .unwrap_or(defaults.token_secret),
            sessions_prefix: std::env::var("SKYLIGHT_SESSIONS_PREFIX")
                .unwrap_or(defaults.sessions_prefix),
            users_path: std::env::var("SKYLIGHT_USERS_PATH").unwrap_or(defaults.users_path),
        }
    }

    /// Whether the token secret is still the shipped default.
    pub fn is_insecure_default_secret(&self) -> bool {
        self.token_secret.expose_secret() == INSECURE_DEFAULT_SECRET
    }

    /// Refuse to start a production deployment on the default secret.
    /// Development deployments get a warning and continue.
    pub fn validate_for_production(&self) -> Result<(), ConfigError> {
        let environment = std::env::var("SKYLIGHT_ENVIRONMENT")
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase();
        let is_production = environment == "production" || environment == "prod";

        if self.is_insecure_default_secret() {
            if is_production {
                return Err(ConfigError::InvalidValue {
                    field: "SKYLIGHT_TOKEN_SECRET".to_string(),
                    value: "<default>".to_string(),
                    reason: "cannot run production with the default token secret".to_string(),
                });
            }
            tracing::warn!(
                "Using the default token secret. Set SKYLIGHT_TOKEN_SECRET before deploying."
            );
        }
        Ok(())
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
    fn test_defaults_match_session_windows() {
        let config = AuthConfig::default();
        assert_eq!(config.session_ttl, Duration::from_secs(86_400));
        assert_eq!(config.session_ttl_remembered, Duration::from_secs(2_592_000));
        assert_eq!(config.users_refresh_interval, Duration::from_secs(300));
        assert_eq!(config.password_scheme, PasswordScheme::Plain);
        assert!(config.is_insecure_default_secret());
    }

    #[test]
    fn test_password_scheme_parsing() {
        assert_eq!("plain".parse::<PasswordScheme>().unwrap(), PasswordScheme::Plain);
        assert_eq!("SHA256".parse::<PasswordScheme>().unwrap(), PasswordScheme::Sha256);
        assert!("bcrypt".parse::<PasswordScheme>().is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = AuthConfig {
            token_secret: SecretString::new("super-secret-value".to_string().into()),
            ..Default::default()
        };
        let debug = format!("{:?}", config);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("super-secret-value"));
    }
}
