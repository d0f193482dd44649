//! Session manager: issue, validate, revoke, and sweep login sessions.
//!
//! Session records persist as JSON under the sessions prefix so any web
//! instance can validate a token issued by another. Validation goes through
//! a short-TTL in-process read cache to avoid an object-store round trip on
//! every authenticated request.
//!
//! Expiry is lazy: a record past its expiry is treated as absent everywhere,
//! but nothing is required to delete it eagerly. The optional
//! [`SessionManager::sweep_expired`] reaper cleans up in the background.

use dashmap::DashMap;
use skylight_core::{
    AuthError, Clock, Role, SessionRecord, SkylightResult, SystemClock, Timestamp,
};
use skylight_store::ObjectStore;
use std::sync::Arc;

use crate::config::AuthConfig;
use crate::token;

#[derive(Debug, Clone)]
struct CachedSession {
    record: SessionRecord,
    cached_at: Timestamp,
}

/// Issues and validates opaque session tokens backed by the object store.
pub struct SessionManager {
    store: Arc<dyn ObjectStore>,
    config: AuthConfig,
    clock: Arc<dyn Clock>,
    read_cache: DashMap<String, CachedSession>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn ObjectStore>, config: AuthConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    /// Construct with an injected clock for deterministic expiry tests.
    pub fn with_clock(
        store: Arc<dyn ObjectStore>,
        config: AuthConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            config,
            clock,
            read_cache: DashMap::new(),
        }
    }

    fn session_path(&self, token: &str) -> String {
        format!("{}{}.json", self.config.sessions_prefix, token)
    }

    /// Create a session for an authenticated user and persist it.
    ///
    /// The expiry window is `session_ttl_remembered` when `remember` is set,
    /// `session_ttl` otherwise. Persistence failures surface as errors: a
    /// session that only exists in this process would break the stateless
    /// web tier.
    pub async fn create(
        &self,
        username: &str,
        role: Role,
        remember: bool,
    ) -> SkylightResult<SessionRecord> {
        let token = token::generate(&self.config.token_secret);
        let lifetime = if remember {
            self.config.session_ttl_remembered
        } else {
            self.config.session_ttl
        };
        let now = self.clock.now();
        let record = SessionRecord::new(
            token.clone(),
            username.to_string(),
            role,
            now,
            lifetime,
            remember,
        );

        let bytes = serde_json::to_vec(&record).map_err(|e| AuthError::Persistence {
            operation: "session create".to_string(),
            reason: e.to_string(),
        })?;
        self.store
            .put(&self.session_path(&token), bytes)
            .await
            .map_err(|e| AuthError::Persistence {
                operation: "session create".to_string(),
                reason: e.to_string(),
            })?;

        self.read_cache.insert(
            token,
            CachedSession {
                record: record.clone(),
                cached_at: now,
            },
        );

        tracing::info!(username, remembered = remember, "Session created");
        Ok(record)
    }

    /// Look up a session. Returns `None` for unknown, revoked, or expired
    /// tokens alike.
    ///
    /// Object-store unavailability degrades to `None` once the read-cache
    /// entry for the token is beyond its own TTL, forcing re-authentication
    /// rather than crashing the request.
    pub async fn validate(&self, token: &str) -> Option<SessionRecord> {
        if token.is_empty() {
            return None;
        }
        let now = self.clock.now();

        if let Some(cached) = self.read_cache.get(token) {
            let cache_age = now.signed_duration_since(cached.cached_at);
            if cache_age
                .to_std()
                .map(|age| age <= self.config.session_read_cache_ttl)
                .unwrap_or(true)
            {
                return active_only(cached.record.clone(), now);
            }
        }

        match self.store.get(&self.session_path(token)).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<SessionRecord>(&bytes) {
                Ok(record) => {
                    self.read_cache.insert(
                        token.to_string(),
                        CachedSession {
                            record: record.clone(),
                            cached_at: now,
                        },
                    );
                    active_only(record, now)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Corrupt session record, treating as absent");
                    None
                }
            },
            Ok(None) => {
                self.read_cache.remove(token);
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Session store unreachable, treating token as absent");
                None
            }
        }
    }

    /// Delete a session everywhere. Revoking an unknown token succeeds.
    pub async fn revoke(&self, token: &str) -> SkylightResult<()> {
        self.read_cache.remove(token);
        self.store
            .delete(&self.session_path(token))
            .await
            .map_err(|e| AuthError::Persistence {
                operation: "session revoke".to_string(),
                reason: e.to_string(),
            })?;
        tracing::info!("Session revoked");
        Ok(())
    }

    /// Delete every persisted session past its expiry. Returns how many
    /// records were removed. Unreadable records are skipped.
    pub async fn sweep_expired(&self) -> SkylightResult<usize> {
        let now = self.clock.now();
        let paths = self
            .store
            .list(&self.config.sessions_prefix)
            .await
            .map_err(skylight_core::SkylightError::from)?;

        let mut removed = 0;
        for path in paths {
            let expired = match self.store.get(&path).await {
                Ok(Some(bytes)) => serde_json::from_slice::<SessionRecord>(&bytes)
                    .map(|record| record.is_expired(now))
                    .unwrap_or(false),
                _ => false,
            };
            if expired && self.store.delete(&path).await.is_ok() {
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::info!(removed, "Swept expired sessions");
        }
        Ok(removed)
    }
}

fn active_only(record: SessionRecord, now: Timestamp) -> Option<SessionRecord> {
    if record.is_expired(now) {
        None
    } else {
        Some(record)
    }
}

// ============================================================================
// TESTS
// ============================================================================
