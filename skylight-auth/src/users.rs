//! User store: the object-store-backed credential table.
//!
//! The whole table lives in one JSON object at a well-known path and is
//! mutated read-modify-write. Concurrent admin edits are last-write-wins;
//! that is an accepted limitation of the flat-object layout, not a bug to
//! paper over with distributed locking.
//!
//! Reads go through an in-process cache refreshed on a fixed interval or
//! immediately after any local mutation, so the cache is never silently
//! stale beyond the configured bound.

use sha2::{Digest, Sha256};
use skylight_core::{
    AuthError, Clock, SkylightResult, SystemClock, Timestamp, UserRecord, UserTable,
};
use skylight_store::ObjectStore;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::{AuthConfig, PasswordScheme};

#[derive(Debug, Clone)]
struct CachedTable {
    table: UserTable,
    loaded_at: Timestamp,
}

/// Credential store over the object store gateway.
pub struct UserStore {
    store: Arc<dyn ObjectStore>,
    config: AuthConfig,
    clock: Arc<dyn Clock>,
    cache: RwLock<Option<CachedTable>>,
}

impl UserStore {
    pub fn new(store: Arc<dyn ObjectStore>, config: AuthConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn ObjectStore>,
        config: AuthConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            config,
            clock,
            cache: RwLock::new(None),
        }
    }

    /// Check a username/password pair against the table.
    ///
    /// Returns the matching record, or `None` with no hint about which
    /// field was wrong. The comparison hashes both sides first so its
    /// timing does not depend on where the credentials diverge.
    pub async fn authenticate(&self, username: &str, password: &str) -> Option<UserRecord> {
        let table = self.load_cached().await;
        let record = table.get(username)?;
        if credentials_match(self.config.password_scheme, &record.password, password) {
            Some(record.clone())
        } else {
            None
        }
    }

    /// Insert or replace a user. The record's password is supplied in
    /// plaintext and encoded per the configured scheme before persisting.
    pub async fn upsert(&self, mut record: UserRecord) -> SkylightResult<()> {
        record.password = encode_password(self.config.password_scheme, &record.password);

        let mut table = self.load_for_mutation("user upsert").await?;
        table.upsert(record.clone());
        self.persist(&table, "user upsert").await?;
        self.replace_cache(table).await;

        tracing::info!(username = %record.username, role = %record.role, "User upserted");
        Ok(())
    }

    /// Remove a user. Deleting the last admin account is rejected so the
    /// store can never lock every administrator out.
    pub async fn delete(&self, username: &str) -> SkylightResult<()> {
        let mut table = self.load_for_mutation("user delete").await?;

        let record = table.get(username).ok_or_else(|| AuthError::UserNotFound {
            username: username.to_string(),
        })?;
        if record.role.is_admin() && table.admin_count() <= 1 {
            return Err(AuthError::LastAdmin.into());
        }

        table.remove(username);
        self.persist(&table, "user delete").await?;
        self.replace_cache(table).await;

        tracing::info!(username, "User deleted");
        Ok(())
    }

    /// Every record in the table, for the admin panel.
    pub async fn list(&self) -> Vec<UserRecord> {
        self.load_cached().await.users.values().cloned().collect()
    }

    /// Look up a single record by username.
    pub async fn get(&self, username: &str) -> Option<UserRecord> {
        self.load_cached().await.get(username).cloned()
    }

    /// Drop the in-process cache so the next read reloads from the store.
    pub async fn invalidate_cache(&self) {
        *self.cache.write().await = None;
    }

    /// Read through the interval-refreshed cache.
    async fn load_cached(&self) -> UserTable {
        let now = self.clock.now();

        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                let age = now.signed_duration_since(cached.loaded_at);
                if age
                    .to_std()
                    .map(|age| age <= self.config.users_refresh_interval)
                    .unwrap_or(true)
                {
                    return cached.table.clone();
                }
            }
        }

        let table = match self.store.get(&self.config.users_path).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<UserTable>(&bytes) {
                Ok(table) => table,
                Err(e) => {
                    tracing::warn!(error = %e, "Corrupt user table, serving bootstrap defaults");
                    self.bootstrap_table()
                }
            },
            Ok(None) => {
                // First access: materialize and persist the default set.
                let table = self.bootstrap_table();
                let path = &self.config.users_path;
                match serde_json::to_vec(&table) {
                    Ok(bytes) => {
                        if let Err(e) = self.store.put(path, bytes).await {
                            tracing::warn!(error = %e, "Failed to persist bootstrap user table");
                        } else {
                            tracing::info!("Bootstrapped default user table");
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "Failed to serialize bootstrap table"),
                }
                table
            }
            Err(e) => {
                // Degraded: prefer the stale cached copy over the defaults.
                tracing::warn!(error = %e, "User table unreachable, using last known copy");
                let cache = self.cache.read().await;
                match cache.as_ref() {
                    Some(cached) => cached.table.clone(),
                    None => self.bootstrap_table(),
                }
            }
        };

        self.replace_cache(table.clone()).await;
        table
    }

    /// Read the persisted table for a read-modify-write cycle, bypassing
    /// the cache. Store failures surface: mutations must not proceed from
    /// a copy that may already be stale.
    async fn load_for_mutation(&self, operation: &str) -> SkylightResult<UserTable> {
        match self.store.get(&self.config.users_path).await {
            Ok(Some(bytes)) => {
                serde_json::from_slice(&bytes).map_err(|e| {
                    AuthError::Persistence {
                        operation: operation.to_string(),
                        reason: format!("corrupt user table: {}", e),
                    }
                    .into()
                })
            }
            Ok(None) => Ok(self.bootstrap_table()),
            Err(e) => Err(AuthError::Persistence {
                operation: operation.to_string(),
                reason: e.to_string(),
            }
            .into()),
        }
    }

    async fn persist(&self, table: &UserTable, operation: &str) -> SkylightResult<()> {
        let bytes = serde_json::to_vec(table).map_err(|e| AuthError::Persistence {
            operation: operation.to_string(),
            reason: e.to_string(),
        })?;
        self.store
            .put(&self.config.users_path, bytes)
            .await
            .map_err(|e| AuthError::Persistence {
                operation: operation.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn replace_cache(&self, table: UserTable) {
        *self.cache.write().await = Some(CachedTable {
            table,
            loaded_at: self.clock.now(),
        });
    }

    /// The default account set, with passwords encoded per the scheme.
    fn bootstrap_table(&self) -> UserTable {
        let mut table = UserTable::bootstrap();
        if self.config.password_scheme == PasswordScheme::Sha256 {
            for record in table.users.values_mut() {
                record.password = encode_password(PasswordScheme::Sha256, &record.password);
            }
        }
        table
    }
}

/// Encode a plaintext password for storage under the given scheme.
fn encode_password(scheme: PasswordScheme, plaintext: &str) -> String {
    match scheme {
        PasswordScheme::Plain => plaintext.to_string(),
        PasswordScheme::Sha256 => hex::encode(Sha256::digest(plaintext.as_bytes())),
    }
}

/// Compare a presented password against the stored credential.
///
/// Both sides are reduced to sha-256 digests before comparison, so the
/// equality check's timing carries no information about how much of the
/// credential matched.
fn credentials_match(scheme: PasswordScheme, stored: &str, presented: &str) -> bool {
    match scheme {
        PasswordScheme::Plain => {
            Sha256::digest(stored.as_bytes()) == Sha256::digest(presented.as_bytes())
        }
        PasswordScheme::Sha256 => match hex::decode(stored) {
            Ok(stored_digest) => {
                stored_digest.as_slice() == Sha256::digest(presented.as_bytes()).as_slice()
            }
            Err(_) => false,
        },
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use skylight_core::entities::{DEFAULT_ADMIN_PASSWORD, DEFAULT_ADMIN_USERNAME};
    use skylight_core::{ManualClock, Role, ViewAccess};
    use skylight_store::MemoryStore;

    fn store_over(
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
    ) -> UserStore {
        UserStore::with_clock(store, AuthConfig::default(), clock)
    }

    fn new_user(username: &str, password: &str, role: Role) -> UserRecord {
        UserRecord {
            username: username.to_string(),
            password: password.to_string(),
            role,
            display_name: username.to_string(),
            views: ViewAccess::All,
        }
    }

    #[tokio::test]
    async fn test_bootstrap_authenticates_default_admin() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let users = store_over(store.clone(), clock);

        let record = users
            .authenticate(DEFAULT_ADMIN_USERNAME, DEFAULT_ADMIN_PASSWORD)
            .await
            .unwrap();
        assert_eq!(record.role, Role::Admin);

        assert!(users.authenticate("admin", "wrong").await.is_none());
        assert!(users.authenticate("ghost", "admin123").await.is_none());

        // First access persisted the defaults.
        assert!(store.contains("cache/users.json").await);
    }

    #[tokio::test]
    async fn test_usernames_are_case_sensitive() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let users = store_over(store, clock);

        assert!(users.authenticate("Admin", "admin123").await.is_none());
    }

    #[tokio::test]
    async fn test_upsert_round_trips_after_forced_reload() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let users = store_over(store, clock);

        let record = new_user("analyst", "s3cret", Role::ReadOnly);
        users.upsert(record.clone()).await.unwrap();

        users.invalidate_cache().await;
        let loaded = users.authenticate("analyst", "s3cret").await.unwrap();
        assert_eq!(loaded, record);
    }

    #[tokio::test]
    async fn test_mutation_visible_immediately() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let users = store_over(store, clock);

        // Prime the cache, then mutate; the next read must see the change
        // without waiting out the refresh interval.
        assert!(users.authenticate("analyst", "pw").await.is_none());
        users.upsert(new_user("analyst", "pw", Role::ReadOnly)).await.unwrap();
        assert!(users.authenticate("analyst", "pw").await.is_some());

        users.delete("analyst").await.unwrap();
        assert!(users.authenticate("analyst", "pw").await.is_none());
    }

    #[tokio::test]
    async fn test_interval_refresh_picks_up_external_writes() {
        let shared = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));

        let ours = store_over(shared.clone(), clock.clone());
        let theirs = store_over(shared, clock.clone());

        // Another instance adds a user; our cache is warm and does not see
        // it until the refresh interval lapses.
        ours.authenticate("admin", "admin123").await.unwrap();
        theirs.upsert(new_user("late", "pw", Role::ReadOnly)).await.unwrap();
        assert!(ours.authenticate("late", "pw").await.is_none());

        clock.advance_secs(301);
        assert!(ours.authenticate("late", "pw").await.is_some());
    }

    #[tokio::test]
    async fn test_delete_unknown_user_errors() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let users = store_over(store, clock);

        let err = users.delete("ghost").await.unwrap_err();
        assert!(matches!(
            err,
            skylight_core::SkylightError::Auth(AuthError::UserNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_last_admin_cannot_be_deleted() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let users = store_over(store, clock);

        let err = users.delete("admin").await.unwrap_err();
        assert!(matches!(
            err,
            skylight_core::SkylightError::Auth(AuthError::LastAdmin)
        ));

        // With a second admin in place the original becomes deletable.
        users.upsert(new_user("admin2", "pw", Role::Admin)).await.unwrap();
        users.delete("admin").await.unwrap();
    }

    #[tokio::test]
    async fn test_mutations_surface_store_failures() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let users = store_over(store.clone(), clock);

        store.set_available(false);
        let err = users
            .upsert(new_user("analyst", "pw", Role::ReadOnly))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            skylight_core::SkylightError::Auth(AuthError::Persistence { .. })
        ));
    }

    #[tokio::test]
    async fn test_outage_serves_last_known_copy() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let users = store_over(store.clone(), clock.clone());

        users.upsert(new_user("analyst", "pw", Role::ReadOnly)).await.unwrap();
        users.authenticate("analyst", "pw").await.unwrap();

        // Store dies and the cache ages out; logins keep working off the
        // last known table instead of resetting to defaults.
        store.set_available(false);
        clock.advance_secs(301);
        assert!(users.authenticate("analyst", "pw").await.is_some());
    }

    #[tokio::test]
    async fn test_sha256_scheme_stores_digests() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let config = AuthConfig {
            password_scheme: PasswordScheme::Sha256,
            ..Default::default()
        };
        let users = UserStore::with_clock(store.clone(), config, clock);

        users.upsert(new_user("analyst", "s3cret", Role::ReadOnly)).await.unwrap();

        // Plaintext authenticates; the stored bytes never contain it.
        assert!(users.authenticate("analyst", "s3cret").await.is_some());
        assert!(users.authenticate("analyst", "wrong").await.is_none());

        let bytes = store.get("cache/users.json").await.unwrap().unwrap();
        let raw = String::from_utf8(bytes).unwrap();
        assert!(!raw.contains("s3cret"));

        // Defaults are digests too under this scheme.
        assert!(users.authenticate("admin", "admin123").await.is_some());
    }

    #[test]
    fn test_credentials_match_plain_and_sha256() {
        assert!(credentials_match(PasswordScheme::Plain, "pw", "pw"));
        assert!(!credentials_match(PasswordScheme::Plain, "pw", "pW"));

        let digest = encode_password(PasswordScheme::Sha256, "pw");
        assert!(credentials_match(PasswordScheme::Sha256, &digest, "pw"));
        assert!(!credentials_match(PasswordScheme::Sha256, &digest, "other"));
        assert!(!credentials_match(PasswordScheme::Sha256, "not-hex", "pw"));
    }

    #[tokio::test]
    async fn test_list_returns_all_records() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let users = store_over(store, clock);

        users.upsert(new_user("analyst", "pw", Role::ReadOnly)).await.unwrap();
        let listed = users.list().await;
        let names: Vec<&str> = listed.iter().map(|u| u.username.as_str()).collect();
        assert!(names.contains(&"admin"));
        assert!(names.contains(&"viewer"));
        assert!(names.contains(&"analyst"));
    }
}
