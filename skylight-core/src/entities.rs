//! Entity types for the Skylight data and auth layers.
//!
//! Everything persisted through the object store round-trips through these
//! types: cached dataset envelopes, the user table, and session records.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Number of hex characters kept from a parameter fingerprint digest.
const FINGERPRINT_LEN: usize = 16;

/// Compute a stable fingerprint for a set of query parameters.
///
/// Parameters are joined with `\x1f` (unit separator) before hashing so that
/// `["ab", "c"]` and `["a", "bc"]` produce distinct digests.
pub fn params_fingerprint<I, S>(params: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = Sha256::new();
    for (i, part) in params.into_iter().enumerate() {
        if i > 0 {
            hasher.update([0x1f]);
        }
        hasher.update(part.as_ref().as_bytes());
    }
    let digest = hasher.finalize();
    hex::encode(digest)[..FINGERPRINT_LEN].to_string()
}

// ============================================================================
// DATASETS
// ============================================================================

/// Stable identity of a cacheable dataset.
///
/// A key is the registered dataset id plus an optional fingerprint of the
/// query parameters. The same id + parameters always produce the same key,
/// which maps deterministically to one object-store path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetKey {
    dataset: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fingerprint: Option<String>,
}

impl DatasetKey {
    /// Key for an unparameterized dataset.
    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            fingerprint: None,
        }
    }

    /// Key for a dataset with a parameter combination.
    pub fn with_params<I, S>(dataset: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            dataset: dataset.into(),
            fingerprint: Some(params_fingerprint(params)),
        }
    }

    /// The registered dataset id this key belongs to.
    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    /// The parameter fingerprint, if the key is parameterized.
    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    /// The object-store path for this key under the given cache prefix.
    pub fn object_path(&self, prefix: &str) -> String {
        match &self.fingerprint {
            Some(fp) => format!("{}{}_{}.json", prefix, self.dataset, fp),
            None => format!("{}{}.json", prefix, self.dataset),
        }
    }
}

impl fmt::Display for DatasetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.fingerprint {
            Some(fp) => write!(f, "{}:{}", self.dataset, fp),
            None => write!(f, "{}", self.dataset),
        }
    }
}

/// Tabular payload: ordered columns plus row-major cells.
///
/// Cells are `serde_json::Value` so a single type covers every warehouse
/// column type the dashboards consume (strings, numbers, dates, nulls).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableData {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl TableData {
    /// Build a table from column names and rows.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<serde_json::Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a named column, if present.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All values of a named column, in row order.
    pub fn column_values(&self, name: &str) -> Option<Vec<&serde_json::Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().filter_map(|row| row.get(idx)).collect())
    }
}

/// A dataset as held in the cache tiers.
///
/// `fetched_at` is when the payload was derived from the warehouse, not when
/// it entered the current tier; freshness decisions compare against it.
/// Replace-whole-object semantics: an entry is never partially updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedDataset {
    pub key: DatasetKey,
    pub data: TableData,
    pub fetched_at: Timestamp,
}

impl CachedDataset {
    pub fn new(key: DatasetKey, data: TableData, fetched_at: Timestamp) -> Self {
        Self {
            key,
            data,
            fetched_at,
        }
    }

    /// Age of the payload relative to `now`.
    pub fn age(&self, now: Timestamp) -> Duration {
        now.signed_duration_since(self.fetched_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Whether the payload is within `max_age` as of `now`.
    pub fn is_fresh(&self, max_age: Duration, now: Timestamp) -> bool {
        self.age(now) <= max_age
    }
}

// ============================================================================
// USERS
// ============================================================================

/// User role. Closed set; admins hold every permission read-only users do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    ReadOnly,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::ReadOnly => "readonly",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "readonly" | "read_only" => Ok(Role::ReadOnly),
            _ => Err(RoleParseError(s.to_string())),
        }
    }
}

/// Error when parsing an invalid role string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleParseError(pub String);

impl fmt::Display for RoleParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid role: {}", self.0)
    }
}

impl std::error::Error for RoleParseError {}

/// Which dashboard views a user may open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewAccess {
    /// Every view, including ones registered later.
    All,
    /// Only the named views.
    Selected(Vec<String>),
}

impl ViewAccess {
    pub fn allows(&self, view: &str) -> bool {
        match self {
            ViewAccess::All => true,
            ViewAccess::Selected(views) => views.iter().any(|v| v == view),
        }
    }
}

impl Default for ViewAccess {
    fn default() -> Self {
        ViewAccess::All
    }
}

/// One user in the credential store.
///
/// `password` holds either the plaintext credential or its sha-256 hex
/// digest, depending on the configured password scheme. Usernames are
/// case-sensitive unique within a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    pub password: String,
    pub role: Role,
    pub display_name: String,
    #[serde(default)]
    pub views: ViewAccess,
}

/// Well-known default accounts materialized on first access when no
/// persisted table exists. Documented, not secret.
pub const DEFAULT_ADMIN_USERNAME: &str = "admin";
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";
pub const DEFAULT_VIEWER_USERNAME: &str = "viewer";
pub const DEFAULT_VIEWER_PASSWORD: &str = "viewer123";

/// The whole user table, persisted as one JSON object.
///
/// `BTreeMap` keeps the serialized form stable across round trips, which
/// makes read-modify-write diffs in the object store reviewable.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserTable {
    pub users: BTreeMap<String, UserRecord>,
}

impl UserTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The fixed default account set used to bootstrap an empty store.
    pub fn bootstrap() -> Self {
        let mut users = BTreeMap::new();
        users.insert(
            DEFAULT_ADMIN_USERNAME.to_string(),
            UserRecord {
                username: DEFAULT_ADMIN_USERNAME.to_string(),
                password: DEFAULT_ADMIN_PASSWORD.to_string(),
                role: Role::Admin,
                display_name: "Administrator".to_string(),
                views: ViewAccess::All,
            },
        );
        users.insert(
            DEFAULT_VIEWER_USERNAME.to_string(),
            UserRecord {
                username: DEFAULT_VIEWER_USERNAME.to_string(),
                password: DEFAULT_VIEWER_PASSWORD.to_string(),
                role: Role::ReadOnly,
                display_name: "Viewer User".to_string(),
                views: ViewAccess::Selected(vec!["overview".to_string()]),
            },
        );
        Self { users }
    }

    pub fn get(&self, username: &str) -> Option<&UserRecord> {
        self.users.get(username)
    }

    /// Insert or replace a record, keyed by its username.
    pub fn upsert(&mut self, record: UserRecord) {
        self.users.insert(record.username.clone(), record);
    }

    pub fn remove(&mut self, username: &str) -> Option<UserRecord> {
        self.users.remove(username)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Number of admin accounts in the table.
    pub fn admin_count(&self) -> usize {
        self.users.values().filter(|u| u.role.is_admin()).count()
    }
}

// ============================================================================
// SESSIONS
// ============================================================================

/// A persisted login session.
///
/// The token is opaque and unguessable; the record snapshots the role at
/// login so per-request validation does not touch the user table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub token: String,
    pub username: String,
    pub role: Role,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    pub remembered: bool,
}

impl SessionRecord {
    /// Build a record expiring `lifetime` after `created_at`.
    pub fn new(
        token: String,
        username: String,
        role: Role,
        created_at: Timestamp,
        lifetime: Duration,
        remembered: bool,
    ) -> Self {
        let expires_at = created_at
            + ChronoDuration::from_std(lifetime).unwrap_or_else(|_| ChronoDuration::days(1));
        Self {
            token,
            username,
            role,
            created_at,
            expires_at,
            remembered,
        }
    }

    /// Session state as of `now`. `Expired` is terminal: a record past its
    /// expiry is treated as absent whether or not it still exists in storage.
    pub fn state(&self, now: Timestamp) -> SessionState {
        if now > self.expires_at {
            SessionState::Expired
        } else {
            SessionState::Active
        }
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.state(now) == SessionState::Expired
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Active,
    Expired,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_params_fingerprint_is_stable() {
        let a = params_fingerprint(["2024-01-01", "7K", "Active"]);
        let b = params_fingerprint(["2024-01-01", "7K", "Active"]);
        assert_eq!(a, b);
        assert_eq!(a.len(), FINGERPRINT_LEN);
    }

    #[test]
    fn test_params_fingerprint_separates_parts() {
        // Joined text is identical; the separator must keep them apart.
        let a = params_fingerprint(["ab", "c"]);
        let b = params_fingerprint(["a", "bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_dataset_key_object_path() {
        let plain = DatasetKey::new("master");
        assert_eq!(plain.object_path("cache/data/"), "cache/data/master.json");

        let keyed = DatasetKey::with_params("pivot", ["2024-01-01", "7K"]);
        let path = keyed.object_path("cache/data/");
        assert!(path.starts_with("cache/data/pivot_"));
        assert!(path.ends_with(".json"));
    }

    #[test]
    fn test_dataset_key_equality() {
        let a = DatasetKey::with_params("pivot", ["x", "y"]);
        let b = DatasetKey::with_params("pivot", ["x", "y"]);
        let c = DatasetKey::with_params("pivot", ["x", "z"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_table_data_column_access() {
        let table = TableData::new(
            vec!["app".to_string(), "value".to_string()],
            vec![
                vec![serde_json::json!("AT"), serde_json::json!(10)],
                vec![serde_json::json!("CL"), serde_json::json!(20)],
            ],
        );

        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.num_columns(), 2);
        assert_eq!(table.column_index("value"), Some(1));
        assert_eq!(table.column_index("missing"), None);

        let values = table.column_values("value").unwrap();
        assert_eq!(values, vec![&serde_json::json!(10), &serde_json::json!(20)]);
    }

    #[test]
    fn test_cached_dataset_freshness() {
        let now = Utc::now();
        let entry = CachedDataset::new(
            DatasetKey::new("master"),
            TableData::default(),
            now - ChronoDuration::seconds(90),
        );

        assert!(entry.is_fresh(Duration::from_secs(120), now));
        assert!(!entry.is_fresh(Duration::from_secs(60), now));
        assert!(entry.age(now) >= Duration::from_secs(90));
    }

    #[test]
    fn test_role_round_trip() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("readonly".parse::<Role>().unwrap(), Role::ReadOnly);
        assert_eq!("read_only".parse::<Role>().unwrap(), Role::ReadOnly);
        assert!("root".parse::<Role>().is_err());
        assert_eq!(Role::Admin.to_string(), "admin");
    }

    #[test]
    fn test_view_access_allows() {
        assert!(ViewAccess::All.allows("anything"));

        let selected = ViewAccess::Selected(vec!["overview".to_string()]);
        assert!(selected.allows("overview"));
        assert!(!selected.allows("cohorts"));
    }

    #[test]
    fn test_user_table_bootstrap_defaults() {
        let table = UserTable::bootstrap();
        assert_eq!(table.len(), 2);

        let admin = table.get(DEFAULT_ADMIN_USERNAME).unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert_eq!(admin.password, DEFAULT_ADMIN_PASSWORD);
        assert_eq!(admin.views, ViewAccess::All);

        let viewer = table.get(DEFAULT_VIEWER_USERNAME).unwrap();
        assert_eq!(viewer.role, Role::ReadOnly);
        assert_eq!(table.admin_count(), 1);
    }

    #[test]
    fn test_user_table_usernames_case_sensitive() {
        let mut table = UserTable::bootstrap();
        table.upsert(UserRecord {
            username: "Admin".to_string(),
            password: "other".to_string(),
            role: Role::ReadOnly,
            display_name: "Not the admin".to_string(),
            views: ViewAccess::All,
        });

        assert_eq!(table.len(), 3);
        assert_eq!(table.get("admin").unwrap().role, Role::Admin);
        assert_eq!(table.get("Admin").unwrap().role, Role::ReadOnly);
    }

    #[test]
    fn test_session_record_expiry_windows() {
        let created = Utc::now();
        let short = SessionRecord::new(
            "tok".to_string(),
            "admin".to_string(),
            Role::Admin,
            created,
            Duration::from_secs(86_400),
            false,
        );

        assert_eq!(short.state(created), SessionState::Active);
        assert_eq!(
            short.state(created + ChronoDuration::hours(23)),
            SessionState::Active
        );
        assert_eq!(
            short.state(created + ChronoDuration::hours(24) + ChronoDuration::seconds(1)),
            SessionState::Expired
        );

        let long = SessionRecord::new(
            "tok2".to_string(),
            "admin".to_string(),
            Role::Admin,
            created,
            Duration::from_secs(30 * 86_400),
            true,
        );
        assert_eq!(
            long.state(created + ChronoDuration::days(29)),
            SessionState::Active
        );
        assert_eq!(
            long.state(created + ChronoDuration::days(30) + ChronoDuration::seconds(1)),
            SessionState::Expired
        );
    }

    #[test]
    fn test_session_record_serde_round_trip() {
        let record = SessionRecord::new(
            "abc123".to_string(),
            "viewer".to_string(),
            Role::ReadOnly,
            Utc::now(),
            Duration::from_secs(3600),
            false,
        );

        let bytes = serde_json::to_vec(&record).unwrap();
        let decoded: SessionRecord = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded, record);
    }

    proptest! {
        #[test]
        fn prop_fingerprint_deterministic(parts in proptest::collection::vec("[a-z0-9]{1,12}", 0..6)) {
            let a = params_fingerprint(parts.iter());
            let b = params_fingerprint(parts.iter());
            prop_assert_eq!(a, b);
        }

        #[test]
        fn prop_table_serde_round_trip(rows in proptest::collection::vec(
            proptest::collection::vec(any::<i64>(), 2..4), 0..8)
        ) {
            let table = TableData::new(
                vec!["a".to_string(), "b".to_string(), "c".to_string()],
                rows.into_iter()
                    .map(|row| row.into_iter().map(serde_json::Value::from).collect())
                    .collect(),
            );
            let bytes = serde_json::to_vec(&table).unwrap();
            let decoded: TableData = serde_json::from_slice(&bytes).unwrap();
            prop_assert_eq!(decoded, table);
        }
    }
}
