//! Tiered dataset cache: memory → object store → warehouse.
//!
//! The cache answers "give me dataset X at freshness Y" by walking the tiers
//! in order and populating the earlier ones on the way back:
//!
//! 1. An in-process entry within the freshness window is returned with no
//!    I/O at all.
//! 2. Otherwise the serialized envelope at the key's object path is read;
//!    a fresh copy is deserialized, promoted into memory, and returned.
//! 3. Otherwise the registered warehouse query runs. The result is written
//!    back to the object store (best-effort), promoted into memory, and
//!    returned. A warehouse failure here is fatal to the call.
//!
//! Object-store read failures degrade to a miss; write failures are logged
//! and swallowed. Concurrent misses on one key coalesce into a single
//! warehouse query; unrelated keys never contend.

use dashmap::DashMap;
use serde::Serialize;
use skylight_core::{
    CachedDataset, Clock, DataError, DatasetKey, SkylightResult, SystemClock,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::freshness::{Freshness, DEFAULT_MAX_AGE};
use crate::object_store::ObjectStore;
use crate::registry::DatasetRegistry;
use crate::warehouse::Warehouse;

/// Configuration for the tiered cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Object-store prefix for serialized dataset envelopes.
    pub data_prefix: String,
    /// Max age applied when a caller passes `Freshness::default()`.
    pub default_max_age: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            data_prefix: "cache/data/".to_string(),
            default_max_age: DEFAULT_MAX_AGE,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from environment variables.
    ///
    /// - `SKYLIGHT_CACHE_DATA_PREFIX`: envelope prefix (default: `cache/data/`)
    /// - `SKYLIGHT_CACHE_MAX_AGE_SECS`: default freshness window (default: 86400)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            data_prefix: std::env::var("SKYLIGHT_CACHE_DATA_PREFIX")
                .unwrap_or(defaults.data_prefix),
            default_max_age: std::env::var("SKYLIGHT_CACHE_MAX_AGE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.default_max_age),
        }
    }

    pub fn with_data_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.data_prefix = prefix.into();
        self
    }

    pub fn with_default_max_age(mut self, max_age: Duration) -> Self {
        self.default_max_age = max_age;
        self
    }
}

/// Snapshot of cache activity since process start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Reads served from the in-process tier.
    pub memory_hits: u64,
    /// Reads served from the object-store tier.
    pub store_hits: u64,
    /// Warehouse queries issued (cold misses plus forced refreshes).
    pub warehouse_queries: u64,
    /// Best-effort envelope writes that failed.
    pub degraded_writes: u64,
}

impl CacheStats {
    /// Fraction of reads answered without touching the warehouse.
    pub fn hit_rate(&self) -> f64 {
        let total = self.memory_hits + self.store_hits + self.warehouse_queries;
        if total == 0 {
            0.0
        } else {
            (self.memory_hits + self.store_hits) as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    memory_hits: AtomicU64,
    store_hits: AtomicU64,
    warehouse_queries: AtomicU64,
    degraded_writes: AtomicU64,
}

/// The tiered dataset cache.
///
/// Owns the in-process tier exclusively for the lifetime of the process; the
/// object-store copy is the durable source of truth shared across instances.
/// Cross-instance races on the same key are benign: both writers derive the
/// same answer from the warehouse, and last-write-wins is accepted.
pub struct DataCache {
    store: Arc<dyn ObjectStore>,
    warehouse: Arc<dyn Warehouse>,
    registry: DatasetRegistry,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    memory: DashMap<DatasetKey, CachedDataset>,
    inflight: DashMap<DatasetKey, Arc<Mutex<()>>>,
    counters: Counters,
}

impl DataCache {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        warehouse: Arc<dyn Warehouse>,
        registry: DatasetRegistry,
        config: CacheConfig,
    ) -> Self {
        Self::with_clock(store, warehouse, registry, config, Arc::new(SystemClock))
    }

    /// Construct with an injected clock for deterministic freshness tests.
    pub fn with_clock(
        store: Arc<dyn ObjectStore>,
        warehouse: Arc<dyn Warehouse>,
        registry: DatasetRegistry,
        config: CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            warehouse,
            registry,
            config,
            clock,
            memory: DashMap::new(),
            inflight: DashMap::new(),
            counters: Counters::default(),
        }
    }

    pub fn registry(&self) -> &DatasetRegistry {
        &self.registry
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The cache key for a dataset and parameter combination.
    pub fn key_for(&self, dataset: &str, params: &[String]) -> Result<DatasetKey, DataError> {
        self.registry.key_for(dataset, params)
    }

    /// Get a dataset at the requested freshness.
    pub async fn get(
        &self,
        dataset: &str,
        params: &[String],
        freshness: Freshness,
    ) -> SkylightResult<CachedDataset> {
        let spec = self.registry.get(dataset)?.clone();
        let key = self.registry.key_for(dataset, params)?;

        // Step 1: lock-free memory check.
        if !freshness.is_refresh() {
            if let Some(hit) = self.memory_lookup(&key, freshness) {
                self.counters.memory_hits.fetch_add(1, Ordering::Relaxed);
                return Ok(hit);
            }
        }

        // Slow path: serialize per key so concurrent misses coalesce into
        // one warehouse query. Unrelated keys take unrelated locks.
        let gate = self
            .inflight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _flight = gate.lock().await;

        if !freshness.is_refresh() {
            // A flight that landed while we waited may have filled memory.
            if let Some(hit) = self.memory_lookup(&key, freshness) {
                self.counters.memory_hits.fetch_add(1, Ordering::Relaxed);
                return Ok(hit);
            }

            // Step 2: object-store tier.
            if let Some(entry) = self.store_lookup(&key, freshness).await {
                self.counters.store_hits.fetch_add(1, Ordering::Relaxed);
                self.memory.insert(key, entry.clone());
                return Ok(entry);
            }
        }

        // Step 3: warehouse. Failure here is fatal to this call.
        let sql = spec.render_sql(params);
        tracing::info!(dataset, key = %key, "Fetching dataset from warehouse");
        let data = self
            .warehouse
            .query(&sql)
            .await
            .map_err(|e| DataError::Unavailable {
                dataset: dataset.to_string(),
                reason: e.to_string(),
            })?;
        self.counters.warehouse_queries.fetch_add(1, Ordering::Relaxed);

        let entry = CachedDataset::new(key.clone(), data, self.clock.now());
        self.persist(&entry).await;
        self.memory.insert(key, entry.clone());
        Ok(entry)
    }

    /// Drop the in-process entry for a key.
    ///
    /// The object-store copy is left in place so other instances keep
    /// benefiting from it until their own windows lapse.
    pub fn invalidate(&self, key: &DatasetKey) {
        if self.memory.remove(key).is_some() {
            tracing::debug!(key = %key, "Invalidated in-process cache entry");
        }
    }

    /// Warm the memory tier from the object store for every unparameterized
    /// registered dataset. Missing or unreadable envelopes are skipped.
    /// Returns the number of datasets loaded.
    pub async fn preload(&self) -> usize {
        let mut loaded = 0;
        for id in self.registry.ids() {
            let key = DatasetKey::new(id);
            if let Some(entry) = self.store_lookup(&key, Freshness::Pinned).await {
                self.memory.insert(key, entry);
                loaded += 1;
            }
        }
        tracing::info!(loaded, total = self.registry.len(), "Dataset preload complete");
        loaded
    }

    /// Cache activity counters since process start.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            memory_hits: self.counters.memory_hits.load(Ordering::Relaxed),
            store_hits: self.counters.store_hits.load(Ordering::Relaxed),
            warehouse_queries: self.counters.warehouse_queries.load(Ordering::Relaxed),
            degraded_writes: self.counters.degraded_writes.load(Ordering::Relaxed),
        }
    }

    fn memory_lookup(&self, key: &DatasetKey, freshness: Freshness) -> Option<CachedDataset> {
        let entry = self.memory.get(key)?;
        if freshness.accepts_age(entry.age(self.clock.now())) {
            Some(entry.clone())
        } else {
            None
        }
    }

    async fn store_lookup(&self, key: &DatasetKey, freshness: Freshness) -> Option<CachedDataset> {
        let path = key.object_path(&self.config.data_prefix);
        match self.store.get(&path).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<CachedDataset>(&bytes) {
                Ok(entry) if freshness.accepts_age(entry.age(self.clock.now())) => Some(entry),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!(path, error = %e, "Corrupt cache envelope, treating as miss");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                // Degraded cache: the request continues against the warehouse.
                tracing::warn!(path, error = %e, "Object store read failed, cache degraded");
                None
            }
        }
    }

    /// Best-effort envelope write. Failures leave the cache in degraded
    /// persistence mode but never fail the request.
    async fn persist(&self, entry: &CachedDataset) {
        let path = entry.key.object_path(&self.config.data_prefix);
        let bytes = match serde_json::to_vec(entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(path, error = %e, "Failed to serialize cache envelope");
                self.counters.degraded_writes.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };
        if let Err(e) = self.store.put(&path, bytes).await {
            tracing::warn!(path, error = %e, "Object store write failed, persistence degraded");
            self.counters.degraded_writes.fetch_add(1, Ordering::Relaxed);
        }
    }
}
