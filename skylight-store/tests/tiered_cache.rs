//! Concurrency tests for the tiered dataset cache.

use async_trait::async_trait;
use serde_json::json;
use skylight_core::{GatewayError, TableData};
use skylight_store::{
    CacheConfig, DataCache, DatasetRegistry, DatasetSpec, Freshness, MemoryStore,
    MemoryWarehouse, Warehouse,
};
use std::sync::Arc;
use std::time::Duration;

const MASTER_SQL: &str = "SELECT * FROM metrics.final";
const PLAN_SQL: &str = "SELECT * FROM metrics.plans";

/// Wraps a warehouse with an artificial delay so concurrent requests really
/// overlap inside the fetch instead of winning by being first.
struct SlowWarehouse {
    inner: MemoryWarehouse,
    delay: Duration,
}

#[async_trait]
impl Warehouse for SlowWarehouse {
    async fn query(&self, sql: &str) -> Result<TableData, GatewayError> {
        tokio::time::sleep(self.delay).await;
        self.inner.query(sql).await
    }
}

fn sample_table() -> TableData {
    TableData::new(
        vec!["plan".to_string(), "value".to_string()],
        vec![vec![json!("JF2788ST"), json!(42.0)]],
    )
}

fn registry() -> DatasetRegistry {
    let mut registry = DatasetRegistry::new();
    registry.register(DatasetSpec::new("master", MASTER_SQL));
    registry.register(DatasetSpec::new("plans", PLAN_SQL));
    registry
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_cold_gets_coalesce_into_one_query() {
    let warehouse = MemoryWarehouse::new();
    warehouse.set_result(MASTER_SQL, sample_table());
    let slow = Arc::new(SlowWarehouse {
        inner: warehouse,
        delay: Duration::from_millis(50),
    });

    let cache = Arc::new(DataCache::new(
        Arc::new(MemoryStore::new()),
        slow.clone(),
        registry(),
        CacheConfig::default(),
    ));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let cache = cache.clone();
        handles.push(tokio::spawn(async move {
            cache.get("master", &[], Freshness::default()).await.unwrap()
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    // Single-flight: one warehouse query, identical results for every caller.
    assert_eq!(slow.inner.query_count(), 1);
    for result in &results {
        assert_eq!(result.data, results[0].data);
        assert_eq!(result.fetched_at, results[0].fetched_at);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unrelated_keys_fetch_independently() {
    let warehouse = MemoryWarehouse::new();
    warehouse.set_result(MASTER_SQL, sample_table());
    warehouse.set_result(PLAN_SQL, TableData::default());
    let slow = Arc::new(SlowWarehouse {
        inner: warehouse,
        delay: Duration::from_millis(20),
    });

    let cache = Arc::new(DataCache::new(
        Arc::new(MemoryStore::new()),
        slow.clone(),
        registry(),
        CacheConfig::default(),
    ));

    let a = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.get("master", &[], Freshness::default()).await })
    };
    let b = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.get("plans", &[], Freshness::default()).await })
    };

    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    // One query per key: the keys never share a flight.
    assert_eq!(slow.inner.query_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn followers_after_invalidate_reread_persisted_tier() {
    let store = Arc::new(MemoryStore::new());
    let warehouse = MemoryWarehouse::new();
    warehouse.set_result(MASTER_SQL, sample_table());
    let slow = Arc::new(SlowWarehouse {
        inner: warehouse,
        delay: Duration::from_millis(10),
    });

    let cache = Arc::new(DataCache::new(
        store,
        slow.clone(),
        registry(),
        CacheConfig::default(),
    ));

    cache.get("master", &[], Freshness::default()).await.unwrap();
    let key = cache.key_for("master", &[]).unwrap();
    cache.invalidate(&key);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = cache.clone();
        handles.push(tokio::spawn(async move {
            cache.get("master", &[], Freshness::default()).await.unwrap()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().data, sample_table());
    }

    // The object-store copy satisfied the re-reads; no second warehouse trip.
    assert_eq!(slow.inner.query_count(), 1);
}
