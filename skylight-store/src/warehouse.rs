//! Warehouse gateway trait and the in-memory implementation.

use async_trait::async_trait;
use skylight_core::{GatewayError, TableData};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;

/// Columnar query engine contract: SQL in, tabular rows out.
#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn query(&self, sql: &str) -> Result<TableData, GatewayError>;
}

/// In-memory warehouse with canned results, keyed by exact SQL text.
///
/// Counts queries so tests can assert the single-flight property, and has an
/// availability switch for the fatal-on-warehouse-failure paths.
#[derive(Debug)]
pub struct MemoryWarehouse {
    results: RwLock<HashMap<String, TableData>>,
    query_count: AtomicU64,
    available: AtomicBool,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self {
            results: RwLock::new(HashMap::new()),
            query_count: AtomicU64::new(0),
            available: AtomicBool::new(true),
        }
    }

    /// Register the result returned for an exact SQL string.
    pub fn set_result(&self, sql: impl Into<String>, data: TableData) {
        if let Ok(mut results) = self.results.write() {
            results.insert(sql.into(), data);
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Total queries issued since construction.
    pub fn query_count(&self) -> u64 {
        self.query_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn query(&self, sql: &str) -> Result<TableData, GatewayError> {
        self.query_count.fetch_add(1, Ordering::SeqCst);

        if !self.available.load(Ordering::SeqCst) {
            return Err(GatewayError::Transport {
                reason: "warehouse unavailable".to_string(),
            });
        }

        let results = self.results.read().map_err(|_| GatewayError::Transport {
            reason: "result map lock poisoned".to_string(),
        })?;
        results
            .get(sql)
            .cloned()
            .ok_or_else(|| GatewayError::UnexpectedResponse {
                status: 400,
                reason: format!("no canned result for query: {}", sql),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_table() -> TableData {
        TableData::new(
            vec!["plan".to_string(), "value".to_string()],
            vec![vec![json!("JF2788ST"), json!(42.5)]],
        )
    }

    #[tokio::test]
    async fn test_memory_warehouse_returns_canned_result() {
        let warehouse = MemoryWarehouse::new();
        warehouse.set_result("SELECT 1", sample_table());

        let result = warehouse.query("SELECT 1").await.unwrap();
        assert_eq!(result, sample_table());
        assert_eq!(warehouse.query_count(), 1);
    }

    #[tokio::test]
    async fn test_memory_warehouse_unknown_query_fails() {
        let warehouse = MemoryWarehouse::new();
        let err = warehouse.query("SELECT nope").await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_memory_warehouse_outage_counts_queries() {
        let warehouse = MemoryWarehouse::new();
        warehouse.set_result("SELECT 1", sample_table());
        warehouse.set_available(false);

        assert!(warehouse.query("SELECT 1").await.is_err());
        assert_eq!(warehouse.query_count(), 1);
    }
}
