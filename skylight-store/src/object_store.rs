//! Object store gateway trait and the in-memory implementation.
//!
//! The trait is deliberately narrow: bytes in, bytes out, keyed by path.
//! Everything Skylight persists (cache envelopes, session records, the user
//! table) goes through these four operations, so swapping the blob store for
//! a transactional backend later touches nothing above this seam.

use async_trait::async_trait;
use skylight_core::GatewayError;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// Blob storage contract consumed by the cache and auth layers.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read an object. `Ok(None)` means the object does not exist; errors
    /// mean the store could not answer.
    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, GatewayError>;

    /// Write an object, replacing any existing one at the path.
    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<(), GatewayError>;

    /// List object paths under a prefix.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, GatewayError>;

    /// Delete an object. Deleting a missing object is not an error.
    async fn delete(&self, path: &str) -> Result<(), GatewayError>;
}

/// In-memory object store for tests and bucket-less local development.
///
/// The `available` switch simulates an object-store outage: while off, every
/// operation fails with a transport error, which is exactly what the
/// degraded-cache paths need to exercise.
#[derive(Debug)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
    available: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Toggle simulated availability.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), GatewayError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(GatewayError::Transport {
                reason: "object store unavailable".to_string(),
            })
        }
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    /// Whether an object exists, bypassing the availability switch.
    pub async fn contains(&self, path: &str) -> bool {
        self.objects.read().await.contains_key(path)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, GatewayError> {
        self.check_available()?;
        Ok(self.objects.read().await.get(path).cloned())
    }

    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<(), GatewayError> {
        self.check_available()?;
        self.objects.write().await.insert(path.to_string(), bytes);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, GatewayError> {
        self.check_available()?;
        Ok(self
            .objects
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn delete(&self, path: &str) -> Result<(), GatewayError> {
        self.check_available()?;
        self.objects.write().await.remove(path);
        Ok(())
    }
}
