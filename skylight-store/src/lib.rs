//! Skylight Store - Gateways and the Tiered Dataset Cache
//!
//! This crate owns the two external collaborators (object store, warehouse)
//! behind narrow async traits, and the three-tier dataset cache built on top
//! of them: in-process memory, serialized envelopes in the object store, and
//! the warehouse itself.
//!
//! # Tier Order
//!
//! Reads walk memory → object store → warehouse and populate the earlier
//! tiers on the way back. The object-store copy is the durable, shared
//! source of truth across web instances; the memory tier is never allowed to
//! be staler than it.

pub mod bigquery;
pub mod cache;
pub mod config;
pub mod freshness;
pub mod gcs;
pub mod object_store;
pub mod registry;
pub mod retry;
pub mod warehouse;

pub use bigquery::BigQueryWarehouse;
pub use cache::{CacheConfig, CacheStats, DataCache};
pub use config::{StoreConfig, WarehouseConfig};
pub use freshness::Freshness;
pub use gcs::GcsStore;
pub use object_store::{MemoryStore, ObjectStore};
pub use registry::{DatasetRegistry, DatasetSpec};
pub use warehouse::{MemoryWarehouse, Warehouse};
