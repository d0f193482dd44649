//! Skylight API Server Entry Point
//!
//! Bootstraps logging and configuration, constructs the gateways (failing
//! fast on partial credentials), preloads the dataset cache, starts the
//! session reaper, and serves the Axum router until ctrl-c.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use skylight_api::{create_router, ApiError, ApiResult, AppState};
use skylight_auth::{AuthConfig, SessionManager, UserStore};
use skylight_store::{
    BigQueryWarehouse, CacheConfig, DataCache, DatasetRegistry, DatasetSpec, GcsStore,
    MemoryStore, MemoryWarehouse, ObjectStore, StoreConfig, Warehouse, WarehouseConfig,
};
use tracing_subscriber::EnvFilter;

/// Default master table, overridable with `SKYLIGHT_BQ_TABLE`.
const DEFAULT_MASTER_TABLE: &str = "variant-finance-data-project.ICARUS_Multi.Final_Table";

#[tokio::main]
async fn main() -> ApiResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let store_config = StoreConfig::from_env();
    let warehouse_config = WarehouseConfig::from_env();
    let auth_config = AuthConfig::from_env();
    auth_config
        .validate_for_production()
        .map_err(|e| ApiError::invalid_input(e.to_string()))?;

    let object_store = build_object_store(&store_config)?;
    let warehouse = build_warehouse(&warehouse_config)?;

    let cache = Arc::new(DataCache::new(
        object_store.clone(),
        warehouse,
        default_registry(),
        CacheConfig::from_env(),
    ));
    let sessions = Arc::new(SessionManager::new(object_store.clone(), auth_config.clone()));
    let users = Arc::new(UserStore::new(object_store, auth_config));

    let preloaded = cache.preload().await;
    tracing::info!(preloaded, "Warmed dataset cache from object store");

    spawn_session_reaper(sessions.clone());

    let state = AppState::new(cache, sessions, users);
    let app = create_router(state);

    let addr = resolve_bind_addr()?;
    tracing::info!(%addr, "Starting Skylight API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}

/// GCS when a bucket is configured, otherwise the in-memory fallback.
///
/// A bucket with no token is a hard error: a half-configured instance must
/// not quietly run without persistence.
fn build_object_store(config: &StoreConfig) -> ApiResult<Arc<dyn ObjectStore>> {
    if config.has_bucket() {
        let store = GcsStore::from_config(config)
            .map_err(|e| ApiError::internal_error(e.to_string()))?;
        tracing::info!(bucket = %store.bucket(), "Using GCS object store");
        Ok(Arc::new(store))
    } else {
        tracing::warn!(
            "SKYLIGHT_CACHE_BUCKET not set; sessions and users will not survive restarts"
        );
        Ok(Arc::new(MemoryStore::new()))
    }
}

/// BigQuery when a project is configured, otherwise an empty in-memory
/// warehouse for credential-less local development.
fn build_warehouse(config: &WarehouseConfig) -> ApiResult<Arc<dyn Warehouse>> {
    if config.project.trim().is_empty() {
        tracing::warn!("SKYLIGHT_BQ_PROJECT not set; dataset fetches will fail on cold cache");
        return Ok(Arc::new(MemoryWarehouse::new()));
    }
    let warehouse = BigQueryWarehouse::from_config(config)
        .map_err(|e| ApiError::internal_error(e.to_string()))?;
    tracing::info!(project = %config.project, "Using BigQuery warehouse");
    Ok(Arc::new(warehouse))
}

/// The datasets this deployment serves.
fn default_registry() -> DatasetRegistry {
    let table = std::env::var("SKYLIGHT_BQ_TABLE")
        .unwrap_or_else(|_| DEFAULT_MASTER_TABLE.to_string());

    let mut registry = DatasetRegistry::new();
    registry.register(DatasetSpec::new(
        "master",
        format!("SELECT * FROM `{}`", table),
    ));
    registry.register(DatasetSpec::new(
        "report_dates",
        format!("SELECT DISTINCT Reporting_Date FROM `{}` ORDER BY Reporting_Date DESC", table),
    ));
    registry.register(DatasetSpec::new(
        "plan_groups",
        format!(
            "SELECT DISTINCT App_Name, Plan_Name FROM `{}` WHERE Active_Inactive = {{0}} \
             ORDER BY App_Name, Plan_Name",
            table
        ),
    ));
    registry
}

/// Periodically sweep expired session records.
fn spawn_session_reaper(sessions: Arc<SessionManager>) {
    let interval_secs = std::env::var("SKYLIGHT_SESSION_SWEEP_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(3600u64);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        // The first tick fires immediately; skip it so startup stays fast.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match sessions.sweep_expired().await {
                Ok(removed) if removed > 0 => {
                    tracing::info!(removed, "Session reaper pass complete");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Session reaper pass failed"),
            }
        }
    });
}

fn resolve_bind_addr() -> ApiResult<SocketAddr> {
    let host = std::env::var("SKYLIGHT_API_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port_str = std::env::var("PORT")
        .ok()
        .or_else(|| std::env::var("SKYLIGHT_API_PORT").ok())
        .unwrap_or_else(|| "3000".to_string());
    let port = port_str
        .parse::<u16>()
        .map_err(|_| ApiError::invalid_input(format!("Invalid port value: {}", port_str)))?;

    let addr = format!("{}:{}", host, port);
    addr.parse::<SocketAddr>()
        .map_err(|e| ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e)))
}
