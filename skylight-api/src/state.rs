//! Shared application state for the Axum router.

use skylight_auth::{SessionManager, UserStore};
use skylight_store::DataCache;
use std::sync::Arc;

/// Application-wide state shared across all routes.
///
/// Everything in here is `Arc`'d: the router clones state per request, the
/// underlying caches and stores are process-wide singletons initialized
/// empty at startup.
#[derive(Clone)]
pub struct AppState {
    /// Tiered dataset cache over the object store and warehouse gateways.
    pub cache: Arc<DataCache>,
    /// Session issue/validate/revoke.
    pub sessions: Arc<SessionManager>,
    /// Credential store.
    pub users: Arc<UserStore>,
    /// Process start, for the health endpoint's uptime.
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(
        cache: Arc<DataCache>,
        sessions: Arc<SessionManager>,
        users: Arc<UserStore>,
    ) -> Self {
        Self {
            cache,
            sessions,
            users,
            start_time: std::time::Instant::now(),
        }
    }
}
