//! Health and liveness.

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use skylight_store::CacheStats;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: u64,
    pub cache: CacheStats,
}

/// `GET /health` — unauthenticated liveness probe.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.start_time.elapsed().as_secs(),
        cache: state.cache.stats(),
    })
}
