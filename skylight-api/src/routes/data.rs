//! Dataset endpoints: the presentation layer's window into the tiered cache.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use skylight_core::Timestamp;
use skylight_store::Freshness;
use std::time::Duration;

use crate::error::ApiResult;
use crate::extract::{AdminSession, CurrentSession};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct DatasetQuery {
    /// Comma-separated query parameters, in registry placeholder order.
    pub params: Option<String>,
    /// Override the default freshness window for this read.
    pub max_age_secs: Option<u64>,
    /// Bypass the cached tiers and re-derive from the warehouse.
    #[serde(default)]
    pub refresh: bool,
}

impl DatasetQuery {
    fn params_vec(&self) -> Vec<String> {
        self.params
            .as_deref()
            .map(|p| {
                p.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn freshness(&self, default_max_age: Duration) -> Freshness {
        if self.refresh {
            Freshness::Refresh
        } else {
            Freshness::max_age(
                self.max_age_secs
                    .map(Duration::from_secs)
                    .unwrap_or(default_max_age),
            )
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DatasetResponse {
    pub dataset: String,
    pub fetched_at: Timestamp,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

/// `GET /data/{dataset}`
pub async fn get_dataset(
    State(state): State<AppState>,
    CurrentSession(_session): CurrentSession,
    Path(dataset): Path<String>,
    Query(query): Query<DatasetQuery>,
) -> ApiResult<Json<DatasetResponse>> {
    let params = query.params_vec();
    let freshness = query.freshness(state.cache.config().default_max_age);

    let entry = state.cache.get(&dataset, &params, freshness).await?;
    Ok(Json(DatasetResponse {
        dataset,
        fetched_at: entry.fetched_at,
        columns: entry.data.columns,
        rows: entry.data.rows,
    }))
}

/// `POST /data/{dataset}/invalidate` (admin)
///
/// Drops this instance's in-process entry. Other instances keep their
/// object-store benefit until their own windows lapse.
pub async fn invalidate_dataset(
    State(state): State<AppState>,
    AdminSession(_session): AdminSession,
    Path(dataset): Path<String>,
    Query(query): Query<DatasetQuery>,
) -> ApiResult<StatusCode> {
    let key = state.cache.key_for(&dataset, &query.params_vec())?;
    state.cache.invalidate(&key);
    Ok(StatusCode::NO_CONTENT)
}
