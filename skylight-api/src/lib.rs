//! Skylight API - HTTP Surface
//!
//! Exposes exactly the calls the dashboard front end makes into the core:
//! login/logout/session introspection, dataset reads and invalidation, and
//! admin user management. Chart rendering, theming, and page layout live
//! entirely in the front end; this crate only serves data and auth.

pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult, ErrorCode};
pub use state::AppState;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the API router over the given state.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health::health))
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/logout", post(routes::auth::logout))
        .route("/auth/me", get(routes::auth::me))
        .route("/data/:dataset", get(routes::data::get_dataset))
        .route(
            "/data/:dataset/invalidate",
            post(routes::data::invalidate_dataset),
        )
        .route(
            "/admin/users",
            get(routes::users::list_users).put(routes::users::upsert_user),
        )
        .route("/admin/users/:username", delete(routes::users::delete_user))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
