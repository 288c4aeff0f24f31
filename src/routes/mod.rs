//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! One Axum router fronts the browser app: `/api/*` is proxied to the
//! backend, `/storage*` is passed through to the storage service by
//! middleware, `/dashboard` pages sit behind the session guard, and every
//! other path is served from the pre-built site directory.

pub mod auth;
pub mod proxy;
pub mod storage;

use axum::Router;
use axum::http::StatusCode;
use axum::middleware;
use axum::routing::{any, get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let site_dir = state.config.site_dir.clone();

    let protected = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/auth/roles/{role}", get(auth::has_role))
        .nest_service(
            "/dashboard",
            ServeDir::new(site_dir.join("dashboard")).append_index_html_on_directories(true),
        )
        .route_layer(middleware::from_fn(auth::require_session));

    Router::new()
        .route("/api/{*path}", any(proxy::forward))
        .route("/auth/logout", post(auth::logout))
        .route("/healthz", get(healthz))
        .merge(protected)
        .fallback_service(ServeDir::new(&site_dir).append_index_html_on_directories(true))
        .layer(middleware::from_fn_with_state(state.clone(), storage::storage_proxy))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
