//! Storage passthrough middleware.
//!
//! Anything under `/storage` is fetched from the storage service with the same
//! method and headers and relayed back untouched, status included. Unlike the
//! API proxy there is no error normalization: a missing asset is the storage
//! service's 404.

use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::services::upstream;
use crate::state::AppState;

pub const STORAGE_PREFIX: &str = "/storage";
pub const ASSET_CACHE_CONTROL: &str = "public, max-age=31536000";

/// Intercept `/storage*` requests; everything else goes to `next`.
pub async fn storage_proxy(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_owned();
    if !path.starts_with(STORAGE_PREFIX) {
        return next.run(request).await;
    }

    let target = format!("{}{}", state.config.storage_base_url, path);
    tracing::debug!(%target, method = %request.method(), "storage passthrough");

    let result = state
        .http
        .request(request.method().clone(), &target)
        .headers(upstream::passthrough_headers(request.headers()))
        .send()
        .await;

    match result {
        Ok(response) => {
            let cacheable = response.status().is_success();
            let mut relayed = upstream::relay(response);
            if cacheable {
                relayed
                    .headers_mut()
                    .insert(header::CACHE_CONTROL, HeaderValue::from_static(ASSET_CACHE_CONTROL));
            }
            relayed
        }
        Err(e) => {
            tracing::error!(error = %e, %target, "storage upstream unreachable");
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}

#[cfg(test)]
#[path = "storage_test.rs"]
mod tests;
