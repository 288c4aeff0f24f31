//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It is
//! read-only after startup: the parsed config and one pooled upstream HTTP
//! client. Nothing per-user lives here; session data is rebuilt from cookies
//! on every request (see `services::session`).

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; all inner fields are Arc-wrapped or Clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    /// Upstream client shared by the API proxy and the storage passthrough.
    pub http: reqwest::Client,
}

impl AppState {
    /// Build state and the upstream client from parsed config.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed (TLS backend
    /// initialization failure).
    pub fn new(config: AppConfig) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder().connect_timeout(Duration::from_secs(config.timeouts.connect_secs));
        if let Some(secs) = config.timeouts.request_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder.build()?;
        Ok(Self { config: Arc::new(config), http })
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
