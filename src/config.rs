//! Gateway configuration parsed from environment variables.

use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_SITE_DIR: &str = "site";
pub const DEFAULT_UPSTREAM_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid PORT: {0}")]
    InvalidPort(String),
    #[error("invalid {var}: expected whole seconds, got {value:?}")]
    InvalidSeconds { var: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpstreamTimeouts {
    pub connect_secs: u64,
    /// Total request timeout. `None` leaves upstream calls unbounded.
    pub request_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub port: u16,
    /// Service key injected as `x-api-key` when the caller sends no `authorization`.
    pub api_key: String,
    pub base_url: String,
    pub storage_base_url: String,
    pub site_dir: PathBuf,
    pub cookie_secure: bool,
    pub timeouts: UpstreamTimeouts,
}

impl AppConfig {
    /// Build typed config from environment variables.
    ///
    /// Optional:
    /// - `PORT`: default 3000
    /// - `API_KEY`: service API key, default empty
    /// - `BASE_URL`: backend API base URL
    /// - `BASE_URL_STORAGE`: storage base URL
    /// - `SITE_DIR`: pre-built pages, default `site`
    /// - `COOKIE_SECURE`: boolean, default false
    /// - `UPSTREAM_CONNECT_TIMEOUT_SECS`: default 10
    /// - `UPSTREAM_REQUEST_TIMEOUT_SECS`: unset means no timeout
    ///
    /// Missing URLs and key are not rejected here; they surface as failed
    /// upstream calls.
    ///
    /// # Errors
    ///
    /// Returns an error if `PORT` or a timeout variable is not a number.
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match std::env::var("PORT") {
            Ok(raw) => raw.trim().parse::<u16>().map_err(|_| ConfigError::InvalidPort(raw))?,
            Err(_) => DEFAULT_PORT,
        };

        let api_key = std::env::var("API_KEY").unwrap_or_default();
        let base_url = trimmed_url("BASE_URL");
        let storage_base_url = trimmed_url("BASE_URL_STORAGE");
        let site_dir = std::env::var("SITE_DIR").map_or_else(|_| PathBuf::from(DEFAULT_SITE_DIR), PathBuf::from);
        let cookie_secure = env_bool("COOKIE_SECURE").unwrap_or(false);

        let timeouts = UpstreamTimeouts {
            connect_secs: env_secs("UPSTREAM_CONNECT_TIMEOUT_SECS")?.unwrap_or(DEFAULT_UPSTREAM_CONNECT_TIMEOUT_SECS),
            request_secs: env_secs("UPSTREAM_REQUEST_TIMEOUT_SECS")?,
        };

        Ok(Self { port, api_key, base_url, storage_base_url, site_dir, cookie_secure, timeouts })
    }

    /// Log the settings the gateway cannot work without, without failing startup.
    pub fn warn_if_incomplete(&self) {
        if self.base_url.is_empty() {
            tracing::warn!("BASE_URL not set: API proxy requests will fail");
        }
        if self.storage_base_url.is_empty() {
            tracing::warn!("BASE_URL_STORAGE not set: storage requests will fail");
        }
        if self.api_key.is_empty() {
            tracing::warn!("API_KEY not set: anonymous API requests carry an empty key");
        }
    }
}

fn trimmed_url(key: &str) -> String {
    std::env::var(key)
        .unwrap_or_default()
        .trim()
        .trim_end_matches('/')
        .to_string()
}

pub(crate) fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .and_then(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
}

fn env_secs(key: &'static str) -> Result<Option<u64>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidSeconds { var: key, value: raw }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
