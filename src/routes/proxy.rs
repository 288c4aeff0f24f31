//! API proxy: forwards `/api/{*path}` to the backend.
//!
//! DESIGN
//! ======
//! Callers that bring their own `authorization` header talk to the backend as
//! themselves. Everyone else gets the service API key. Backend failures are
//! reduced to `{statusCode, statusMessage, message}` so raw upstream error
//! bodies never reach the browser.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::services::upstream;
use crate::state::AppState;

pub const API_PREFIX: &str = "/api/";
pub const API_KEY_HEADER: &str = "x-api-key";
pub const DEFAULT_ERROR_MESSAGE: &str = "An error occurred while fetching data.";
const FALLBACK_STATUS_MESSAGE: &str = "Internal Server Error";

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// No usable response: connect failure, timeout, malformed target URL.
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("upstream responded with {status}")]
    Upstream { status: StatusCode, message: Option<String> },
}

/// Wire shape of a proxy failure.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub status_code: u16,
    pub status_message: String,
    pub message: String,
}

impl ProxyError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Transport(e) => e.status().unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Self::Upstream { status, .. } => *status,
        }
    }

    #[must_use]
    pub fn body(&self) -> ErrorBody {
        let status = self.status();
        let message = match self {
            Self::Upstream { message: Some(m), .. } => m.clone(),
            _ => DEFAULT_ERROR_MESSAGE.to_owned(),
        };
        ErrorBody {
            status_code: status.as_u16(),
            status_message: status
                .canonical_reason()
                .unwrap_or(FALLBACK_STATUS_MESSAGE)
                .to_owned(),
            message,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

// =============================================================================
// HANDLER
// =============================================================================

/// `ANY /api/{*path}`: forward to `{base_url}/{path}`.
pub async fn forward(
    State(state): State<AppState>,
    uri: Uri,
    Query(query): Query<Vec<(String, String)>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ProxyError> {
    let path = raw_suffix(&uri);
    tracing::debug!(%path, %method, "proxy request");

    let mut outbound = upstream::normalized_headers(&headers);
    // The error path reads the body, so ask for it uncompressed.
    outbound.remove(header::ACCEPT_ENCODING);
    if !has_authorization(&outbound) {
        let key = HeaderValue::from_str(&state.config.api_key).unwrap_or_else(|_| HeaderValue::from_static(""));
        outbound.insert(HeaderName::from_static(API_KEY_HEADER), key);
    }

    let json = json_body(&method, &headers, &body);
    if json.is_some() {
        // Form bodies are re-encoded as JSON.
        outbound.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }

    let target = format!("{}/{}", state.config.base_url, path);
    let mut request = state
        .http
        .request(method.clone(), &target)
        .headers(outbound)
        .query(&query);
    if let Some(json) = json {
        request = request.json(&json);
    }

    let response = request.send().await.map_err(|e| {
        tracing::error!(error = %e, %target, "upstream api request failed");
        ProxyError::from(e)
    })?;

    let status = response.status();
    if status.is_success() {
        return Ok(upstream::relay(response));
    }

    let raw = match response.bytes().await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::debug!(error = %e, "failed to read upstream error body; using default message");
            Bytes::new()
        }
    };
    tracing::error!(%status, %target, "upstream api returned an error");
    Err(ProxyError::Upstream { status, message: upstream_message(&raw) })
}

/// Wildcard suffix of `/api/{*path}` exactly as sent, percent-encoding intact.
pub(crate) fn raw_suffix(uri: &Uri) -> &str {
    uri.path().strip_prefix(API_PREFIX).unwrap_or_default()
}

fn has_authorization(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .is_some_and(|v| !v.is_empty())
}

/// POST, PUT and PATCH carry a body, whatever the method's letter case.
pub(crate) fn carries_body(method: &Method) -> bool {
    ["POST", "PUT", "PATCH"]
        .iter()
        .any(|m| method.as_str().eq_ignore_ascii_case(m))
}

/// Body to forward: only structured JSON (object or array) on body-carrying
/// methods. Form-encoded bodies are forwarded as a JSON object.
pub(crate) fn json_body(method: &Method, headers: &HeaderMap, raw: &[u8]) -> Option<Value> {
    if !carries_body(method) || raw.is_empty() {
        return None;
    }
    if is_form(headers) {
        return form_object(raw);
    }
    match serde_json::from_slice::<Value>(raw) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => Some(value),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(error = %e, "request body is not JSON; forwarding without body");
            None
        }
    }
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/x-www-form-urlencoded"))
}

/// Decode a form body into an object. A repeated key collects its values
/// into an array, in order.
fn form_object(raw: &[u8]) -> Option<Value> {
    let pairs: Vec<(String, String)> = match serde_urlencoded::from_bytes(raw) {
        Ok(pairs) => pairs,
        Err(e) => {
            tracing::debug!(error = %e, "form body is not decodable; forwarding without body");
            return None;
        }
    };
    let mut object = Map::new();
    for (key, value) in pairs {
        match object.get_mut(&key) {
            Some(Value::Array(values)) => values.push(Value::String(value)),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, Value::String(value)]);
            }
            None => {
                object.insert(key, Value::String(value));
            }
        }
    }
    Some(Value::Object(object))
}

/// The `message` field of a JSON error body, when it is a non-empty string.
pub(crate) fn upstream_message(raw: &[u8]) -> Option<String> {
    serde_json::from_slice::<Value>(raw)
        .ok()?
        .get("message")?
        .as_str()
        .filter(|m| !m.is_empty())
        .map(str::to_owned)
}

#[cfg(test)]
#[path = "proxy_test.rs"]
mod tests;
