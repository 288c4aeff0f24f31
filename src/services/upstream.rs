//! Header and response plumbing shared by the API proxy and the storage
//! passthrough.

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, header};
use axum::response::Response;

/// Headers that describe one hop's connection and must not be copied to the next.
#[must_use]
pub fn is_connection_header(name: &HeaderName) -> bool {
    name == header::CONNECTION
        || name == header::HOST
        || name == header::CONTENT_LENGTH
        || name == header::TRANSFER_ENCODING
        || name == header::TE
        || name == header::TRAILER
        || name == header::UPGRADE
        || name == header::PROXY_AUTHORIZATION
        || name == header::PROXY_AUTHENTICATE
        || name.as_str() == "keep-alive"
}

/// Copy headers byte-for-byte, minus connection headers.
#[must_use]
pub fn passthrough_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(inbound.len());
    for (name, value) in inbound {
        if !is_connection_header(name) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

/// Like [`passthrough_headers`], but any value that is not plain visible
/// ASCII is replaced by an empty string.
#[must_use]
pub fn normalized_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(inbound.len());
    for (name, value) in inbound {
        if is_connection_header(name) {
            continue;
        }
        let text = value.to_str().unwrap_or_default();
        let value = HeaderValue::from_str(text).unwrap_or_else(|_| HeaderValue::from_static(""));
        out.append(name.clone(), value);
    }
    out
}

/// Turn an upstream response into ours: same status, same headers, body streamed.
#[must_use]
pub fn relay(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let headers = passthrough_headers(upstream.headers());
    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

#[cfg(test)]
#[path = "upstream_test.rs"]
mod tests;
