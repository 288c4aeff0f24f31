//! Cookie-backed session context.
//!
//! ARCHITECTURE
//! ============
//! The session token cookie is issued by the backend's login flow and is only
//! ever read here. The derived profile is mirrored into a second cookie so a
//! reload does not need to decode the token again. A `SessionStore` lives for
//! one request: it is built from the inbound cookie jar and hands the jar back
//! so profile writes reach the browser as `Set-Cookie`.
//!
//! TRADE-OFFS
//! ==========
//! The token signature is never checked. The decoded profile is display data
//! for the page; every authorization decision stays with the backend API.
//! Concurrent tabs writing the profile cookie race, and the last write wins.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Bearer token set by the login flow.
pub const TOKEN_COOKIE: &str = "session/token";
/// JSON-encoded [`UserProfile`] owned by this service.
pub const USER_COOKIE: &str = "auth/user";
pub const GUEST_NAME: &str = "Guest";

/// Standard alphabet with optional padding; token payloads are unpadded.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

// =============================================================================
// PROFILE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AgentId {
    Numeric(i64),
    Text(String),
}

/// Client-visible projection of the token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default = "guest_name")]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub agent_id: Option<AgentId>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub avatar: String,
}

fn guest_name() -> String {
    GUEST_NAME.to_owned()
}

impl UserProfile {
    /// Project a decoded payload. Empty strings, zero, null and missing keys
    /// all fall back to the field default.
    #[must_use]
    pub fn from_claims(claims: &Map<String, Value>) -> Self {
        Self {
            name: truthy_text(claims.get("name")).unwrap_or_else(guest_name),
            email: truthy_text(claims.get("email")),
            agent_id: agent_id(claims.get("agent_id")),
            roles: roles(claims.get("roles")),
            avatar: truthy_text(claims.get("avatar")).unwrap_or_default(),
        }
    }
}

fn truthy_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64().is_some_and(|f| f.abs() > 0.0) => Some(n.to_string()),
        _ => None,
    }
}

fn agent_id(value: Option<&Value>) -> Option<AgentId> {
    if let Some(id) = value?.as_i64() {
        return (id != 0).then_some(AgentId::Numeric(id));
    }
    truthy_text(value).map(AgentId::Text)
}

fn roles(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect(),
        Some(Value::String(role)) if !role.is_empty() => vec![role.clone()],
        _ => Vec::new(),
    }
}

// =============================================================================
// TOKEN DECODING
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no session token cookie")]
    MissingToken,
    #[error("session token has no payload segment")]
    MalformedToken,
    #[error("token payload is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("token payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("token payload is not a JSON object")]
    NotAnObject,
}

/// Decode the middle segment of a `header.payload.signature` token.
///
/// # Errors
///
/// Fails if the token has no second segment, the segment is not base64, or
/// it does not decode to a JSON object.
pub fn decode_token_payload(token: &str) -> Result<Map<String, Value>, SessionError> {
    let segment = token.split('.').nth(1).ok_or(SessionError::MalformedToken)?;
    let standard: String = segment
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    let bytes = PAYLOAD_ENGINE.decode(standard.as_bytes())?;
    match serde_json::from_slice(&bytes)? {
        Value::Object(claims) => Ok(claims),
        _ => Err(SessionError::NotAnObject),
    }
}

/// True when the jar carries a non-empty session token. Presence only.
#[must_use]
pub fn has_session_token(jar: &CookieJar) -> bool {
    jar.get(TOKEN_COOKIE).is_some_and(|c| !c.value().is_empty())
}

// =============================================================================
// SESSION STORE
// =============================================================================

/// Per-request owner of the current profile and its cookie mirror.
///
/// The profile and the `auth/user` cookie only change together, through
/// [`SessionStore::set_user`] and [`SessionStore::clear_user`].
#[derive(Debug)]
pub struct SessionStore {
    user: Option<UserProfile>,
    jar: CookieJar,
    cookie_secure: bool,
}

impl SessionStore {
    /// Restore the profile cached in the `auth/user` cookie, if any.
    #[must_use]
    pub fn from_jar(jar: CookieJar, cookie_secure: bool) -> Self {
        let user = read_user_cookie(&jar);
        Self { user, jar, cookie_secure }
    }

    #[must_use]
    pub fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }

    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.user.is_some()
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.user
            .as_ref()
            .is_some_and(|u| u.roles.iter().any(|r| r == role))
    }

    /// Replace the profile and its cookie.
    pub fn set_user(&mut self, profile: UserProfile) {
        let value = match serde_json::to_string(&profile) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize user profile; session unchanged");
                return;
            }
        };
        let cookie = Cookie::build((USER_COOKIE, value))
            .path("/")
            .same_site(SameSite::Lax)
            .secure(self.cookie_secure);
        self.jar = std::mem::take(&mut self.jar).add(cookie);
        self.user = Some(profile);
    }

    /// Drop the profile and remove its cookie. Safe to call repeatedly.
    pub fn clear_user(&mut self) {
        self.jar = std::mem::take(&mut self.jar).remove(Cookie::build((USER_COOKIE, "")).path("/"));
        self.user = None;
    }

    /// Rebuild the profile from the session token cookie.
    ///
    /// # Errors
    ///
    /// Returns the decode failure; the session is left untouched.
    pub fn load_user_from_token(&mut self) -> Result<(), SessionError> {
        let Some(token) = self.token() else {
            tracing::debug!("no session token to load user from");
            return Err(SessionError::MissingToken);
        };
        let claims = match decode_token_payload(token) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::warn!(error = %e, "failed to decode session token");
                return Err(e);
            }
        };
        self.set_user(UserProfile::from_claims(&claims));
        Ok(())
    }

    /// Load from the token when no cached profile was restored.
    pub fn ensure_loaded(&mut self) {
        if self.user.is_none() {
            tracing::debug!("no user in session, attempting to load from token");
            let _ = self.load_user_from_token();
        }
    }

    /// Profile as currently stored in the outgoing cookie jar.
    #[cfg(test)]
    #[must_use]
    pub fn user_cookie(&self) -> Option<UserProfile> {
        read_user_cookie(&self.jar)
    }

    /// Hand back the jar so cookie changes are written to the response.
    #[must_use]
    pub fn into_jar(self) -> CookieJar {
        self.jar
    }

    fn token(&self) -> Option<&str> {
        self.jar
            .get(TOKEN_COOKIE)
            .map(Cookie::value)
            .filter(|v| !v.is_empty())
    }
}

fn read_user_cookie(jar: &CookieJar) -> Option<UserProfile> {
    let raw = jar.get(USER_COOKIE)?;
    match serde_json::from_str(raw.value()) {
        Ok(profile) => Some(profile),
        Err(e) => {
            tracing::debug!(error = %e, "ignoring unreadable user cookie");
            None
        }
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
