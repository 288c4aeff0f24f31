//! Auth routes: session extraction, route guard, profile and logout.

use std::convert::Infallible;

use axum::extract::{FromRef, FromRequestParts, Path, Request};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Redirect, Response};
use axum_extra::extract::cookie::CookieJar;
use serde::Serialize;

use crate::services::session::{self, SessionStore, UserProfile};
use crate::state::AppState;

/// Where unauthenticated page requests are sent.
pub const LOGIN_PATH: &str = "/login";

// =============================================================================
// SESSION EXTRACTOR
// =============================================================================

/// Builds the request's session from its cookies and hydrates the profile
/// from the token when the profile cookie is missing.
impl<S> FromRequestParts<S> for SessionStore
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let jar = CookieJar::from_headers(&parts.headers);
        let mut session = SessionStore::from_jar(jar, app_state.config.cookie_secure);
        session.ensure_loaded();
        tracing::debug!(
            path = %parts.uri.path(),
            user = ?session.user().map(|u| u.name.as_str()),
            "session resolved"
        );
        Ok(session)
    }
}

// =============================================================================
// ROUTE GUARD
// =============================================================================

/// Redirect to [`LOGIN_PATH`] unless a session token cookie is present.
///
/// Presence only: an expired or garbled token still passes, and the backend
/// rejects it on the next API call.
pub async fn require_session(jar: CookieJar, request: Request, next: Next) -> Response {
    if !session::has_session_token(&jar) {
        tracing::debug!(path = %request.uri().path(), "no session token, redirecting to login");
        return Redirect::temporary(LOGIN_PATH).into_response();
    }
    next.run(request).await
}

// =============================================================================
// HANDLERS
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub logged_in: bool,
    pub user: Option<UserProfile>,
}

#[derive(Serialize)]
pub struct RoleCheck {
    pub role: String,
    pub granted: bool,
}

/// `GET /auth/me`: current profile (or `null`), persisting it to the cookie.
pub async fn me(session: SessionStore) -> impl IntoResponse {
    let view = SessionView { logged_in: session.is_logged_in(), user: session.user().cloned() };
    (session.into_jar(), Json(view))
}

/// `GET /auth/roles/{role}`: whether the current profile carries `role`.
pub async fn has_role(session: SessionStore, Path(role): Path<String>) -> impl IntoResponse {
    let granted = session.has_role(&role);
    (session.into_jar(), Json(RoleCheck { role, granted }))
}

/// `POST /auth/logout`: drop the profile and its cookie.
pub async fn logout(mut session: SessionStore) -> impl IntoResponse {
    session.clear_user();
    (session.into_jar(), StatusCode::NO_CONTENT)
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
