//! Session endpoints for cookie and bearer auth.

use axum::{
    Json,
    extract::Extension,
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{AUTHORIZATION, COOKIE, InvalidHeaderValue, SET_COOKIE},
    },
    response::IntoResponse,
};
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, error};

use super::{
    callbacks::AuthSession,
    state::{AuthConfig, AuthState},
};
use crate::identity::adapter::{delete_session, get_session_and_user, update_session};

#[utoipa::path(
    get,
    path = "/api/auth/session",
    responses(
        (status = 200, description = "Session is active", body = AuthSession),
        (status = 204, description = "No active session")
    ),
    tag = "auth"
)]
pub async fn session(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let config = auth_state.config();
    let Some(token) = extract_session_token(&headers, &config.session_cookie_name()) else {
        return StatusCode::NO_CONTENT.into_response();
    };

    let (stored, user) = match get_session_and_user(&pool, &token).await {
        Ok(Some(found)) => found,
        Ok(None) => return StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            error!("Failed to lookup session: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let now = Utc::now();
    if stored.is_expired(now) {
        debug!(user_id = %stored.user_id, "session expired");
        if let Err(err) = delete_session(&pool, &token).await {
            error!("Failed to delete expired session: {err}");
        }
        return StatusCode::NO_CONTENT.into_response();
    }

    let mut expires = stored.expires;
    let mut response_headers = HeaderMap::new();
    let (Some(due_for_update), Some(extended)) = (
        config.session_refresh_at(stored.expires),
        config.session_expires(now),
    ) else {
        error!(user_id = %stored.user_id, "Session expiry out of range");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };
    if due_for_update <= now {
        match update_session(&pool, &token, extended).await {
            Ok(Some(updated)) => {
                expires = updated.expires;
                if let Ok(cookie) = session_cookie(config, &token) {
                    response_headers.insert(SET_COOKIE, cookie);
                }
            }
            Ok(None) => return StatusCode::NO_CONTENT.into_response(),
            Err(err) => {
                error!("Failed to extend session: {err}");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        }
    }

    let enrich = config.callbacks().session;
    let session = enrich(AuthSession::new(token, expires), Some(user));
    (StatusCode::OK, response_headers, Json(session)).into_response()
}

#[utoipa::path(
    post,
    path = "/api/auth/signout",
    responses(
        (status = 204, description = "Session cleared")
    ),
    tag = "auth"
)]
pub async fn signout(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let config = auth_state.config();
    if let Some(token) = extract_session_token(&headers, &config.session_cookie_name())
        && let Err(err) = delete_session(&pool, &token).await
    {
        error!("Failed to delete session: {err}");
    }

    // The cookie is cleared even when no session row was found.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(config) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}

/// `HttpOnly` cookie carrying the session token.
pub(super) fn session_cookie(
    config: &AuthConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let name = config.session_cookie_name();
    let max_age = config.session_max_age_seconds();
    let mut cookie = format!("{name}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}");
    if config.secure_cookies() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn clear_session_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let name = config.session_cookie_name();
    let mut cookie = format!("{name}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if config.secure_cookies() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn extract_session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token);
    }
    let value = headers.get(COOKIE)?.to_str().ok()?;
    value.split(';').find_map(|pair| {
        let (key, val) = pair.trim().split_once('=')?;
        (key.trim() == cookie_name && !val.trim().is_empty()).then(|| val.trim().to_string())
    })
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
