//! Passwordless email sign-in: request a link, then redeem it.

use axum::{
    Json,
    extract::{Extension, Query},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{LOCATION, SET_COOKIE},
    },
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::IntoParams;
use uuid::Uuid;

use super::{
    session::session_cookie,
    state::AuthState,
    utils::{
        build_callback_url, generate_session_token, generate_verification_token,
        hash_verification_token, sign_in_email,
    },
};
use crate::{
    email::EmailError,
    forms::{self, EmailSignIn, normalize_email},
    identity::{
        AccountType, NewUser, Session, UserUpdate, VerificationToken,
        adapter::{
            AdapterResult, create_session, create_user_with_account, create_verification_token,
            get_user_by_email, update_user, use_verification_token,
        },
    },
};

const EMAIL_PROVIDER: &str = "email";

#[derive(Deserialize, IntoParams, Debug)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct EmailCallbackParams {
    /// Token from the sign-in email.
    pub token: Option<String>,
    /// Address the token was sent to.
    pub email: Option<String>,
    /// Where to land after signing in.
    pub callback_url: Option<String>,
}

/// Send a sign-in link to the given address.
#[utoipa::path(
    post,
    path = "/api/auth/signin/email",
    request_body = EmailSignIn,
    responses(
        (status = 204, description = "Sign-in email sent"),
        (status = 400, description = "Missing payload", body = String),
        (status = 422, description = "Invalid form"),
        (status = 500, description = "Token storage or email delivery failed", body = String)
    ),
    tag = "auth"
)]
pub async fn signin_email(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<EmailSignIn>>,
) -> Response {
    let form = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };
    let form = match forms::parse(form) {
        Ok(form) => form,
        Err(err) => return err.into_response(),
    };

    let config = auth_state.config();
    let token = match generate_verification_token() {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to generate verification token: {err}");
            return sign_in_failed();
        }
    };

    let Some(expires) = config.verification_expires(Utc::now()) else {
        error!("Verification token expiry out of range");
        return sign_in_failed();
    };
    let record = VerificationToken {
        identifier: form.email.clone(),
        token: hash_verification_token(&token, config.secret()),
        expires,
    };
    if let Err(err) = create_verification_token(&pool, &record).await {
        error!("Failed to store verification token: {err}");
        return sign_in_failed();
    }

    let destination = (config.callbacks().redirect)(form.callback_url, config.base_url());
    let url = match build_callback_url(config.base_url(), &destination, &token, &form.email) {
        Ok(url) => url,
        Err(err) => {
            error!("Failed to build sign-in link: {err}");
            return sign_in_failed();
        }
    };

    let host = config.base_url().host_str().unwrap_or("fluent-flow");
    let (subject, text, html) = sign_in_email(&url, host);
    match auth_state
        .dispatcher()
        .send(&form.email, &subject, &text, &html)
        .await
    {
        Ok(receipt) => {
            info!(message_id = %receipt.message_id, "sign-in email sent");
            StatusCode::NO_CONTENT.into_response()
        }
        // forms::parse applies the same predicate, so this only fires if the two diverge.
        Err(EmailError::InvalidRecipient(to)) => (
            StatusCode::BAD_REQUEST,
            format!("Cannot send email to {to}"),
        )
            .into_response(),
        Err(EmailError::Transport(err)) => {
            error!("Failed to send sign-in email: {err:#}");
            sign_in_failed()
        }
    }
}

/// Redeem a sign-in link: consume the token, find or create the user, and
/// start a database session.
#[utoipa::path(
    get,
    path = "/api/auth/callback/email",
    params(EmailCallbackParams),
    responses(
        (status = 303, description = "Signed in; session cookie set"),
        (status = 400, description = "Missing, unknown or expired token", body = String),
        (status = 500, description = "Sign-in failed", body = String)
    ),
    tag = "auth"
)]
pub async fn callback_email(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    Query(params): Query<EmailCallbackParams>,
) -> Response {
    let token = params.token.as_deref().map(str::trim).unwrap_or_default();
    let email = params
        .email
        .as_deref()
        .map(normalize_email)
        .unwrap_or_default();
    if token.is_empty() || email.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing token".to_string()).into_response();
    }

    let config = auth_state.config();
    let now = Utc::now();
    let hashed = hash_verification_token(token, config.secret());

    match use_verification_token(&pool, &email, &hashed).await {
        Ok(Some(record)) if !record.is_expired(now) => {}
        Ok(Some(_)) => {
            return (StatusCode::BAD_REQUEST, "Token expired".to_string()).into_response();
        }
        Ok(None) => {
            warn!("Unknown or already used verification token");
            return (StatusCode::BAD_REQUEST, "Invalid token".to_string()).into_response();
        }
        Err(err) => {
            error!("Failed to redeem verification token: {err}");
            return callback_failed();
        }
    }

    let user_id = match sign_in_user(&pool, &email).await {
        Ok(user_id) => user_id,
        Err(err) => {
            error!("Failed to resolve user for {email}: {err}");
            return callback_failed();
        }
    };

    let session_token = match generate_session_token() {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to generate session token: {err}");
            return callback_failed();
        }
    };
    let Some(expires) = config.session_expires(now) else {
        error!("Session expiry out of range");
        return callback_failed();
    };
    let session = Session {
        session_token,
        user_id,
        expires,
    };
    if let Err(err) = create_session(&pool, &session).await {
        error!("Failed to create session: {err}");
        return callback_failed();
    }

    let destination = (config.callbacks().redirect)(params.callback_url, config.base_url());
    let mut headers = HeaderMap::new();
    match (
        session_cookie(config, &session.session_token),
        HeaderValue::from_str(destination.as_str()),
    ) {
        (Ok(cookie), Ok(location)) => {
            headers.insert(SET_COOKIE, cookie);
            headers.insert(LOCATION, location);
        }
        _ => {
            error!("Failed to encode sign-in response headers");
            return callback_failed();
        }
    }

    info!(user_id = %user_id, "signed in with email");
    (StatusCode::SEE_OTHER, headers).into_response()
}

/// Mark an existing user as verified, or create one with an email account.
async fn sign_in_user(pool: &PgPool, email: &str) -> AdapterResult<Uuid> {
    let now = Utc::now();
    if let Some(user) = get_user_by_email(pool, email).await? {
        return mark_verified(pool, user.id, now).await;
    }

    let new_user = NewUser {
        email: Some(email.to_string()),
        email_verified: Some(now),
        ..NewUser::default()
    };
    match create_user_with_account(pool, &new_user, AccountType::Email, EMAIL_PROVIDER, email).await
    {
        Ok((user, _)) => Ok(user.id),
        // A concurrent redemption created the user first.
        Err(err) if err.is_unique_violation() => {
            let user = get_user_by_email(pool, email).await?.ok_or(err)?;
            mark_verified(pool, user.id, now).await
        }
        Err(err) => Err(err),
    }
}

async fn mark_verified(pool: &PgPool, user_id: Uuid, at: DateTime<Utc>) -> AdapterResult<Uuid> {
    let user = update_user(pool, &UserUpdate::new(user_id).with_email_verified(at)).await?;
    Ok(user.id)
}

fn sign_in_failed() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Failed to send sign-in email".to_string(),
    )
        .into_response()
}

fn callback_failed() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "Sign-in failed".to_string()).into_response()
}
