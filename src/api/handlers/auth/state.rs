//! Auth configuration and the state shared by every auth handler.

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use url::Url;

use super::callbacks::{AuthSession, enrich_session, redirect};
use crate::{email::EmailDispatcher, identity::User};

const DEFAULT_SESSION_MAX_AGE_SECONDS: i64 = 30 * 24 * 60 * 60;
const DEFAULT_SESSION_UPDATE_AGE_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_VERIFICATION_MAX_AGE_SECONDS: i64 = 24 * 60 * 60;
/// Longest accepted session or verification lifetime (ten years).
pub const MAX_AGE_SECONDS: i64 = 10 * 365 * 24 * 60 * 60;
const SESSION_COOKIE_NAME: &str = "authjs.session-token";
const SECURE_COOKIE_PREFIX: &str = "__Secure-";

/// Where sessions live. Only database-backed sessions are supported.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionStrategy {
    #[default]
    Database,
}

pub type SessionCallback = fn(AuthSession, Option<User>) -> AuthSession;
pub type RedirectCallback = fn(Option<String>, &Url) -> Url;

/// Hooks run by the auth flow.
#[derive(Clone, Copy)]
pub struct Callbacks {
    /// Shapes the session object returned to clients.
    pub session: SessionCallback,
    /// Decides where the browser lands after signing in.
    pub redirect: RedirectCallback,
}

impl Default for Callbacks {
    fn default() -> Self {
        Self {
            session: enrich_session,
            redirect,
        }
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks").finish_non_exhaustive()
    }
}

/// Immutable auth settings, built once at startup.
#[derive(Debug)]
pub struct AuthConfig {
    base_url: Url,
    secret: SecretString,
    session_strategy: SessionStrategy,
    session_max_age_seconds: i64,
    session_update_age_seconds: i64,
    verification_max_age_seconds: i64,
    callbacks: Callbacks,
}

impl AuthConfig {
    #[must_use]
    pub fn new(base_url: Url, secret: SecretString) -> Self {
        Self {
            base_url,
            secret,
            session_strategy: SessionStrategy::Database,
            session_max_age_seconds: DEFAULT_SESSION_MAX_AGE_SECONDS,
            session_update_age_seconds: DEFAULT_SESSION_UPDATE_AGE_SECONDS,
            verification_max_age_seconds: DEFAULT_VERIFICATION_MAX_AGE_SECONDS,
            callbacks: Callbacks::default(),
        }
    }

    #[must_use]
    pub fn with_session_max_age_seconds(mut self, seconds: i64) -> Self {
        self.session_max_age_seconds = seconds.clamp(1, MAX_AGE_SECONDS);
        self
    }

    /// Zero extends the session on every read.
    #[must_use]
    pub fn with_session_update_age_seconds(mut self, seconds: i64) -> Self {
        self.session_update_age_seconds = seconds.clamp(0, MAX_AGE_SECONDS);
        self
    }

    #[must_use]
    pub fn with_verification_max_age_seconds(mut self, seconds: i64) -> Self {
        self.verification_max_age_seconds = seconds.clamp(1, MAX_AGE_SECONDS);
        self
    }

    #[must_use]
    pub fn with_callbacks(mut self, callbacks: Callbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn session_strategy(&self) -> SessionStrategy {
        self.session_strategy
    }

    #[must_use]
    pub fn callbacks(&self) -> &Callbacks {
        &self.callbacks
    }

    #[must_use]
    pub fn session_max_age(&self) -> Duration {
        Duration::seconds(self.session_max_age_seconds)
    }

    #[must_use]
    pub fn session_update_age(&self) -> Duration {
        Duration::seconds(self.session_update_age_seconds)
    }

    #[must_use]
    pub fn verification_max_age(&self) -> Duration {
        Duration::seconds(self.verification_max_age_seconds)
    }

    /// Expiry of a session issued or extended at `now`, `None` on overflow.
    #[must_use]
    pub fn session_expires(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        now.checked_add_signed(self.session_max_age())
    }

    /// Expiry of a verification token issued at `now`, `None` on overflow.
    #[must_use]
    pub fn verification_expires(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        now.checked_add_signed(self.verification_max_age())
    }

    /// When a session expiring at `expires` is due to be extended.
    #[must_use]
    pub fn session_refresh_at(&self, expires: DateTime<Utc>) -> Option<DateTime<Utc>> {
        expires
            .checked_sub_signed(self.session_max_age())?
            .checked_add_signed(self.session_update_age())
    }

    pub(super) fn session_max_age_seconds(&self) -> i64 {
        self.session_max_age_seconds
    }

    pub(super) fn secret(&self) -> &str {
        self.secret.expose_secret()
    }

    pub(super) fn secure_cookies(&self) -> bool {
        self.base_url.scheme() == "https"
    }

    /// Cookie carrying the session token; prefixed when served over https.
    #[must_use]
    pub fn session_cookie_name(&self) -> String {
        if self.secure_cookies() {
            format!("{SECURE_COOKIE_PREFIX}{SESSION_COOKIE_NAME}")
        } else {
            SESSION_COOKIE_NAME.to_string()
        }
    }
}

#[derive(Debug)]
pub struct AuthState {
    config: AuthConfig,
    dispatcher: EmailDispatcher,
}

impl AuthState {
    #[must_use]
    pub fn new(config: AuthConfig, dispatcher: EmailDispatcher) -> Self {
        Self { config, dispatcher }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn dispatcher(&self) -> &EmailDispatcher {
        &self.dispatcher
    }
}
