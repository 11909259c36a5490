//! Auth handlers and supporting modules.
//!
//! Sign-in is passwordless: `POST /api/auth/signin/email` mails a one-time
//! link, `GET /api/auth/callback/email` redeems it and opens a database
//! session. The session cookie is `authjs.session-token` (with the
//! `__Secure-` prefix when the service is served over https), and the
//! session object returned by `GET /api/auth/session` is shaped by the
//! configured session callback.
//!
//! Verification tokens are stored as `sha256(token + secret)` and deleted when
//! redeemed, so a link works once.

pub mod callbacks;
pub(crate) mod email;
pub(crate) mod session;
mod state;
mod utils;

pub use callbacks::{AuthSession, enrich_session, redirect};
pub use state::{
    AuthConfig, AuthState, Callbacks, MAX_AGE_SECONDS, RedirectCallback, SessionCallback, SessionStrategy,
};
