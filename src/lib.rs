//! # fluent-flow (passwordless sign-in and identity)
//!
//! `fluent-flow` signs users in through a one-time email link and keeps them
//! signed in with database-backed sessions.
//!
//! ## Identity data
//!
//! Five tables hold identity state: `user`, `account`, `session`,
//! `verificationToken` and `authenticator`. Accounts, sessions and
//! authenticators belong to exactly one user and are removed with it
//! (`ON DELETE CASCADE`). Verification tokens are not tied to a user row.
//! See [`identity`] for the row types, the explicit constraint list and the
//! storage adapter.
//!
//! ## Sessions
//!
//! Sessions are rows, not self-contained tokens. The session cookie carries
//! only the row key. Every time a session is read, the persisted user record
//! replaces whatever user data the session object held.
//!
//! ## Email
//!
//! Outgoing mail goes through [`email::EmailDispatcher`], which refuses
//! malformed recipients before touching the transport and always sends from
//! the configured sender identity. Transport credentials come from the
//! command line or the environment only.

pub mod api;
pub mod cli;
pub mod email;
pub mod forms;
pub mod identity;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
