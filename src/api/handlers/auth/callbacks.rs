//! Session object handed to clients and the default auth callbacks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::ToSchema;

use crate::identity::User;

/// Session as seen by clients. The token itself is never serialized.
#[derive(ToSchema, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AuthSession {
    pub user: Option<User>,
    pub expires: DateTime<Utc>,
    #[serde(skip)]
    pub session_token: String,
}

impl AuthSession {
    #[must_use]
    pub fn new(session_token: impl Into<String>, expires: DateTime<Utc>) -> Self {
        Self {
            user: None,
            expires,
            session_token: session_token.into(),
        }
    }
}

/// Copy the persisted user onto the session.
///
/// With a user record the session's `user` is replaced by it, whatever it held
/// before; without one the session comes back untouched.
#[must_use]
pub fn enrich_session(session: AuthSession, user: Option<User>) -> AuthSession {
    match user {
        Some(user) => AuthSession {
            user: Some(user),
            ..session
        },
        None => session,
    }
}

/// Resolve a requested callback URL against `base`.
///
/// Relative paths and absolute URLs on the same origin are allowed; anything
/// else falls back to `base`.
#[must_use]
pub fn redirect(callback_url: Option<String>, base: &Url) -> Url {
    let Some(callback_url) = callback_url else {
        return base.clone();
    };

    if callback_url.starts_with('/') && !callback_url.starts_with("//") {
        return base.join(&callback_url).unwrap_or_else(|_| base.clone());
    }

    match Url::parse(&callback_url) {
        Ok(url) if url.origin() == base.origin() => url,
        _ => base.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use chrono::Duration;
    use uuid::Uuid;

    fn user(email: &str) -> User {
        User {
            id: Uuid::new_v4(),
            name: Some("Ada".to_string()),
            email: Some(email.to_string()),
            email_verified: None,
            image: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    fn base() -> Result<Url> {
        Ok(Url::parse("https://fluent-flow.dev")?)
    }

    #[test]
    fn enrich_sets_user_on_empty_session() {
        let session = AuthSession::new("token", Utc::now() + Duration::days(1));
        let record = user("ada@example.com");

        let enriched = enrich_session(session.clone(), Some(record.clone()));
        assert_eq!(enriched.user, Some(record));
        assert_eq!(enriched.expires, session.expires);
        assert_eq!(enriched.session_token, session.session_token);
    }

    #[test]
    fn enrich_replaces_existing_user_wholesale() {
        let mut session = AuthSession::new("token", Utc::now());
        session.user = Some(user("stale@example.com"));
        let record = user("fresh@example.com");

        let enriched = enrich_session(session, Some(record.clone()));
        assert_eq!(enriched.user, Some(record));
    }

    #[test]
    fn enrich_without_record_is_identity() {
        let mut session = AuthSession::new("token", Utc::now());
        session.user = Some(user("kept@example.com"));

        assert_eq!(enrich_session(session.clone(), None), session);
    }

    #[test]
    fn session_json_hides_token() -> Result<()> {
        let session = enrich_session(
            AuthSession::new("raw-token", Utc::now()),
            Some(user("ada@example.com")),
        );
        let value = serde_json::to_value(&session)?;
        assert!(value.get("session_token").is_none());
        assert!(!value.to_string().contains("raw-token"));
        assert_eq!(value["user"]["email"], "ada@example.com");
        Ok(())
    }

    #[test]
    fn redirect_defaults_to_base() -> Result<()> {
        assert_eq!(redirect(None, &base()?), base()?);
        Ok(())
    }

    #[test]
    fn redirect_allows_relative_and_same_origin() -> Result<()> {
        assert_eq!(
            redirect(Some("/dashboard?tab=1".to_string()), &base()?).as_str(),
            "https://fluent-flow.dev/dashboard?tab=1"
        );
        assert_eq!(
            redirect(Some("https://fluent-flow.dev/lists".to_string()), &base()?).as_str(),
            "https://fluent-flow.dev/lists"
        );
        Ok(())
    }

    #[test]
    fn redirect_rejects_foreign_origins() -> Result<()> {
        assert_eq!(
            redirect(Some("https://evil.example/".to_string()), &base()?),
            base()?
        );
        assert_eq!(redirect(Some("//evil.example".to_string()), &base()?), base()?);
        assert_eq!(
            redirect(Some("http://fluent-flow.dev/".to_string()), &base()?),
            base()?
        );
        Ok(())
    }
}
