//! Row types for the identity tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

/// Canonical identity record (`user` table).
#[derive(ToSchema, Serialize, Deserialize, FromRow, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    #[sqlx(rename = "emailVerified")]
    pub email_verified: Option<DateTime<Utc>>,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Fields supplied when a user is created; `id` and timestamps come from the database.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewUser {
    pub name: Option<String>,
    pub email: Option<String>,
    pub email_verified: Option<DateTime<Utc>>,
    pub image: Option<String>,
}

/// Partial update. `None` keeps the stored value; for the nullable columns
/// `Some(None)` clears it. `email` can be changed but not cleared.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserUpdate {
    pub id: Uuid,
    pub name: Option<Option<String>>,
    pub email: Option<String>,
    pub email_verified: Option<Option<DateTime<Utc>>>,
    pub image: Option<Option<String>>,
}

impl UserUpdate {
    #[must_use]
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            name: None,
            email: None,
            email_verified: None,
            image: None,
        }
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    #[must_use]
    pub fn with_email_verified(mut self, at: DateTime<Utc>) -> Self {
        self.email_verified = Some(Some(at));
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(Some(name.into()));
        self
    }

    #[must_use]
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(Some(image.into()));
        self
    }

    #[must_use]
    pub fn clear_name(mut self) -> Self {
        self.name = Some(None);
        self
    }

    #[must_use]
    pub fn clear_image(mut self) -> Self {
        self.image = Some(None);
        self
    }

    #[must_use]
    pub fn clear_email_verified(mut self) -> Self {
        self.email_verified = Some(None);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Oauth,
    Oidc,
    Email,
    Webauthn,
}

impl AccountType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Oauth => "oauth",
            Self::Oidc => "oidc",
            Self::Email => "email",
            Self::Webauthn => "webauthn",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for AccountType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "oauth" => Ok(Self::Oauth),
            "oidc" => Ok(Self::Oidc),
            "email" => Ok(Self::Email),
            "webauthn" => Ok(Self::Webauthn),
            _ => Err(format!("unknown account type: {value}")),
        }
    }
}

/// Linked credential, one per (provider, providerAccountId).
#[derive(FromRow, Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub user_id: Uuid,
    #[sqlx(rename = "type", try_from = "String")]
    pub account_type: AccountType,
    pub provider: String,
    #[sqlx(rename = "providerAccountId")]
    pub provider_account_id: String,
    pub refresh_token: Option<String>,
    pub access_token: Option<String>,
    pub expires_at: Option<i32>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
    pub id_token: Option<String>,
    pub session_state: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewAccount {
    pub user_id: Uuid,
    pub account_type: AccountType,
    pub provider: String,
    pub provider_account_id: String,
    pub refresh_token: Option<String>,
    pub access_token: Option<String>,
    pub expires_at: Option<i32>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
    pub id_token: Option<String>,
    pub session_state: Option<String>,
}

impl NewAccount {
    #[must_use]
    pub fn new(
        user_id: Uuid,
        account_type: AccountType,
        provider: impl Into<String>,
        provider_account_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            account_type,
            provider: provider.into(),
            provider_account_id: provider_account_id.into(),
            refresh_token: None,
            access_token: None,
            expires_at: None,
            token_type: None,
            scope: None,
            id_token: None,
            session_state: None,
        }
    }
}

/// Database session row.
#[derive(FromRow, Clone, Debug, PartialEq, Eq)]
pub struct Session {
    #[sqlx(rename = "sessionToken")]
    pub session_token: String,
    pub user_id: Uuid,
    pub expires: DateTime<Utc>,
}

impl Session {
    /// A session stops being valid at `expires`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires <= now
    }
}

/// One-time email challenge, keyed by (identifier, token).
#[derive(FromRow, Clone, Debug, PartialEq, Eq)]
pub struct VerificationToken {
    pub identifier: String,
    pub token: String,
    pub expires: DateTime<Utc>,
}

impl VerificationToken {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires <= now
    }
}

/// Registered hardware or platform credential.
#[derive(FromRow, Clone, Debug, PartialEq, Eq)]
pub struct Authenticator {
    #[sqlx(rename = "credentialID")]
    pub credential_id: String,
    pub user_id: Uuid,
    #[sqlx(rename = "providerAccountId")]
    pub provider_account_id: String,
    #[sqlx(rename = "credentialPublicKey")]
    pub credential_public_key: String,
    pub counter: i32,
    #[sqlx(rename = "credentialDeviceType")]
    pub credential_device_type: String,
    #[sqlx(rename = "credentialBackedUp")]
    pub credential_backed_up: bool,
    pub transports: Option<String>,
}
