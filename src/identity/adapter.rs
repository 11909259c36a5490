//! Storage adapter for the auth flow.
//!
//! Every read and write of identity data goes through these functions. They
//! map one auth operation to one SQL statement; integrity (uniqueness,
//! composite keys, cascades) is left to the database. Storage failures are
//! returned as [`AdapterError::Storage`] without rewording.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgExecutor, PgPool};
use thiserror::Error;
use tracing::{Instrument, Span, info_span};
use uuid::Uuid;

use super::models::{
    Account, AccountType, Authenticator, NewAccount, NewUser, Session, User, UserUpdate,
    VerificationToken,
};

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Storage(#[from] sqlx::Error),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error(
        "authenticator {credential_id} counter would go from {stored} to {attempted}"
    )]
    CounterRegression {
        credential_id: String,
        stored: i32,
        attempted: i32,
    },
}

impl AdapterError {
    /// True when the database rejected a row for breaking a unique or primary key.
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Storage(sqlx::Error::Database(db_err)) => {
                db_err.code().is_some_and(|code| code.as_ref() == "23505")
            }
            _ => false,
        }
    }
}

pub type AdapterResult<T> = Result<T, AdapterError>;

fn db_span(operation: &str, statement: &str) -> Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

pub async fn create_user<'e, E>(executor: E, user: &NewUser) -> AdapterResult<User>
where
    E: PgExecutor<'e>,
{
    let query = r#"
        INSERT INTO "user" (name, email, "emailVerified", image)
        VALUES ($1, $2, $3, $4)
        RETURNING id, name, email, "emailVerified", image, created_at, updated_at
    "#;
    let user = sqlx::query_as::<_, User>(query)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.email_verified)
        .bind(&user.image)
        .fetch_one(executor)
        .instrument(db_span("INSERT", query))
        .await?;

    Ok(user)
}

pub async fn get_user(pool: &PgPool, id: Uuid) -> AdapterResult<Option<User>> {
    let query = r#"
        SELECT id, name, email, "emailVerified", image, created_at, updated_at
        FROM "user"
        WHERE id = $1
    "#;
    let user = sqlx::query_as::<_, User>(query)
        .bind(id)
        .fetch_optional(pool)
        .instrument(db_span("SELECT", query))
        .await?;

    Ok(user)
}

pub async fn get_user_by_email(pool: &PgPool, email: &str) -> AdapterResult<Option<User>> {
    let query = r#"
        SELECT id, name, email, "emailVerified", image, created_at, updated_at
        FROM "user"
        WHERE email = $1
    "#;
    let user = sqlx::query_as::<_, User>(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(db_span("SELECT", query))
        .await?;

    Ok(user)
}

pub async fn get_user_by_account(
    pool: &PgPool,
    provider: &str,
    provider_account_id: &str,
) -> AdapterResult<Option<User>> {
    let query = r#"
        SELECT u.id, u.name, u.email, u."emailVerified", u.image, u.created_at, u.updated_at
        FROM "user" u
        JOIN account a ON a.user_id = u.id
        WHERE a.provider = $1 AND a."providerAccountId" = $2
    "#;
    let user = sqlx::query_as::<_, User>(query)
        .bind(provider)
        .bind(provider_account_id)
        .fetch_optional(pool)
        .instrument(db_span("SELECT", query))
        .await?;

    Ok(user)
}

/// Apply a [`UserUpdate`]. Each nullable column takes a "set" flag next to its
/// value so that it can be cleared as well as changed.
pub async fn update_user(pool: &PgPool, update: &UserUpdate) -> AdapterResult<User> {
    let query = r#"
        UPDATE "user"
        SET name = CASE WHEN $2 THEN $3 ELSE name END,
            email = COALESCE($4, email),
            "emailVerified" = CASE WHEN $5 THEN $6 ELSE "emailVerified" END,
            image = CASE WHEN $7 THEN $8 ELSE image END,
            updated_at = NOW()
        WHERE id = $1
        RETURNING id, name, email, "emailVerified", image, created_at, updated_at
    "#;
    sqlx::query_as::<_, User>(query)
        .bind(update.id)
        .bind(update.name.is_some())
        .bind(update.name.clone().flatten())
        .bind(&update.email)
        .bind(update.email_verified.is_some())
        .bind(update.email_verified.flatten())
        .bind(update.image.is_some())
        .bind(update.image.clone().flatten())
        .fetch_optional(pool)
        .instrument(db_span("UPDATE", query))
        .await?
        .ok_or(AdapterError::NotFound("user"))
}

/// Delete a user; accounts, sessions and authenticators go with it.
pub async fn delete_user(pool: &PgPool, id: Uuid) -> AdapterResult<bool> {
    let query = r#"DELETE FROM "user" WHERE id = $1"#;
    let result = sqlx::query(query)
        .bind(id)
        .execute(pool)
        .instrument(db_span("DELETE", query))
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Link an account to a user. A second row for the same
/// (provider, providerAccountId) is rejected by the primary key.
pub async fn link_account<'e, E>(executor: E, account: &NewAccount) -> AdapterResult<Account>
where
    E: PgExecutor<'e>,
{
    let query = r#"
        INSERT INTO account
            (user_id, type, provider, "providerAccountId", refresh_token, access_token,
             expires_at, token_type, scope, id_token, session_state)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING user_id, type, provider, "providerAccountId", refresh_token, access_token,
                  expires_at, token_type, scope, id_token, session_state, created_at, updated_at
    "#;
    let account = sqlx::query_as::<_, Account>(query)
        .bind(account.user_id)
        .bind(account.account_type.as_str())
        .bind(&account.provider)
        .bind(&account.provider_account_id)
        .bind(&account.refresh_token)
        .bind(&account.access_token)
        .bind(account.expires_at)
        .bind(&account.token_type)
        .bind(&account.scope)
        .bind(&account.id_token)
        .bind(&account.session_state)
        .fetch_one(executor)
        .instrument(db_span("INSERT", query))
        .await?;

    Ok(account)
}

/// Create a user and its first account in one transaction. When the link is
/// rejected the user row is rolled back with it.
pub async fn create_user_with_account(
    pool: &PgPool,
    user: &NewUser,
    account_type: AccountType,
    provider: &str,
    provider_account_id: &str,
) -> AdapterResult<(User, Account)> {
    let mut tx = pool.begin().await?;

    let user = create_user(&mut *tx, user).await?;
    let account = link_account(
        &mut *tx,
        &NewAccount::new(user.id, account_type, provider, provider_account_id),
    )
    .await?;

    tx.commit().await?;

    Ok((user, account))
}

pub async fn get_account(
    pool: &PgPool,
    provider: &str,
    provider_account_id: &str,
) -> AdapterResult<Option<Account>> {
    let query = r#"
        SELECT user_id, type, provider, "providerAccountId", refresh_token, access_token,
               expires_at, token_type, scope, id_token, session_state, created_at, updated_at
        FROM account
        WHERE provider = $1 AND "providerAccountId" = $2
    "#;
    let account = sqlx::query_as::<_, Account>(query)
        .bind(provider)
        .bind(provider_account_id)
        .fetch_optional(pool)
        .instrument(db_span("SELECT", query))
        .await?;

    Ok(account)
}

pub async fn unlink_account(
    pool: &PgPool,
    provider: &str,
    provider_account_id: &str,
) -> AdapterResult<bool> {
    let query = r#"DELETE FROM account WHERE provider = $1 AND "providerAccountId" = $2"#;
    let result = sqlx::query(query)
        .bind(provider)
        .bind(provider_account_id)
        .execute(pool)
        .instrument(db_span("DELETE", query))
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn create_session(pool: &PgPool, session: &Session) -> AdapterResult<Session> {
    let query = r#"
        INSERT INTO session ("sessionToken", user_id, expires)
        VALUES ($1, $2, $3)
        RETURNING "sessionToken", user_id, expires
    "#;
    let session = sqlx::query_as::<_, Session>(query)
        .bind(&session.session_token)
        .bind(session.user_id)
        .bind(session.expires)
        .fetch_one(pool)
        .instrument(db_span("INSERT", query))
        .await?;

    Ok(session)
}

/// Load a session together with the user it belongs to.
///
/// Expiry is not checked here; callers decide what to do with an expired row.
pub async fn get_session_and_user(
    pool: &PgPool,
    session_token: &str,
) -> AdapterResult<Option<(Session, User)>> {
    let query = r#"
        SELECT s."sessionToken", s.user_id, s.expires,
               u.id, u.name, u.email, u."emailVerified", u.image, u.created_at, u.updated_at
        FROM session s
        JOIN "user" u ON u.id = s.user_id
        WHERE s."sessionToken" = $1
    "#;
    let row = sqlx::query(query)
        .bind(session_token)
        .fetch_optional(pool)
        .instrument(db_span("SELECT", query))
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    Ok(Some((Session::from_row(&row)?, User::from_row(&row)?)))
}

pub async fn update_session(
    pool: &PgPool,
    session_token: &str,
    expires: DateTime<Utc>,
) -> AdapterResult<Option<Session>> {
    let query = r#"
        UPDATE session
        SET expires = $2
        WHERE "sessionToken" = $1
        RETURNING "sessionToken", user_id, expires
    "#;
    let session = sqlx::query_as::<_, Session>(query)
        .bind(session_token)
        .bind(expires)
        .fetch_optional(pool)
        .instrument(db_span("UPDATE", query))
        .await?;

    Ok(session)
}

pub async fn delete_session(pool: &PgPool, session_token: &str) -> AdapterResult<bool> {
    let query = r#"DELETE FROM session WHERE "sessionToken" = $1"#;
    let result = sqlx::query(query)
        .bind(session_token)
        .execute(pool)
        .instrument(db_span("DELETE", query))
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn create_verification_token(
    pool: &PgPool,
    token: &VerificationToken,
) -> AdapterResult<VerificationToken> {
    let query = r#"
        INSERT INTO "verificationToken" (identifier, token, expires)
        VALUES ($1, $2, $3)
        RETURNING identifier, token, expires
    "#;
    let token = sqlx::query_as::<_, VerificationToken>(query)
        .bind(&token.identifier)
        .bind(&token.token)
        .bind(token.expires)
        .fetch_one(pool)
        .instrument(db_span("INSERT", query))
        .await?;

    Ok(token)
}

/// Redeem a verification token. The row is deleted in the same statement, so a
/// token can be redeemed once; expired rows are returned too and must be
/// rejected by the caller.
pub async fn use_verification_token(
    pool: &PgPool,
    identifier: &str,
    token: &str,
) -> AdapterResult<Option<VerificationToken>> {
    let query = r#"
        DELETE FROM "verificationToken"
        WHERE identifier = $1 AND token = $2
        RETURNING identifier, token, expires
    "#;
    let token = sqlx::query_as::<_, VerificationToken>(query)
        .bind(identifier)
        .bind(token)
        .fetch_optional(pool)
        .instrument(db_span("DELETE", query))
        .await?;

    Ok(token)
}

pub async fn create_authenticator(
    pool: &PgPool,
    authenticator: &Authenticator,
) -> AdapterResult<Authenticator> {
    let query = r#"
        INSERT INTO authenticator
            ("credentialID", user_id, "providerAccountId", "credentialPublicKey", counter,
             "credentialDeviceType", "credentialBackedUp", transports)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING "credentialID", user_id, "providerAccountId", "credentialPublicKey", counter,
                  "credentialDeviceType", "credentialBackedUp", transports
    "#;
    let authenticator = sqlx::query_as::<_, Authenticator>(query)
        .bind(&authenticator.credential_id)
        .bind(authenticator.user_id)
        .bind(&authenticator.provider_account_id)
        .bind(&authenticator.credential_public_key)
        .bind(authenticator.counter)
        .bind(&authenticator.credential_device_type)
        .bind(authenticator.credential_backed_up)
        .bind(&authenticator.transports)
        .fetch_one(pool)
        .instrument(db_span("INSERT", query))
        .await?;

    Ok(authenticator)
}

pub async fn get_authenticator(
    pool: &PgPool,
    credential_id: &str,
) -> AdapterResult<Option<Authenticator>> {
    let query = r#"
        SELECT "credentialID", user_id, "providerAccountId", "credentialPublicKey", counter,
               "credentialDeviceType", "credentialBackedUp", transports
        FROM authenticator
        WHERE "credentialID" = $1
    "#;
    let authenticator = sqlx::query_as::<_, Authenticator>(query)
        .bind(credential_id)
        .fetch_optional(pool)
        .instrument(db_span("SELECT", query))
        .await?;

    Ok(authenticator)
}

pub async fn list_authenticators_by_user_id(
    pool: &PgPool,
    user_id: Uuid,
) -> AdapterResult<Vec<Authenticator>> {
    let query = r#"
        SELECT "credentialID", user_id, "providerAccountId", "credentialPublicKey", counter,
               "credentialDeviceType", "credentialBackedUp", transports
        FROM authenticator
        WHERE user_id = $1
        ORDER BY "credentialID"
    "#;
    let authenticators = sqlx::query_as::<_, Authenticator>(query)
        .bind(user_id)
        .fetch_all(pool)
        .instrument(db_span("SELECT", query))
        .await?;

    Ok(authenticators)
}

/// Store a new signature counter. The update only applies when the counter does
/// not go backwards; a lower value is reported as `CounterRegression`.
pub async fn update_authenticator_counter(
    pool: &PgPool,
    credential_id: &str,
    counter: i32,
) -> AdapterResult<Authenticator> {
    let query = r#"
        UPDATE authenticator
        SET counter = $2
        WHERE "credentialID" = $1 AND counter <= $2
        RETURNING "credentialID", user_id, "providerAccountId", "credentialPublicKey", counter,
                  "credentialDeviceType", "credentialBackedUp", transports
    "#;
    let updated = sqlx::query_as::<_, Authenticator>(query)
        .bind(credential_id)
        .bind(counter)
        .fetch_optional(pool)
        .instrument(db_span("UPDATE", query))
        .await?;

    if let Some(authenticator) = updated {
        return Ok(authenticator);
    }

    match get_authenticator(pool, credential_id).await? {
        Some(stored) => Err(AdapterError::CounterRegression {
            credential_id: credential_id.to_string(),
            stored: stored.counter,
            attempted: counter,
        }),
        None => Err(AdapterError::NotFound("authenticator")),
    }
}

pub async fn delete_expired_sessions(pool: &PgPool, now: DateTime<Utc>) -> AdapterResult<u64> {
    let query = "DELETE FROM session WHERE expires <= $1";
    let result = sqlx::query(query)
        .bind(now)
        .execute(pool)
        .instrument(db_span("DELETE", query))
        .await?;

    Ok(result.rows_affected())
}

pub async fn delete_expired_verification_tokens(
    pool: &PgPool,
    now: DateTime<Utc>,
) -> AdapterResult<u64> {
    let query = r#"DELETE FROM "verificationToken" WHERE expires <= $1"#;
    let result = sqlx::query(query)
        .bind(now)
        .execute(pool)
        .instrument(db_span("DELETE", query))
        .await?;

    Ok(result.rows_affected())
}
