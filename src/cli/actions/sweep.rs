use super::connect;
use crate::{cli::globals::GlobalArgs, identity::adapter};
use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;

/// Delete sessions and verification tokens whose expiry has passed.
/// # Errors
/// Returns an error if the database is unreachable or a delete fails.
pub async fn execute(globals: &GlobalArgs) -> Result<()> {
    let pool = connect(&globals.dsn).await?;
    let now = Utc::now();

    let sessions = adapter::delete_expired_sessions(&pool, now)
        .await
        .context("Failed to delete expired sessions")?;
    let tokens = adapter::delete_expired_verification_tokens(&pool, now)
        .await
        .context("Failed to delete expired verification tokens")?;

    info!(sessions, tokens, "expired rows deleted");

    pool.close().await;

    Ok(())
}
