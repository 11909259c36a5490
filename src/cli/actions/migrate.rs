use super::connect;
use crate::{cli::globals::GlobalArgs, identity::schema};
use anyhow::Result;
use tracing::info;

/// Apply the identity schema, then check every named constraint is in place.
/// # Errors
/// Returns an error if the database is unreachable, a statement fails, or a
/// constraint is missing afterwards.
pub async fn execute(globals: &GlobalArgs) -> Result<()> {
    let pool = connect(&globals.dsn).await?;

    schema::migrate(&pool).await?;
    schema::verify(&pool).await?;

    info!(
        tables = schema::Table::ALL.len(),
        constraints = schema::CONSTRAINTS.len(),
        "identity schema is up to date"
    );

    pool.close().await;

    Ok(())
}
