pub mod migrate;
pub mod server;
pub mod sweep;

// The match over actions lives in run.rs.
mod run;

use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

use crate::cli::globals::GlobalArgs;

#[derive(Debug)]
pub enum Action {
    Server(server::Args),
    Migrate(GlobalArgs),
    Sweep(GlobalArgs),
}

impl Action {
    /// Execute the action.
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> Result<()> {
        run::execute(self).await
    }
}

/// Connect to the database named by the DSN.
pub(crate) async fn connect(dsn: &SecretString) -> Result<PgPool> {
    PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(dsn.expose_secret())
        .await
        .context("Failed to connect to database")
}
