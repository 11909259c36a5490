//! Map parsed arguments to the action to run.

use crate::cli::{
    actions::{Action, server::Args},
    commands::{self, auth, email},
    globals::GlobalArgs,
};
use anyhow::{Context, Result};
use secrecy::SecretString;

/// Map validated CLI matches to an action.
///
/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    match matches.subcommand() {
        Some((commands::CMD_MIGRATE, sub)) => Ok(Action::Migrate(globals(sub)?)),
        Some((commands::CMD_SWEEP, sub)) => Ok(Action::Sweep(globals(sub)?)),
        _ => server(matches),
    }
}

fn globals(matches: &clap::ArgMatches) -> Result<GlobalArgs> {
    let dsn = matches
        .get_one::<String>(commands::ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;
    Ok(GlobalArgs::new(dsn))
}

fn server(matches: &clap::ArgMatches) -> Result<Action> {
    let globals = globals(matches)?;
    let port = matches
        .get_one::<u16>(commands::ARG_PORT)
        .copied()
        .unwrap_or(8080);

    let auth_opts = auth::Options::parse(matches);
    let auth_secret = auth_opts
        .auth_secret
        .filter(|secret| !secret.trim().is_empty())
        .context("missing required argument: --auth-secret")?;
    let email_opts = email::Options::parse(matches);

    Ok(Action::Server(Args {
        port,
        globals,
        base_url: auth_opts.base_url,
        auth_secret: SecretString::from(auth_secret),
        session_max_age_seconds: auth_opts.session_max_age_seconds,
        email_from: email_opts.from,
        email_server: email_opts.server,
        email_server_token: email_opts.server_token.map(SecretString::from),
    }))
}
