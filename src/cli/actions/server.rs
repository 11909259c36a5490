use super::connect;
use crate::{
    api::{
        self,
        handlers::auth::{AuthConfig, AuthState},
    },
    cli::globals::GlobalArgs,
    email::{EmailDispatcher, EmailTransport, HttpTransport, LogTransport, SENDER_NAME, Sender},
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub globals: GlobalArgs,
    pub base_url: String,
    pub auth_secret: SecretString,
    pub session_max_age_seconds: i64,
    pub email_from: String,
    pub email_server: Option<String>,
    pub email_server_token: Option<SecretString>,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the configuration is invalid, the database is
/// unreachable, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    debug!("Server args: {:?}", args);

    let base_url = Url::parse(&args.base_url)
        .with_context(|| format!("Invalid base URL: {}", args.base_url))?;

    let transport = email_transport(args.email_server.as_deref(), args.email_server_token)?;
    let dispatcher = EmailDispatcher::new(Sender::new(SENDER_NAME, args.email_from), transport);

    let auth_config = AuthConfig::new(base_url, args.auth_secret)
        .with_session_max_age_seconds(args.session_max_age_seconds);
    let auth_state = Arc::new(AuthState::new(auth_config, dispatcher));

    let pool = connect(&args.globals.dsn).await?;

    api::new(args.port, pool, auth_state).await
}

fn email_transport(
    server: Option<&str>,
    token: Option<SecretString>,
) -> Result<Arc<dyn EmailTransport>> {
    match server {
        Some(url) => {
            let transport = HttpTransport::new(url, token)?;
            info!(url = %transport.url(), "sending email through relay");
            Ok(Arc::new(transport))
        }
        None => {
            warn!("no email server configured, sign-in emails will only be logged");
            Ok(Arc::new(LogTransport))
        }
    }
}
