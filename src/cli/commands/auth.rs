use crate::api::handlers::auth::MAX_AGE_SECONDS;
use clap::{Arg, ArgMatches, Command};

pub const ARG_BASE_URL: &str = "base-url";
pub const ARG_AUTH_SECRET: &str = "auth-secret";
pub const ARG_SESSION_MAX_AGE: &str = "session-max-age";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_BASE_URL)
                .long(ARG_BASE_URL)
                .help("Public base URL used for sign-in links and cookie security")
                .env("FLUENT_FLOW_BASE_URL")
                .default_value("http://localhost:8080"),
        )
        .arg(
            Arg::new(ARG_AUTH_SECRET)
                .long(ARG_AUTH_SECRET)
                .help("Secret mixed into verification token hashes")
                .env("FLUENT_FLOW_AUTH_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_SESSION_MAX_AGE)
                .long(ARG_SESSION_MAX_AGE)
                .help("Session lifetime in seconds (at most ten years)")
                .env("FLUENT_FLOW_SESSION_MAX_AGE")
                .default_value("2592000")
                .value_parser(clap::value_parser!(i64).range(1..=MAX_AGE_SECONDS)),
        )
}

pub struct Options {
    pub base_url: String,
    pub auth_secret: Option<String>,
    pub session_max_age_seconds: i64,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        Self {
            base_url: matches
                .get_one::<String>(ARG_BASE_URL)
                .cloned()
                .unwrap_or_else(|| "http://localhost:8080".to_string()),
            auth_secret: matches.get_one::<String>(ARG_AUTH_SECRET).cloned(),
            session_max_age_seconds: matches
                .get_one::<i64>(ARG_SESSION_MAX_AGE)
                .copied()
                .unwrap_or(2_592_000),
        }
    }
}
