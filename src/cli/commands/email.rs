use clap::{Arg, ArgMatches, Command};

pub const ARG_EMAIL_FROM: &str = "email-from";
pub const ARG_EMAIL_SERVER: &str = "email-server";
pub const ARG_EMAIL_SERVER_TOKEN: &str = "email-server-token";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_EMAIL_FROM)
                .long(ARG_EMAIL_FROM)
                .help("Sender address for outgoing email")
                .env("FLUENT_FLOW_EMAIL_FROM")
                .default_value("noreply@fluent-flow.dev"),
        )
        .arg(
            Arg::new(ARG_EMAIL_SERVER)
                .long(ARG_EMAIL_SERVER)
                .help("Mail relay URL; email is only logged when unset")
                .env("FLUENT_FLOW_EMAIL_SERVER"),
        )
        .arg(
            Arg::new(ARG_EMAIL_SERVER_TOKEN)
                .long(ARG_EMAIL_SERVER_TOKEN)
                .help("Bearer token for the mail relay")
                .env("FLUENT_FLOW_EMAIL_SERVER_TOKEN")
                .hide_env_values(true)
                .requires(ARG_EMAIL_SERVER),
        )
}

pub struct Options {
    pub from: String,
    pub server: Option<String>,
    pub server_token: Option<String>,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        Self {
            from: matches
                .get_one::<String>(ARG_EMAIL_FROM)
                .cloned()
                .unwrap_or_else(|| "noreply@fluent-flow.dev".to_string()),
            server: matches.get_one::<String>(ARG_EMAIL_SERVER).cloned(),
            server_token: matches.get_one::<String>(ARG_EMAIL_SERVER_TOKEN).cloned(),
        }
    }
}
