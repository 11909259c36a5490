pub mod auth;
pub mod email;
pub mod logging;

use clap::{
    Arg, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

pub const ARG_PORT: &str = "port";
pub const ARG_DSN: &str = "dsn";
pub const CMD_MIGRATE: &str = "migrate";
pub const CMD_SWEEP: &str = "sweep";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("fluent-flow")
        .about("Passwordless email sign-in and identity service")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("8080")
                .env("FLUENT_FLOW_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long(ARG_DSN)
                .help("Database connection string")
                .env("FLUENT_FLOW_DSN")
                .hide_env_values(true)
                .global(true),
        )
        .subcommand(
            Command::new(CMD_MIGRATE)
                .about("Apply the identity schema and check its constraints"),
        )
        .subcommand(
            Command::new(CMD_SWEEP).about("Delete expired sessions and verification tokens"),
        );

    let command = auth::with_args(command);
    let command = email::with_args(command);
    logging::with_args(command)
}
