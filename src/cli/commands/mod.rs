pub mod logging;
pub mod mfa;
pub mod store;

use clap::{
    Arg, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

pub const CMD_SERVER: &str = "server";
pub const CMD_LIMITS: &str = "limits";
pub const CMD_QUOTA: &str = "quota";

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

    let command = Command::new("campfyre-guard")
        .about("Request admission and multi-factor authentication")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("CAMPFYRE_PORT")
                .global(true)
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("dsn")
                .short('d')
                .long("dsn")
                .help("Database connection string (required by the server)")
                .env("CAMPFYRE_DSN")
                .global(true),
        )
        .arg(
            Arg::new("trusted-proxies")
                .long("trusted-proxies")
                .help("Number of reverse proxies in front of the server allowed to set X-Forwarded-For")
                .default_value("0")
                .env("CAMPFYRE_TRUSTED_PROXIES")
                .global(true)
                .value_parser(clap::value_parser!(usize)),
        )
        .subcommand(Command::new(CMD_SERVER).about("Run the HTTP API (default)"))
        .subcommand(Command::new(CMD_LIMITS).about("Print the effective rate limit table"))
        .subcommand(
            Command::new(CMD_QUOTA)
                .about("Inspect or consume the quota of one identity")
                .arg(
                    Arg::new("action")
                        .help("Action kind, example: user_login")
                        .required(true),
                )
                .arg(
                    Arg::new("identity")
                        .help("Identity as seen by the API, usually the client address")
                        .required(true),
                )
                .arg(
                    Arg::new("consume")
                        .long("consume")
                        .help("Consume this many units instead of only checking")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    Arg::new("reset")
                        .long("reset")
                        .help("Drop the quota record")
                        .action(clap::ArgAction::SetTrue)
                        .conflicts_with("consume"),
                ),
        );

    let command = store::with_args(command);
    let command = mfa::with_args(command);
    logging::with_args(command)
}
