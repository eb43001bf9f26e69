pub mod iplogin;
pub mod logging;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ArgGroup, ColorChoice, Command,
};

pub const ARG_PORT: &str = "port";
pub const ARG_DSN: &str = "dsn";
pub const ARG_SEED_FILE: &str = "seed-file";

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

    let command = Command::new("iplogin")
        .about("Automatic login by client IP address")
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
                .env("IPLOGIN_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long(ARG_DSN)
                .help("Database connection string")
                .env("IPLOGIN_DSN")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_SEED_FILE)
                .long(ARG_SEED_FILE)
                .help("JSON seed file for running without a database")
                .env("IPLOGIN_SEED_FILE")
                .value_parser(clap::value_parser!(std::path::PathBuf)),
        )
        .group(
            ArgGroup::new("storage")
                .args([ARG_DSN, ARG_SEED_FILE])
                .required(true),
        );

    let command = iplogin::with_args(command);
    logging::with_args(command)
}
