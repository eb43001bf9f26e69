use anyhow::{Context, Result};
use clap::{builder::BoolishValueParser, Arg, ArgAction, ArgMatches, Command};

pub const ARG_AUTO_LOGIN: &str = "auto-login";
pub const ARG_FORM_LOGIN: &str = "form-login";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_SESSION_COOKIE_SECURE: &str = "session-cookie-secure";
pub const ARG_TRUST_FORWARDED_HEADERS: &str = "trust-forwarded-headers";
pub const ARG_PAGE_CACHE_TTL_SECONDS: &str = "page-cache-ttl-seconds";

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_login_args(command);
    with_http_args(command)
}

fn with_login_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_AUTO_LOGIN)
                .long(ARG_AUTO_LOGIN)
                .help("Log visitors in automatically when their address matches a range")
                .env("IPLOGIN_AUTO_LOGIN")
                .default_value("true")
                .action(ArgAction::Set)
                .value_parser(BoolishValueParser::new()),
        )
        .arg(
            Arg::new(ARG_FORM_LOGIN)
                .long(ARG_FORM_LOGIN)
                .help("Offer the /user/login/ip route for explicit address login")
                .env("IPLOGIN_FORM_LOGIN")
                .default_value("false")
                .action(ArgAction::Set)
                .value_parser(BoolishValueParser::new()),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Session cookie TTL in seconds")
                .env("IPLOGIN_SESSION_TTL_SECONDS")
                .default_value("43200")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
}

fn with_http_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SESSION_COOKIE_SECURE)
                .long(ARG_SESSION_COOKIE_SECURE)
                .help("Mark the session cookie Secure (serve over HTTPS)")
                .env("IPLOGIN_SESSION_COOKIE_SECURE")
                .default_value("false")
                .action(ArgAction::Set)
                .value_parser(BoolishValueParser::new()),
        )
        .arg(
            Arg::new(ARG_TRUST_FORWARDED_HEADERS)
                .long(ARG_TRUST_FORWARDED_HEADERS)
                .help("Take the client address from X-Forwarded-For / X-Real-IP")
                .long_help(
                    "Take the client address from X-Forwarded-For / X-Real-IP. Enable only behind a reverse proxy that overwrites these headers.",
                )
                .env("IPLOGIN_TRUST_FORWARDED_HEADERS")
                .default_value("false")
                .action(ArgAction::Set)
                .value_parser(BoolishValueParser::new()),
        )
        .arg(
            Arg::new(ARG_PAGE_CACHE_TTL_SECONDS)
                .long(ARG_PAGE_CACHE_TTL_SECONDS)
                .help("Anonymous page cache TTL in seconds (0 disables reuse)")
                .env("IPLOGIN_PAGE_CACHE_TTL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub auto_login: bool,
    pub form_login: bool,
    pub session_ttl_seconds: i64,
    pub session_cookie_secure: bool,
    pub trust_forwarded_headers: bool,
    pub page_cache_ttl_seconds: u64,
}

impl Options {
    /// # Errors
    /// Returns an error when a defaulted argument is somehow missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let flag = |name: &str| -> Result<bool> {
            matches
                .get_one::<bool>(name)
                .copied()
                .with_context(|| format!("missing required argument: --{name}"))
        };

        Ok(Self {
            auto_login: flag(ARG_AUTO_LOGIN)?,
            form_login: flag(ARG_FORM_LOGIN)?,
            session_ttl_seconds: matches
                .get_one::<i64>(ARG_SESSION_TTL_SECONDS)
                .copied()
                .context("missing required argument: --session-ttl-seconds")?,
            session_cookie_secure: flag(ARG_SESSION_COOKIE_SECURE)?,
            trust_forwarded_headers: flag(ARG_TRUST_FORWARDED_HEADERS)?,
            page_cache_ttl_seconds: matches
                .get_one::<u64>(ARG_PAGE_CACHE_TTL_SECONDS)
                .copied()
                .context("missing required argument: --page-cache-ttl-seconds")?,
        })
    }
}
