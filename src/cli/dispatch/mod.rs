//! Command-line argument dispatch.
//!
//! Maps validated CLI matches to the action the binary executes.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{iplogin, ARG_DSN, ARG_PORT, ARG_SEED_FILE};
use anyhow::{anyhow, Result};
use secrecy::SecretString;
use std::path::PathBuf;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .map(SecretString::from);
    let seed_file = matches.get_one::<PathBuf>(ARG_SEED_FILE).cloned();

    if dsn.is_none() && seed_file.is_none() {
        return Err(anyhow!(
            "missing required argument: --{ARG_DSN} or --{ARG_SEED_FILE}"
        ));
    }

    let options = iplogin::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        seed_file,
        auto_login: options.auto_login,
        form_login: options.form_login,
        session_ttl_seconds: options.session_ttl_seconds,
        session_cookie_secure: options.session_cookie_secure,
        trust_forwarded_headers: options.trust_forwarded_headers,
        page_cache_ttl_seconds: options.page_cache_ttl_seconds,
    }))
}
