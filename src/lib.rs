//! # iplogin
//!
//! Automatic session login by client address. An anonymous visitor whose
//! address falls inside a range assigned to a user account is transparently
//! logged in as that account.
//!
//! ## Request pipeline
//!
//! Every request passes, outermost first, through:
//!
//! - **Cookie policy:** turns response markers into the `ipLoginAttempted` and
//!   `ipLoginAsDifferentUser` cookies.
//! - **Early stage:** reads the session and cookies, consults the range
//!   directory and flags the request with a pending login.
//! - **Page cache:** never serves or stores a flagged request.
//! - **Session initialization:** resolves the session cookie for handlers.
//! - **Late stage:** performs the flagged login.
//!
//! With automatic login disabled only the cookie policy, page cache and
//! session initialization are assembled.
//!
//! ## Ranges
//!
//! Addresses are compared as 128-bit integers with IPv4 mapped into IPv6
//! space. Ranges are inclusive and may overlap; the largest user id wins.

pub mod api;
pub mod cli;
pub mod iplogin;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
