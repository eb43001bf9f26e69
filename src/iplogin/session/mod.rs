//! Session store contract and session cookie handling.
//!
//! The raw token only ever lives in the browser cookie; stores keep a SHA-256
//! hash of it.

mod memory;
mod postgres;

pub use memory::MemorySessionStore;
pub use postgres::PgSessionStore;

use anyhow::Context;
use async_trait::async_trait;
use axum::http::{header::InvalidHeaderValue, HeaderMap, HeaderValue};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

use super::cookies::cookie_value;
use super::directory::UserId;
use super::error::{Error, Result};

pub const SESSION_COOKIE_NAME: &str = "iplogin_session";

/// Request extension holding the identity behind the session cookie, set by
/// session initialization and by a successful automatic login.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CurrentUser(pub UserId);

/// Request extension carrying a session cookie already resolved earlier in the
/// pipeline, so later stages do not ask the store again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedSession(pub Option<UserId>);

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Resolve a session token to its user, if the session is live.
    async fn current_user(&self, token: &str) -> Result<Option<UserId>>;

    /// Establish a session for `user_id`. Returns `None` when the account does
    /// not exist or is blocked.
    async fn start(&self, user_id: UserId, ttl_seconds: i64) -> Result<Option<String>>;

    /// End a session. Unknown tokens are not an error.
    async fn end(&self, token: &str) -> Result<()>;
}

/// Session token presented by the browser, if any.
#[must_use]
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    cookie_value(headers, SESSION_COOKIE_NAME).filter(|token| !token.is_empty())
}

/// Read the identity behind the request's session cookie without touching it.
///
/// # Errors
/// Propagates store failures.
pub async fn authenticated_user(
    store: &dyn SessionStore,
    headers: &HeaderMap,
) -> Result<Option<UserId>> {
    match session_token(headers) {
        Some(token) => store.current_user(&token).await,
        None => Ok(None),
    }
}

pub(crate) fn generate_session_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session token")
        .map_err(Error::Session)?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

pub(crate) fn hash_session_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Build the `HttpOnly` session cookie.
///
/// # Errors
/// Fails when the token contains characters not allowed in a header.
pub fn session_cookie(
    token: &str,
    ttl_seconds: i64,
    secure: bool,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

#[must_use]
pub fn clear_session_cookie(secure: bool) -> HeaderValue {
    if secure {
        HeaderValue::from_static("iplogin_session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0; Secure")
    } else {
        HeaderValue::from_static("iplogin_session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
    }
}
