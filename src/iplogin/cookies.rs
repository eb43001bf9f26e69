//! Browser cookies that remember auto-login decisions across requests.
//!
//! Cookie names are part of the compatibility surface and must not change.
//! A value counts as set when it is non-empty and not `"0"`.

use axum::{
    extract::Request,
    http::{
        header::{COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, Response,
    },
    middleware::Next,
};

use super::gate::AllowDifferentUser;

/// Session-scoped marker: no range matched this browser, do not look again.
pub const ATTEMPTED_COOKIE: &str = "ipLoginAttempted";
/// Whether this browser may choose another identity after logging out.
pub const ALLOW_DIFFERENT_USER_COOKIE: &str = "ipLoginAsDifferentUser";

const ATTEMPTED_SET: &str = "ipLoginAttempted=1; Path=/; HttpOnly; SameSite=Lax";
const ATTEMPTED_CLEAR: &str = "ipLoginAttempted=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0";
// Ten years; the flag lives until a login clears it or a logout rewrites it.
const ALLOW_SET_TRUE: &str =
    "ipLoginAsDifferentUser=1; Path=/; HttpOnly; SameSite=Lax; Max-Age=315360000";
const ALLOW_SET_FALSE: &str =
    "ipLoginAsDifferentUser=0; Path=/; HttpOnly; SameSite=Lax; Max-Age=315360000";
const ALLOW_CLEAR: &str = "ipLoginAsDifferentUser=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0";

/// Response marker: a real login happened while producing this response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UserLoggedIn;

/// Response marker carrying the authorization collaborator's answer to "may
/// this browser act as someone else after logout".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CanLoginAsAnotherUser(pub bool);

/// Find a cookie value across every `Cookie` header of the request.
#[must_use]
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            let key = parts.next().map(str::trim);
            let val = parts.next().map(str::trim);
            if let (Some(key), Some(val)) = (key, val) {
                if key == name {
                    return Some(val.to_string());
                }
            }
        }
    }
    None
}

fn truthy(value: &str) -> bool {
    !value.is_empty() && value != "0"
}

#[must_use]
pub fn attempted(headers: &HeaderMap) -> bool {
    cookie_value(headers, ATTEMPTED_COOKIE).is_some_and(|value| truthy(&value))
}

#[must_use]
pub fn allow_different_user(headers: &HeaderMap) -> AllowDifferentUser {
    match cookie_value(headers, ALLOW_DIFFERENT_USER_COOKIE) {
        None => AllowDifferentUser::Absent,
        Some(value) if truthy(&value) => AllowDifferentUser::Allowed,
        Some(_) => AllowDifferentUser::Denied,
    }
}

/// Remember for the rest of the browser session that no range matched.
pub fn mark_attempted(headers: &mut HeaderMap) {
    headers.append(SET_COOKIE, HeaderValue::from_static(ATTEMPTED_SET));
}

/// Translate response markers into `Set-Cookie` headers.
pub fn apply_policy<B>(response: &mut Response<B>) {
    let logged_in = response.extensions().get::<UserLoggedIn>().is_some();
    let can_switch = response.extensions().get::<CanLoginAsAnotherUser>().copied();
    let headers = response.headers_mut();

    if logged_in {
        headers.append(SET_COOKIE, HeaderValue::from_static(ATTEMPTED_CLEAR));
        headers.append(SET_COOKIE, HeaderValue::from_static(ALLOW_CLEAR));
    }

    if let Some(CanLoginAsAnotherUser(allowed)) = can_switch {
        let cookie = if allowed {
            ALLOW_SET_TRUE
        } else {
            ALLOW_SET_FALSE
        };
        headers.append(SET_COOKIE, HeaderValue::from_static(cookie));
    }
}

/// Middleware running [`apply_policy`] on every response.
pub async fn cookie_policy(request: Request, next: Next) -> axum::response::Response {
    let mut response = next.run(request).await;
    apply_policy(&mut response);
    response
}
