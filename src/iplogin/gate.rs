//! Auto-login decision.
//!
//! `decide` is a pure function of the gathered inputs. `LoginGate::evaluate`
//! is the only place that consults the directory, and it does so only when the
//! context says a lookup can change the outcome.

use std::sync::Arc;

use super::address::AddressKey;
use super::directory::{RangeDirectory, UserId};
use super::error::Result;

/// Browser-level memory of whether this visitor may pick another identity
/// after logging out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AllowDifferentUser {
    #[default]
    Absent,
    Denied,
    Allowed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoginVerdict {
    LoginAs(UserId),
    NoAction,
    Suppressed,
}

/// Inputs for one request. Built at the start of request processing and
/// dropped with it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoginDecisionContext {
    pub client_ip: Option<AddressKey>,
    pub is_authenticated: bool,
    pub attempted_cookie_present: bool,
    pub allow_different_user: AllowDifferentUser,
    pub matched_user_id: Option<UserId>,
}

impl LoginDecisionContext {
    /// Whether a directory lookup can influence the verdict.
    #[must_use]
    pub fn needs_lookup(&self) -> bool {
        !self.is_authenticated && !self.attempted_cookie_present
    }

    /// The lookup ran (or could not run for lack of an address) and found
    /// nobody. This is what earns the browser the attempted cookie.
    #[must_use]
    pub fn lookup_missed(&self) -> bool {
        self.needs_lookup() && self.matched_user_id.is_none()
    }
}

#[must_use]
pub fn decide(ctx: &LoginDecisionContext) -> LoginVerdict {
    if !ctx.needs_lookup() {
        return LoginVerdict::NoAction;
    }
    let Some(user_id) = ctx.matched_user_id else {
        return LoginVerdict::NoAction;
    };
    match ctx.allow_different_user {
        // First visit, or logged out without the right to switch identity.
        AllowDifferentUser::Absent | AllowDifferentUser::Denied => LoginVerdict::LoginAs(user_id),
        // Logged out and free to choose; wait for the visitor.
        AllowDifferentUser::Allowed => LoginVerdict::Suppressed,
    }
}

#[derive(Clone)]
pub struct LoginGate {
    directory: Arc<dyn RangeDirectory>,
}

impl LoginGate {
    #[must_use]
    pub fn new(directory: Arc<dyn RangeDirectory>) -> Self {
        Self { directory }
    }

    /// Fill `matched_user_id` when a lookup is needed, then decide.
    ///
    /// # Errors
    /// Propagates directory failures.
    pub async fn evaluate(&self, ctx: &mut LoginDecisionContext) -> Result<LoginVerdict> {
        if ctx.needs_lookup() {
            ctx.matched_user_id = match ctx.client_ip {
                Some(address) => self.directory.lookup(address).await?,
                None => None,
            };
        }
        Ok(decide(ctx))
    }

    /// Direct lookup, used by the login-link route.
    ///
    /// # Errors
    /// Propagates directory failures.
    pub async fn lookup(&self, address: Option<AddressKey>) -> Result<Option<UserId>> {
        match address {
            Some(address) => self.directory.lookup(address).await,
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for LoginGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginGate").finish_non_exhaustive()
    }
}
