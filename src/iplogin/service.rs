//! The assembled IP login service shared by the middleware stages and routes.

use anyhow::anyhow;
use axum::http::{header::SET_COOKIE, HeaderMap, HeaderValue, Response};
use std::{net::SocketAddr, sync::Arc};
use tracing::{debug, info, warn};

use super::{
    access::{can_login_as_another_user, PermissionChecker},
    address::{client_address, AddressKey},
    config::IpLoginConfig,
    cookies::{self, CanLoginAsAnotherUser, UserLoggedIn},
    directory::{RangeDirectory, UserId},
    error::{Error, Result},
    gate::{LoginDecisionContext, LoginGate, LoginVerdict},
    session::{self, clear_session_cookie, session_cookie, ResolvedSession, SessionStore},
};

/// Outcome of the early stage for one request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EarlyDecision {
    pub verdict: LoginVerdict,
    /// The lookup ran and found nobody; the browser gets the attempted cookie.
    pub mark_attempted: bool,
    /// Set whenever the session cookie was looked up.
    pub session: Option<ResolvedSession>,
}

impl EarlyDecision {
    const SKIPPED: Self = Self {
        verdict: LoginVerdict::NoAction,
        mark_attempted: false,
        session: None,
    };
}

/// A session established by an automatic login, ready to be written to the
/// response.
#[derive(Clone, Debug)]
pub struct LoginSession {
    user_id: UserId,
    cookie: HeaderValue,
}

impl LoginSession {
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Issue the session cookie and mark the response as a real login.
    pub fn apply<B>(self, response: &mut Response<B>) {
        response.headers_mut().append(SET_COOKIE, self.cookie);
        response.extensions_mut().insert(UserLoggedIn);
    }
}

/// Result of ending a session.
#[derive(Clone, Debug)]
pub struct LogoutOutcome {
    pub clear_cookie: HeaderValue,
    /// Present when a user was actually logged in.
    pub can_login_as_another_user: Option<CanLoginAsAnotherUser>,
}

pub struct IpLogin {
    gate: LoginGate,
    directory: Arc<dyn RangeDirectory>,
    sessions: Arc<dyn SessionStore>,
    permissions: Arc<dyn PermissionChecker>,
    config: IpLoginConfig,
}

impl IpLogin {
    #[must_use]
    pub fn new(
        directory: Arc<dyn RangeDirectory>,
        sessions: Arc<dyn SessionStore>,
        permissions: Arc<dyn PermissionChecker>,
        config: IpLoginConfig,
    ) -> Self {
        Self {
            gate: LoginGate::new(directory.clone()),
            directory,
            sessions,
            permissions,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &IpLoginConfig {
        &self.config
    }

    #[must_use]
    pub fn sessions(&self) -> &dyn SessionStore {
        self.sessions.as_ref()
    }

    #[must_use]
    pub fn client_address(
        &self,
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
    ) -> Option<AddressKey> {
        client_address(headers, peer, self.config.trust_forwarded_headers())
    }

    /// Gather the decision inputs for a request and run the gate.
    ///
    /// Browsers carrying the attempted cookie are settled without touching the
    /// session store or the directory.
    ///
    /// # Errors
    /// Propagates directory and session store failures.
    pub async fn decide(
        &self,
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
    ) -> Result<EarlyDecision> {
        if cookies::attempted(headers) {
            return Ok(EarlyDecision::SKIPPED);
        }

        let authenticated = session::authenticated_user(self.sessions.as_ref(), headers).await?;
        let mut ctx = LoginDecisionContext {
            client_ip: self.client_address(headers, peer),
            is_authenticated: authenticated.is_some(),
            attempted_cookie_present: false,
            allow_different_user: cookies::allow_different_user(headers),
            matched_user_id: None,
        };
        let verdict = self.gate.evaluate(&mut ctx).await?;

        debug!(?verdict, client_ip = ?ctx.client_ip, "IP login decision");

        Ok(EarlyDecision {
            verdict,
            mark_attempted: ctx.lookup_missed(),
            session: Some(ResolvedSession(authenticated)),
        })
    }

    /// Establish a session for `user_id`.
    ///
    /// Returns `None` when the account no longer exists or is blocked; the
    /// request then simply continues anonymously.
    ///
    /// # Errors
    /// Propagates session store failures.
    pub async fn finalize_login(
        &self,
        user_id: UserId,
        address: Option<AddressKey>,
    ) -> Result<Option<LoginSession>> {
        let ttl = self.config.session_ttl_seconds();
        let Some(token) = self.sessions.start(user_id, ttl).await? else {
            warn!("IP login matched user {user_id} but the account is missing or blocked");
            return Ok(None);
        };

        let cookie = session_cookie(&token, ttl, self.config.session_cookie_secure())
            .map_err(|err| Error::Session(anyhow!("failed to build session cookie: {err}")))?;

        info!(
            user_id = user_id.get(),
            "Logging in user {user_id} through IP login from {}",
            display_address(address)
        );

        Ok(Some(LoginSession { user_id, cookie }))
    }

    /// Explicit login through the login-form link: look the address up and log
    /// in whoever matches.
    ///
    /// # Errors
    /// Propagates directory and session store failures.
    pub async fn login_from_address(
        &self,
        address: Option<AddressKey>,
    ) -> Result<Option<LoginSession>> {
        let Some(user_id) = self.gate.lookup(address).await? else {
            warn!(
                "IP login processing accessed without any matches from {}",
                display_address(address)
            );
            return Ok(None);
        };
        self.finalize_login(user_id, address).await
    }

    /// End the session behind `headers` and work out whether this browser may
    /// use another identity from now on.
    ///
    /// # Errors
    /// Propagates session store, directory and permission failures.
    pub async fn logout(
        &self,
        headers: &HeaderMap,
        address: Option<AddressKey>,
    ) -> Result<LogoutOutcome> {
        let clear_cookie = clear_session_cookie(self.config.session_cookie_secure());
        let Some(token) = session::session_token(headers) else {
            return Ok(LogoutOutcome {
                clear_cookie,
                can_login_as_another_user: None,
            });
        };

        let user_id = self.sessions.current_user(&token).await?;
        self.sessions.end(&token).await?;

        let Some(user_id) = user_id else {
            return Ok(LogoutOutcome {
                clear_cookie,
                can_login_as_another_user: None,
            });
        };

        let allowed = can_login_as_another_user(
            self.permissions.as_ref(),
            self.directory.as_ref(),
            user_id,
            address,
        )
        .await?;

        info!(user_id = user_id.get(), allowed, "Session closed");

        Ok(LogoutOutcome {
            clear_cookie,
            can_login_as_another_user: Some(CanLoginAsAnotherUser(allowed)),
        })
    }
}

impl std::fmt::Debug for IpLogin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpLogin")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn display_address(address: Option<AddressKey>) -> String {
    address.map_or_else(|| "an unknown address".to_string(), |ip| ip.to_string())
}
