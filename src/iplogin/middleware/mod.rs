//! Two-stage request pipeline.
//!
//! The early stage runs outside the page cache: it decides and flags the
//! request with [`PendingLogin`]. The late stage runs inside the page cache and
//! after session initialization: it performs the login. Keeping them apart lets
//! the cache see the flag before it serves anything.

mod early;
mod late;

pub use early::early_stage;
pub use late::late_stage;

use axum::{
    extract::{ConnectInfo, Request},
    http::Request as HttpRequest,
};
use std::net::SocketAddr;

use super::directory::UserId;

/// Request extension set by the early stage when the visitor is about to be
/// logged in automatically. Removed by the late stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingLogin(pub UserId);

/// Request extension for invocations that are not a browser talking to us
/// (internal sub-requests, probes). The early stage ignores them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NonInteractive;

/// Request extension telling the page that the visitor was just logged in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AutoLoginNotice;

impl AutoLoginNotice {
    pub const MESSAGE: &'static str = "You have been logged in automatically using IP login.";
}

pub(crate) fn peer_address<B>(request: &HttpRequest<B>) -> Option<SocketAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

/// Flag a request as non-interactive before it reaches the pipeline.
pub fn mark_non_interactive(request: &mut Request) {
    request.extensions_mut().insert(NonInteractive);
}
