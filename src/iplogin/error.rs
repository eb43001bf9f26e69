//! Errors surfaced by the login pipeline.
//!
//! Infrastructure failures are never folded into "no match": a directory or
//! session outage must not look like an anonymous visitor.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use super::directory::UserId;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("range directory lookup failed")]
    Directory(#[source] anyhow::Error),
    #[error("session store operation failed")]
    Session(#[source] anyhow::Error),
    #[error("permission check failed")]
    Permission(#[source] anyhow::Error),
    #[error("invalid ip range for user {user_id}: start is after end")]
    InvalidRange { user_id: UserId },
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Self::InvalidRange { .. } => {
                error!("IP login misconfiguration: {self}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
            Self::Directory(source) | Self::Session(source) | Self::Permission(source) => {
                error!("IP login aborted: {self}: {source:#}");
                StatusCode::SERVICE_UNAVAILABLE.into_response()
            }
        }
    }
}
