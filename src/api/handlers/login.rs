use axum::{
    extract::{ConnectInfo, Extension, Query},
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use std::{net::SocketAddr, sync::Arc};
use utoipa::IntoParams;

use super::peer;
use crate::iplogin::{error::Result, service::IpLogin, session::CurrentUser};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LoginQuery {
    /// Internal path to return to afterwards.
    destination: Option<String>,
}

/// Keep redirects on this site: a single leading slash, nothing that a
/// browser could read as another host.
fn internal_destination(destination: Option<&str>) -> &str {
    match destination {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path.contains('\\')
                && !path.chars().any(char::is_control) =>
        {
            path
        }
        _ => "/",
    }
}

#[utoipa::path(
    get,
    path = "/user/login/ip",
    params(LoginQuery),
    responses(
        (status = 303, description = "Logged in when the address matched, then redirected"),
        (status = 503, description = "Range directory or session store unavailable")
    ),
    tag = "iplogin"
)]
pub async fn login(
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Query(query): Query<LoginQuery>,
    Extension(service): Extension<Arc<IpLogin>>,
    current_user: Option<Extension<CurrentUser>>,
) -> Result<Response> {
    let mut response =
        Redirect::to(internal_destination(query.destination.as_deref())).into_response();

    // Already logged in, either by an existing session or by the late stage on
    // this very request.
    if current_user.is_some() {
        return Ok(response);
    }

    let address = service.client_address(&headers, peer(connect_info));
    let login = service.login_from_address(address).await?;
    if let Some(login) = login {
        login.apply(&mut response);
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_internal_destinations_are_followed() {
        assert_eq!(internal_destination(Some("/node/1")), "/node/1");
        assert_eq!(internal_destination(Some("/a?b=c")), "/a?b=c");
        assert_eq!(internal_destination(None), "/");
        assert_eq!(internal_destination(Some("")), "/");
        assert_eq!(internal_destination(Some("https://evil.example")), "/");
        assert_eq!(internal_destination(Some("//evil.example")), "/");
        assert_eq!(internal_destination(Some("/\\evil.example")), "/");
        assert_eq!(internal_destination(Some("node/1")), "/");
    }
}
