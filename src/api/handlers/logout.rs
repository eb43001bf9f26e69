use axum::{
    extract::{ConnectInfo, Extension},
    http::{header::SET_COOKIE, HeaderMap},
    response::{IntoResponse, Redirect, Response},
};
use std::{net::SocketAddr, sync::Arc};

use super::peer;
use crate::iplogin::{error::Result, service::IpLogin};

#[utoipa::path(
    method(get, post),
    path = "/user/logout",
    responses(
        (status = 303, description = "Session ended, redirected to the front page"),
        (status = 503, description = "Session store or permission check unavailable")
    ),
    tag = "iplogin"
)]
pub async fn logout(
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Extension(service): Extension<Arc<IpLogin>>,
) -> Result<Response> {
    let address = service.client_address(&headers, peer(connect_info));
    let outcome = service.logout(&headers, address).await?;

    let mut response = Redirect::to("/").into_response();
    response
        .headers_mut()
        .append(SET_COOKIE, outcome.clear_cookie);
    if let Some(marker) = outcome.can_login_as_another_user {
        response.extensions_mut().insert(marker);
    }
    Ok(response)
}
