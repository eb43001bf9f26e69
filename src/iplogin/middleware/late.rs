use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use super::{peer_address, AutoLoginNotice, PendingLogin};
use crate::iplogin::{error::Result, service::IpLogin, session::CurrentUser};

/// Perform a login flagged by the early stage.
///
/// # Errors
/// Session store failures abort the request.
pub async fn late_stage(
    State(service): State<Arc<IpLogin>>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let Some(PendingLogin(user_id)) = request.extensions_mut().remove::<PendingLogin>() else {
        return Ok(next.run(request).await);
    };

    let address = service.client_address(request.headers(), peer_address(&request));
    let login = service.finalize_login(user_id, address).await?;

    if let Some(login) = &login {
        request.extensions_mut().insert(CurrentUser(login.user_id()));
        request.extensions_mut().insert(AutoLoginNotice);
    }

    let mut response = next.run(request).await;

    if let Some(login) = login {
        login.apply(&mut response);
    }

    Ok(response)
}
