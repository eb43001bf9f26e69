use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use super::{peer_address, NonInteractive, PendingLogin};
use crate::iplogin::{cookies, error::Result, gate::LoginVerdict, service::IpLogin};

/// Decide before the page cache whether this request logs somebody in.
///
/// # Errors
/// Directory and session store failures abort the request.
pub async fn early_stage(
    State(service): State<Arc<IpLogin>>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    if request.extensions().get::<NonInteractive>().is_some() {
        return Ok(next.run(request).await);
    }

    let peer = peer_address(&request);
    let decision = service.decide(request.headers(), peer).await?;

    if let Some(resolved) = decision.session {
        request.extensions_mut().insert(resolved);
    }
    if let LoginVerdict::LoginAs(user_id) = decision.verdict {
        request.extensions_mut().insert(PendingLogin(user_id));
    }

    let mut response = next.run(request).await;

    if decision.mark_attempted {
        cookies::mark_attempted(response.headers_mut());
    }

    Ok(response)
}
