use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::iplogin::{
    error::Result,
    service::IpLogin,
    session::{authenticated_user, CurrentUser, ResolvedSession},
};

/// Resolve the session cookie into a [`CurrentUser`] extension.
///
/// # Errors
/// Session store failures abort the request.
pub async fn initialize(
    State(service): State<Arc<IpLogin>>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let resolved = request.extensions().get::<ResolvedSession>().copied();
    let user = match resolved {
        Some(ResolvedSession(user)) => user,
        None => authenticated_user(service.sessions(), request.headers()).await?,
    };
    if let Some(user_id) = user {
        request.extensions_mut().insert(CurrentUser(user_id));
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iplogin::{
        access::MemoryPermissionChecker,
        config::IpLoginConfig,
        directory::{MemoryRangeDirectory, UserId},
        middleware::early_stage,
        session::{MemorySessionStore, SessionStore, SESSION_COOKIE_NAME},
    };
    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        extract::Extension,
        middleware::from_fn_with_state,
        routing::get,
        Router,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    struct CountingSessions {
        inner: MemorySessionStore,
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl SessionStore for CountingSessions {
        async fn current_user(&self, token: &str) -> Result<Option<UserId>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.current_user(token).await
        }

        async fn start(&self, user_id: UserId, ttl_seconds: i64) -> Result<Option<String>> {
            self.inner.start(user_id, ttl_seconds).await
        }

        async fn end(&self, token: &str) -> Result<()> {
            self.inner.end(token).await
        }
    }

    async fn whoami(user: Option<Extension<CurrentUser>>) -> String {
        user.map_or_else(|| "anonymous".to_string(), |Extension(CurrentUser(id))| id.to_string())
    }

    async fn setup() -> (Arc<IpLogin>, Arc<CountingSessions>, String) {
        let sessions = Arc::new(CountingSessions {
            inner: MemorySessionStore::new([UserId::new(42)]),
            lookups: AtomicUsize::new(0),
        });
        let token = sessions
            .start(UserId::new(42), 60)
            .await
            .unwrap_or_else(|err| panic!("{err}"))
            .unwrap_or_else(|| panic!("session"));
        let service = Arc::new(IpLogin::new(
            Arc::new(MemoryRangeDirectory::default()),
            sessions.clone(),
            Arc::new(MemoryPermissionChecker::new()),
            IpLoginConfig::new(),
        ));
        (service, sessions, token)
    }

    async fn call(app: Router, token: &str) -> String {
        let request = Request::builder()
            .uri("/")
            .header("cookie", format!("{SESSION_COOKIE_NAME}={token}"))
            .body(Body::empty())
            .unwrap_or_else(|err| panic!("{err}"));
        let response = app
            .oneshot(request)
            .await
            .unwrap_or_else(|err| match err {});
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap_or_default();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    #[tokio::test]
    async fn session_is_resolved_once_behind_the_early_stage() {
        let (service, sessions, token) = setup().await;
        let app = Router::new()
            .route("/", get(whoami))
            .layer(from_fn_with_state(service.clone(), initialize))
            .layer(from_fn_with_state(service, early_stage));

        assert_eq!(call(app, &token).await, "42");
        assert_eq!(sessions.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn session_is_resolved_without_the_early_stage() {
        let (service, sessions, token) = setup().await;
        let app = Router::new()
            .route("/", get(whoami))
            .layer(from_fn_with_state(service, initialize));

        assert_eq!(call(app, &token).await, "42");
        assert_eq!(sessions.lookups.load(Ordering::SeqCst), 1);
    }
}
